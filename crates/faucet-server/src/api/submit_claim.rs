use super::prelude::*;
use faucet_lib::{ClaimStatus, Decimal};

#[derive(Deserialize)]
pub struct Params {
    /// Falls back to the linked account.
    #[serde(default)]
    pub account_name: Option<String>,
    pub amount: Decimal,
}

#[derive(Serialize)]
pub struct Output {
    pub claim_id: ClaimId,
    pub status: ClaimStatus,
    pub claim: Claim,
}

pub fn service(config: &Config) -> impl HttpServiceFactory + 'static {
    web::resource("")
        .wrap(config.cors())
        .route(web::post().to(submit_claim))
}

async fn submit_claim(
    faucet: web::Data<Faucet>,
    session: Auth,
    params: web::Json<Params>,
) -> Result<web::Json<Output>, Error> {
    let Params {
        account_name,
        amount,
    } = params.into_inner();
    let claim = faucet
        .submit_claim(&session, account_name.as_deref(), amount)
        .await?;
    Ok(web::Json(Output {
        claim_id: claim.id,
        status: claim.status,
        claim,
    }))
}
