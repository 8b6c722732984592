use super::prelude::*;
use faucet_lib::{AccountInfo, UserAccount};

#[derive(Deserialize)]
pub struct Params {
    pub account_name: String,
}

#[derive(Serialize)]
pub struct Output {
    pub user: UserAccount,
    pub account: AccountInfo,
}

pub fn service(config: &Config) -> impl HttpServiceFactory + 'static {
    web::resource("/account")
        .wrap(config.cors())
        .route(web::post().to(link_account))
}

async fn link_account(
    faucet: web::Data<Faucet>,
    session: Auth,
    params: web::Json<Params>,
) -> Result<web::Json<Output>, Error> {
    let (user, account) = faucet
        .link_account(&session, &params.account_name)
        .await?;
    Ok(web::Json(Output { user, account }))
}
