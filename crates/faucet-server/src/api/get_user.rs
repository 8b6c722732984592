use super::prelude::*;
use faucet_lib::{Tier, UserAccount, eligibility};

#[derive(Serialize)]
pub struct Output {
    #[serde(flatten)]
    pub user: UserAccount,
    pub tier: Tier,
    /// Seconds until the next claim is allowed, absent when claiming is open.
    pub cooldown_remaining_secs: Option<u64>,
}

pub fn service(config: &Config) -> impl HttpServiceFactory + 'static {
    web::resource("")
        .wrap(config.cors())
        .route(web::get().to(get_user))
}

async fn get_user(faucet: web::Data<Faucet>, session: Auth) -> Result<web::Json<Output>, Error> {
    let user = faucet.ensure_user(&session).await?;
    let cooldown_remaining_secs = eligibility::check_cooldown(&user, Utc::now())
        .err()
        .and_then(|denial| denial.remaining_secs());
    Ok(web::Json(Output {
        tier: user.tier(),
        user,
        cooldown_remaining_secs,
    }))
}
