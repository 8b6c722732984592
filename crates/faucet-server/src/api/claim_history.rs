use super::prelude::*;

pub fn service(config: &Config) -> impl HttpServiceFactory + 'static {
    web::resource("/history")
        .wrap(config.cors())
        .route(web::get().to(claim_history))
}

async fn claim_history(
    faucet: web::Data<Faucet>,
    session: Auth,
    query: web::Query<Limit>,
) -> Result<web::Json<Vec<Claim>>, Error> {
    Ok(web::Json(
        faucet.list_user_claims(&session, query.limit).await?,
    ))
}
