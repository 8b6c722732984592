use super::prelude::*;

pub fn service(config: &Config) -> impl HttpServiceFactory + 'static {
    web::resource("/pending")
        .wrap(config.cors())
        .route(web::get().to(list_pending))
}

async fn list_pending(
    faucet: web::Data<Faucet>,
    session: Auth,
) -> Result<web::Json<Vec<Claim>>, Error> {
    Ok(web::Json(faucet.list_pending_claims(&session).await?))
}
