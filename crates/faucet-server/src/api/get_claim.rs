use super::prelude::*;

pub fn service(config: &Config) -> impl HttpServiceFactory + 'static {
    web::resource("/{id}")
        .wrap(config.cors())
        .route(web::get().to(get_claim))
}

async fn get_claim(
    faucet: web::Data<Faucet>,
    session: Auth,
    id: web::Path<ClaimId>,
) -> Result<web::Json<Claim>, Error> {
    Ok(web::Json(
        faucet.get_claim_status(&session, id.into_inner()).await?,
    ))
}
