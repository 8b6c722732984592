use super::prelude::*;

pub fn service(config: &Config) -> impl HttpServiceFactory + 'static {
    web::resource("/recent")
        .wrap(config.cors())
        .route(web::get().to(recent_claims))
}

async fn recent_claims(
    faucet: web::Data<Faucet>,
    query: web::Query<Limit>,
) -> Result<web::Json<Vec<Claim>>, Error> {
    Ok(web::Json(faucet.recent_claims(query.limit).await?))
}
