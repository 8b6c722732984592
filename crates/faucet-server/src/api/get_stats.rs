use super::prelude::*;
use faucet_lib::StatsSummary;

pub fn service(config: &Config) -> impl HttpServiceFactory + 'static {
    web::resource("/stats")
        .wrap(config.cors())
        .route(web::get().to(get_stats))
}

async fn get_stats(faucet: web::Data<Faucet>) -> Result<web::Json<StatsSummary>, Error> {
    Ok(web::Json(faucet.get_stats().await?))
}
