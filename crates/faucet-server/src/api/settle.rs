use super::prelude::*;
use faucet::BatchReport;

#[derive(Deserialize)]
pub struct Query {
    /// Defaults to the configured batch size.
    pub max: Option<usize>,
}

pub fn service() -> impl HttpServiceFactory + 'static {
    web::resource("/settle").route(web::post().to(settle))
}

async fn settle(
    settlement: web::Data<Settlement>,
    query: web::Query<Query>,
) -> Result<web::Json<BatchReport>, Error> {
    Ok(web::Json(settlement.run_batch(query.max).await?))
}
