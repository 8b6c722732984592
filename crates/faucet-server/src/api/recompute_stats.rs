use super::prelude::*;
use faucet_lib::AggregateStats;

pub fn service() -> impl HttpServiceFactory + 'static {
    web::resource("/stats/recompute").route(web::post().to(recompute_stats))
}

async fn recompute_stats(
    faucet: web::Data<Faucet>,
) -> Result<web::Json<AggregateStats>, Error> {
    let stats = faucet.recompute_stats().await?;
    tracing::info!(
        "recomputed stats: total_distributed={}, total_users={}",
        stats.total_distributed,
        stats.total_users
    );
    Ok(web::Json(stats))
}
