//! Creates the faucet tables and rebuilds the aggregate stats from claim
//! history.
//!
//! Usage: `init-db <config.toml>`, reading the same `[db]` table as the
//! server. With local storage only the stats rebuild applies, and the server
//! must be stopped since sled allows one process per store.

use anyhow::Context;
use db::{
    DbPool,
    config::{DbConfig, LocalStorageConfig},
};
use either::Either;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize)]
struct InitConfig {
    #[serde(with = "either::serde_untagged")]
    db: Either<DbConfig, LocalStorageConfig>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: init-db <config.toml>")?;
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config = toml::from_str::<InitConfig>(&text).with_context(|| format!("parsing {path}"))?;

    // creates the Postgres tables when they are missing
    let pool = DbPool::from_config(&config.db).await?;
    tracing::info!("tables ready");

    let stats = pool.conn().recompute_stats(chrono::Utc::now()).await?;
    tracing::info!(
        "stats: total_distributed={}, total_users={}",
        stats.total_distributed,
        stats.total_users
    );
    Ok(())
}
