//! Runs one settlement batch and prints its report.
//!
//! Usage: `settle <config.toml> [max]`
//!
//! Meant for a scheduler when the server runs with `settlement.interval_secs = 0`.

use anyhow::Context;
use db::DbPool;
use faucet_server::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::get_config();
    let max = std::env::args()
        .nth(2)
        .map(|s| s.parse::<usize>())
        .transpose()
        .context("max must be a number")?;

    if config.settlement.interval().is_some() {
        tracing::warn!(
            "settlement.interval_secs is set, a running server settles the same claims"
        );
    }

    let db = DbPool::from_config(&config.db)
        .await
        .context("opening database")?;
    let services = config.services(db)?;
    let report = services.settlement.run_batch(max).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.errors > 0 {
        anyhow::bail!("{} claims could not be recorded", report.errors);
    }
    Ok(())
}
