use actix::Actor;
use actix_web::{App, HttpServer, middleware::Logger, web};
use db::DbPool;
use faucet_server::{
    Config, api,
    settlement_worker::{SettlementWorker, Shutdown},
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[actix::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::get_config();

    tracing::info!("allow CORS origins: {:?}", config.cors_origins);

    let db = match DbPool::from_config(&config.db).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("failed to open database: {}", e);
            return;
        }
    };

    let services = match config.services(db) {
        Ok(services) => services,
        Err(e) => {
            tracing::error!("{}", e);
            return;
        }
    };

    let worker = match config.settlement.interval() {
        Some(interval) => {
            Some(SettlementWorker::new(services.settlement.clone(), interval).start())
        }
        None => {
            tracing::info!("scheduled settlement disabled");
            None
        }
    };

    let host = config.host.clone();
    let port = config.port;
    let shutdown_timeout_secs = config.shutdown_timeout_secs;

    tracing::info!("listening on {:?} port {:?}", host, port);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(config.cors())
            .wrap(Logger::new(r#""%r" %s %b %Dms"#).exclude("/healthcheck"))
            .app_data(web::Data::new(services.faucet.clone()))
            .app_data(web::Data::new(services.settlement.clone()))
            .configure(|cfg| api::configure(cfg, &config))
    })
    .shutdown_timeout(shutdown_timeout_secs);

    let server = match server.bind((host, port)) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("failed to bind: {}", e);
            return;
        }
    };

    if let Err(e) = server.run().await {
        tracing::error!("server error: {}", e);
    }

    if let Some(worker) = worker {
        let timeout = Duration::from_secs(shutdown_timeout_secs);
        if let Err(e) = worker.send(Shutdown { timeout }).await {
            tracing::warn!("settlement worker already stopped: {}", e);
        }
    }
}
