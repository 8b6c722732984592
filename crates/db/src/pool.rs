use crate::{
    Error, LocalStorage,
    config::{DbConfig, LocalStorageConfig},
    connection::FaucetConnection,
};
use deadpool_postgres::{ClientWrapper, Hook, HookError, Metrics, Pool, PoolConfig, SslMode};
use either::Either;
use futures_util::FutureExt;
use std::time::Duration;

pub use deadpool_postgres::Object as Connection;

const SCHEMA: &str = include_str!("../schema.sql");

#[derive(Clone)]
pub enum DbPool {
    Real(RealDbPool),
    Local(LocalStorage),
}

impl DbPool {
    pub async fn from_config(config: &Either<DbConfig, LocalStorageConfig>) -> crate::Result<Self> {
        match config {
            Either::Left(cfg) => {
                let pool = RealDbPool::new(cfg).await?;
                pool.init_db().await?;
                Ok(DbPool::Real(pool))
            }
            Either::Right(cfg) => Ok(DbPool::Local(LocalStorage::new(&cfg.local_storage)?)),
        }
    }

    pub fn conn(&self) -> &dyn FaucetConnection {
        match self {
            DbPool::Real(pool) => pool,
            DbPool::Local(local) => local,
        }
    }
}

#[derive(Clone)]
pub struct RealDbPool {
    pg: Pool,
}

fn read_cert(path: &std::path::Path) -> crate::Result<rustls::Certificate> {
    let cert = std::fs::read(path)?;
    let mut buf = cert.as_slice();
    let items = rustls_pemfile::read_all(&mut buf)?;

    let cert = items
        .iter()
        .find_map(|i| {
            if let rustls_pemfile::Item::X509Certificate(c) = i {
                Some(rustls::Certificate(c.clone()))
            } else {
                None
            }
        })
        .ok_or(Error::NoCert)?;

    Ok(cert)
}

async fn conn_healthcheck(
    conn: &mut ClientWrapper,
    metric: &Metrics,
) -> Result<(), deadpool_postgres::HookError> {
    if metric.last_used() <= Duration::from_secs(10) {
        Ok(())
    } else {
        conn.simple_query("").await.map_err(HookError::Backend)?;
        Ok(())
    }
}

impl RealDbPool {
    pub async fn new(cfg: &DbConfig) -> crate::Result<Self> {
        use deadpool_postgres::{Config, Runtime};

        let pool_cfg = Config {
            user: Some(cfg.user.clone()),
            password: Some(cfg.password.clone()),
            dbname: Some(cfg.dbname.clone()),
            host: Some(cfg.host.clone()),
            port: Some(cfg.port),
            ssl_mode: Some(if cfg.ssl.enabled {
                SslMode::Require
            } else {
                SslMode::Disable
            }),
            pool: Some(PoolConfig {
                max_size: cfg.max_size,
                ..Default::default()
            }),
            ..Config::default()
        };
        tracing::info!("connecting to postgres: {}", cfg);
        tracing::info!("SSL enabled: {}", cfg.ssl.enabled);

        let builder = if cfg.ssl.enabled {
            let mut roots = rustls::RootCertStore::empty();
            if let Some(path) = cfg.ssl.cert.as_ref() {
                tracing::info!("adding certificate: {}", path.display());
                let cert = read_cert(path)?;
                roots
                    .add(&cert)
                    .map_err(|e| Error::AddCert(e.to_string()))?;
            }
            let certs = rustls_native_certs::load_native_certs()
                .map_err(|e| Error::AddCert(e.to_string()))?;
            for cert in certs {
                roots
                    .add(&rustls::Certificate(cert.0))
                    .map_err(|e| Error::AddCert(e.to_string()))?;
            }
            let config = rustls::ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(roots)
                .with_no_client_auth();
            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(config);
            pool_cfg.builder(tls).map_err(Error::CreatePool)?
        } else {
            pool_cfg
                .builder(tokio_postgres::NoTls)
                .map_err(Error::CreatePool)?
        };

        let pg = builder
            .pre_recycle(Hook::async_fn(|c, m| conn_healthcheck(c, m).boxed()))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| Error::BuildPool(e.to_string()))?;

        // Test to see if we can connect
        let _conn = pg.get().await.map_err(Error::GetDbConnection)?;

        Ok(Self { pg })
    }

    /// Creates missing tables and the stats row. Safe to run repeatedly.
    pub async fn init_db(&self) -> crate::Result<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(SCHEMA).await.map_err(Error::InitDb)?;
        Ok(())
    }

    pub async fn get_conn(&self) -> crate::Result<Connection> {
        let conn = tokio::time::timeout(Duration::from_secs(240), self.pg.get())
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::GetDbConnection)?;
        Ok(conn)
    }
}
