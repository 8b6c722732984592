use actix_web::http::header::{HeaderName, HeaderValue};
use db::{
    DbPool,
    config::{DbConfig, LocalStorageConfig},
};
use either::Either;
use faucet::{
    Faucet, Settlement, SettlementConfig,
    notify::{NoopNotifier, Notifier, WebhookNotifier},
};
use faucet_lib::{
    LedgerClient, LedgerError, ValidationError,
    ledger::steem::{LedgerConfig, SteemLedger},
};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error as ThisError;

pub mod api;
pub mod error;
pub mod middleware;
pub mod settlement_worker;

pub const X_ADMIN_KEY: HeaderName = HeaderName::from_static("x-admin-key");

fn match_wildcard(pat: &str, origin: &HeaderValue) -> bool {
    let Ok(mut origin_str) = origin.to_str() else {
        return false;
    };

    let mut segments = pat.split('*');

    let Some(first) = segments.next() else {
        return false;
    };
    origin_str = match origin_str.strip_prefix(first) {
        Some(s) => s,
        None => return false,
    };

    let mut segments = segments.peekable();
    while let Some(s) = segments.next() {
        let pos = if segments.peek().is_none() {
            // the last segment must end the origin
            match origin_str.strip_suffix(s) {
                Some(rest) => rest.len(),
                None => return false,
            }
        } else {
            match origin_str.find(s) {
                Some(pos) => pos,
                None => return false,
            }
        };
        // a wildcard covers one subdomain label
        if !origin_str[..pos]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return false;
        }
        origin_str = &origin_str[pos + s.len()..];
    }

    origin_str.is_empty()
}

#[derive(Deserialize, Clone, Default)]
pub struct NotificationsConfig {
    /// Receives a JSON message for every completed claim.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_db_config() -> Either<DbConfig, LocalStorageConfig> {
    Either::Right(LocalStorageConfig::default())
}

#[derive(Deserialize, Clone)]
pub struct Config {
    #[serde(default = "Config::default_host")]
    pub host: String,
    #[serde(default = "Config::default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "Config::default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default = "default_db_config", with = "either::serde_untagged")]
    pub db: Either<DbConfig, LocalStorageConfig>,
    /// HMAC-SHA256 secret of the identity provider's access tokens.
    #[serde(default)]
    pub jwt_key: Option<String>,
    /// Expected `x-admin-key` value; admin routes are not mounted without it.
    #[serde(default)]
    pub admin_key: Option<String>,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            cors_origins: Vec::new(),
            shutdown_timeout_secs: Self::default_shutdown_timeout_secs(),
            db: default_db_config(),
            jwt_key: None,
            admin_key: None,
            ledger: LedgerConfig::default(),
            settlement: SettlementConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}

#[derive(ThisError, Debug)]
pub enum StartError {
    #[error("failed to build ledger client: {0}")]
    Ledger(#[from] LedgerError),
    #[error("invalid faucet account: {0}")]
    FaucetAccount(#[from] ValidationError),
}

/// Shared services handed to every worker.
#[derive(Clone)]
pub struct Services {
    pub faucet: Faucet,
    pub settlement: Settlement,
}

impl Config {
    pub fn default_host() -> String {
        "127.0.0.1".to_owned()
    }

    pub fn default_port() -> u16 {
        8080
    }

    pub fn default_shutdown_timeout_secs() -> u64 {
        30
    }

    pub fn get_config() -> Self {
        match std::env::args().nth(1) {
            Some(s) => if s == "-" {
                use std::io::Read;
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .map_err(|error| {
                        tracing::error!("Error reading STDIN: {}", error);
                    })
                    .map(move |_| buf)
            } else {
                std::fs::read_to_string(s).map_err(|error| {
                    tracing::error!("Error reading config: {}", error);
                })
            }
            .and_then(|s| {
                toml::from_str(&s).map_err(|error| {
                    tracing::error!("Error parsing config: {}", error);
                })
            })
            .map_err(|_| {
                tracing::warn!("Invalid config file, using default");
            })
            .unwrap_or_default(),
            None => {
                tracing::info!("No config specified, using default");
                Config::default()
            }
        }
    }

    /// Build a CORS middleware.
    pub fn cors(&self) -> actix_cors::Cors {
        let mut cors = actix_cors::Cors::default()
            .allow_any_header()
            .allow_any_method()
            .supports_credentials();
        for origin in &self.cors_origins {
            if origin.contains('*') {
                let pattern = origin.clone();
                cors = cors.allowed_origin_fn(move |origin, _| match_wildcard(&pattern, origin));
            } else {
                cors = cors.allowed_origin(origin);
            }
        }
        cors
    }

    /// Key expected in the `x-admin-key` header, `None` when unset or empty.
    pub fn admin_key(&self) -> Option<&str> {
        self.admin_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        match &self.notifications.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(reqwest::Client::new(), url.clone())),
            None => Arc::new(NoopNotifier),
        }
    }

    /// Services talking to the configured Steem nodes.
    pub fn services(&self, db: DbPool) -> Result<Services, StartError> {
        let ledger = SteemLedger::from_config(&self.ledger)?;
        if self.ledger.transfer_relay.is_none() {
            tracing::warn!("no transfer relay configured, transfers are simulated");
        }
        self.services_with_ledger(db, Arc::new(ledger))
    }

    pub fn services_with_ledger(
        &self,
        db: DbPool,
        ledger: Arc<dyn LedgerClient>,
    ) -> Result<Services, StartError> {
        let faucet = Faucet::new(db.clone(), ledger.clone(), self.ledger.timeout());
        let settlement = Settlement::new(
            db,
            ledger,
            self.notifier(),
            &self.ledger,
            self.settlement.clone(),
        )?;
        Ok(Services { faucet, settlement })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_wildcard() {
        assert!(match_wildcard(
            "https://faucet-git-*-cur8.vercel.app",
            &HeaderValue::from_static("https://faucet-git-master-cur8.vercel.app"),
        ));
        assert!(match_wildcard(
            "https://faucet-*.vercel.app",
            &HeaderValue::from_static("https://faucet-qv9tx6vxs.vercel.app"),
        ));
        assert!(!match_wildcard(
            "https://faucet-*.vercel.app",
            &HeaderValue::from_static("https://faucet-x.evil.com/.vercel.app"),
        ));
        assert!(!match_wildcard(
            "https://faucet-*.vercel.app",
            &HeaderValue::from_static("http://faucet-a.vercel.app"),
        ));
        assert!(!match_wildcard(
            "https://faucet-*.vercel.app",
            &HeaderValue::from_static("https://faucet-a.vercel.app.evil.com"),
        ));
        assert!(!match_wildcard(
            "https://faucet-*.vercel.app",
            &HeaderValue::from_static("https://faucet-a.vercel.appevil.com"),
        ));
        assert!(!match_wildcard(
            "https://faucet-*.vercel.app",
            &HeaderValue::from_static("https://faucet-.vercel.app.vercel.app"),
        ));
    }

    #[test]
    fn parse_config() {
        let config: Config = toml::from_str(
            r#"
            port = 9000
            jwt_key = "secret"
            admin_key = "admin"

            [db]
            local_storage = "/tmp/faucet"

            [ledger]
            faucet_account = "faucet.test"

            [settlement]
            interval_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert!(matches!(&config.db, Either::Right(local) if local.local_storage.to_str() == Some("/tmp/faucet")));
        assert_eq!(config.ledger.faucet_account, "faucet.test");
        assert_eq!(config.ledger.symbol, "STEEM");
        assert_eq!(config.settlement.interval(), None);
        assert_eq!(config.settlement.batch_size, 10);

        let config: Config = toml::from_str(
            r#"
            [db]
            user = "postgres"
            password = "pass"
            dbname = "faucet"
            host = "localhost"
            port = 5432
            "#,
        )
        .unwrap();
        assert!(matches!(&config.db, Either::Left(pg) if pg.dbname == "faucet"));
        assert!(config.admin_key().is_none());

        let config: Config = toml::from_str(r#"admin_key = """#).unwrap();
        assert!(config.admin_key().is_none());
    }
}
