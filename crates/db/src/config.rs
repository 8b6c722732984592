use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize, Clone)]
pub struct DbConfig {
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub ssl: SslConfig,
    #[serde(default = "DbConfig::default_max_size")]
    pub max_size: usize,
}

#[derive(Deserialize, Clone, Default)]
pub struct SslConfig {
    pub enabled: bool,
    pub cert: Option<PathBuf>,
}

impl DbConfig {
    fn default_max_size() -> usize {
        32
    }
}

impl std::fmt::Display for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "host={} port={} user={} dbname={}",
            self.host, self.port, self.user, self.dbname,
        )
    }
}

/// Embedded store used when no Postgres server is configured.
#[derive(Deserialize, Clone)]
pub struct LocalStorageConfig {
    pub local_storage: PathBuf,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            local_storage: PathBuf::from("./local_storage"),
        }
    }
}
