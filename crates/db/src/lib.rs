//! Persistence for faucet users, claims and aggregate statistics.
//!
//! Two backends implement [`FaucetConnection`]: Postgres ([`pool::RealDbPool`])
//! and an embedded sled store ([`LocalStorage`]). Every mutation of user,
//! claim or stats records goes through one of the trait's atomic operations.

pub mod config;
pub mod connection;
pub mod error;
pub mod local_storage;
pub mod pool;

pub use connection::{Admission, FaucetConnection};
pub use error::{Error, Result};
pub use local_storage::LocalStorage;
pub use pool::DbPool;
pub use tokio_postgres::error::SqlState;

/// Upper bound for list queries.
pub const MAX_LIST_LIMIT: usize = 100;

pub fn clamp_limit(limit: Option<usize>, default: usize) -> usize {
    limit.unwrap_or(default).clamp(1, MAX_LIST_LIMIT)
}
