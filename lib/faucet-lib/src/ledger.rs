//! External ledger capability.
//!
//! The faucet only needs two calls from the chain: look up an account by name
//! and submit a transfer. [`steem::SteemLedger`] talks to real nodes,
//! [`memory::MemoryLedger`] keeps everything in process.

use crate::{AccountName, Amount};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

pub mod memory;
pub mod steem;

pub type TransactionId = String;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub name: AccountName,
    pub created_at: DateTime<Utc>,
    pub balance: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: AccountName,
    pub to: AccountName,
    pub amount: Amount,
    pub memo: String,
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("network error: {0}")]
    Network(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("transfer rejected: {0}")]
    Rejected(String),
    #[error("ledger request timed out")]
    Timeout,
    #[error("invalid ledger response: {0}")]
    InvalidResponse(String),
    #[error("no ledger nodes configured")]
    NoNodes,
}

impl LedgerError {
    /// Errors worth retrying on another node.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Network(_) | LedgerError::Timeout)
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            LedgerError::Timeout
        } else if error.is_decode() {
            LedgerError::InvalidResponse(error.to_string())
        } else {
            LedgerError::Network(error.to_string())
        }
    }
}

#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// `Ok(None)` when the chain has no such account.
    async fn get_account(&self, name: &AccountName) -> Result<Option<AccountInfo>, LedgerError>;

    async fn transfer(&self, req: &TransferRequest) -> Result<TransactionId, LedgerError>;
}
