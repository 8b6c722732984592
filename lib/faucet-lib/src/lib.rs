//! Types and rules shared by the faucet services.
//!
//! Table of contents:
//! - [`amount`]: token amounts with the ledger's precision.
//! - [`account`]: external ledger account names.
//! - [`user`]: per-user claim state, streaks and tiers.
//! - [`claim`]: a single payout request and its lifecycle.
//! - [`stats`]: aggregate statistics over completed claims.
//! - [`eligibility`]: rules deciding whether a claim may be admitted.
//! - [`ledger`]: the external ledger capability and its clients.

pub mod account;
pub mod amount;
pub mod claim;
pub mod eligibility;
pub mod errors;
pub mod ledger;
pub mod stats;
pub mod user;

pub type UserId = uuid::Uuid;

pub type ClaimId = uuid::Uuid;

pub use account::AccountName;
pub use amount::Amount;
pub use claim::{AlreadySettled, Claim, ClaimStatus};
pub use eligibility::Denial;
pub use errors::ValidationError;
pub use ledger::{AccountInfo, LedgerClient, LedgerError, TransactionId, TransferRequest};
pub use rust_decimal::Decimal;
pub use stats::{AggregateStats, StatsSummary};
pub use user::{Tier, UserAccount};

/// Identity supplied by the session provider for one request.
///
/// Only `user_id` is trusted; every other client-supplied field is validated
/// or re-read from storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub is_authenticated: bool,
}

impl Session {
    pub fn authenticated(user_id: UserId) -> Self {
        Self {
            user_id,
            is_authenticated: true,
        }
    }
}
