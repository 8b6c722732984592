//! Faucet claim lifecycle: admission of claims and their settlement on the
//! ledger.

use chrono::Utc;
use db::{Admission, DbPool};
use faucet_lib::{
    AccountInfo, AccountName, AggregateStats, Amount, Claim, ClaimId, Decimal, Denial,
    LedgerClient, LedgerError, Session, StatsSummary, UserAccount, ValidationError,
};
use std::{sync::Arc, time::Duration};

pub mod error;
pub mod notify;
pub mod settlement;

pub use error::ClaimError;
pub use settlement::{BatchReport, Settlement, SettlementConfig};

pub const DEFAULT_LIST_LIMIT: usize = 20;

/// Entry points used by request handlers.
#[derive(Clone)]
pub struct Faucet {
    db: DbPool,
    ledger: Arc<dyn LedgerClient>,
    lookup_timeout: Duration,
}

fn require_auth(session: &Session) -> Result<(), ClaimError> {
    if session.is_authenticated {
        Ok(())
    } else {
        Err(ClaimError::Unauthenticated)
    }
}

impl Faucet {
    pub fn new(db: DbPool, ledger: Arc<dyn LedgerClient>, lookup_timeout: Duration) -> Self {
        Self {
            db,
            ledger,
            lookup_timeout,
        }
    }

    pub fn db(&self) -> &DbPool {
        &self.db
    }

    async fn lookup_account(&self, name: &AccountName) -> Result<Option<AccountInfo>, LedgerError> {
        tokio::time::timeout(self.lookup_timeout, self.ledger.get_account(name))
            .await
            .map_err(|_| LedgerError::Timeout)?
    }

    pub async fn ensure_user(&self, session: &Session) -> Result<UserAccount, ClaimError> {
        require_auth(session)?;
        Ok(self
            .db
            .conn()
            .ensure_user(session.user_id, Utc::now())
            .await?)
    }

    /// Links a ledger account after confirming it exists.
    pub async fn link_account(
        &self,
        session: &Session,
        account_name: &str,
    ) -> Result<(UserAccount, AccountInfo), ClaimError> {
        require_auth(session)?;
        let name = AccountName::new(account_name)?;
        let info = self
            .lookup_account(&name)
            .await?
            .ok_or(Denial::AccountNotFound)?;
        let user = self
            .db
            .conn()
            .link_account(session.user_id, &name, Utc::now())
            .await?;
        tracing::info!("user {} linked account {}", session.user_id, name);
        Ok((user, info))
    }

    /// Admits a new pending claim.
    ///
    /// Without `account_name` the user's linked account is used.
    pub async fn submit_claim(
        &self,
        session: &Session,
        account_name: Option<&str>,
        amount: Decimal,
    ) -> Result<Claim, ClaimError> {
        require_auth(session)?;
        let amount = Amount::for_claim(amount)?;
        let requested = account_name
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(AccountName::new)
            .transpose()?;

        let conn = self.db.conn();
        let user = conn.ensure_user(session.user_id, Utc::now()).await?;
        let name = requested
            .or(user.account_name)
            .ok_or(ValidationError::MissingAccountName)?;

        let account = self.lookup_account(&name).await?;

        // server time, taken after the lookup so it is as fresh as possible
        let admission = Admission::new(session.user_id, name, account, amount, Utc::now());
        match conn.admit_claim(&admission).await {
            Ok(claim) => {
                tracing::info!(
                    "admitted claim {} for user {}: {} to {}",
                    claim.id,
                    claim.user_id,
                    claim.amount,
                    claim.account_name
                );
                Ok(claim)
            }
            Err(error) => {
                let error = ClaimError::from(error);
                if let ClaimError::Denied(denial) = &error {
                    tracing::info!("claim denied for user {}: {}", session.user_id, denial);
                }
                Err(error)
            }
        }
    }

    /// Returns a claim owned by the session's user.
    pub async fn get_claim_status(
        &self,
        session: &Session,
        id: ClaimId,
    ) -> Result<Claim, ClaimError> {
        require_auth(session)?;
        match self.db.conn().get_claim(id).await? {
            Some(claim) if claim.user_id == session.user_id => Ok(claim),
            _ => Err(ClaimError::NotFound(id)),
        }
    }

    pub async fn list_pending_claims(&self, session: &Session) -> Result<Vec<Claim>, ClaimError> {
        require_auth(session)?;
        Ok(self.db.conn().list_pending_claims(session.user_id).await?)
    }

    pub async fn list_user_claims(
        &self,
        session: &Session,
        limit: Option<usize>,
    ) -> Result<Vec<Claim>, ClaimError> {
        require_auth(session)?;
        let limit = db::clamp_limit(limit, DEFAULT_LIST_LIMIT);
        Ok(self
            .db
            .conn()
            .list_user_claims(session.user_id, limit)
            .await?)
    }

    pub async fn recent_claims(&self, limit: Option<usize>) -> Result<Vec<Claim>, ClaimError> {
        let limit = db::clamp_limit(limit, DEFAULT_LIST_LIMIT);
        Ok(self.db.conn().recent_claims(limit).await?)
    }

    pub async fn get_stats(&self) -> Result<StatsSummary, ClaimError> {
        Ok(self.db.conn().get_stats().await?.summary())
    }

    pub async fn recompute_stats(&self) -> Result<AggregateStats, ClaimError> {
        Ok(self.db.conn().recompute_stats(Utc::now()).await?)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use db::LocalStorage;
    use faucet_lib::{UserId, ledger::memory::MemoryLedger};

    pub struct Env {
        pub _dir: tempfile::TempDir,
        pub db: DbPool,
        pub ledger: Arc<MemoryLedger>,
        pub faucet: Faucet,
    }

    pub fn account(name: &str, age_days: i64) -> AccountInfo {
        AccountInfo {
            name: AccountName::new(name).unwrap(),
            created_at: Utc::now() - ChronoDuration::days(age_days),
            balance: Decimal::ONE,
        }
    }

    pub fn env() -> Env {
        tracing_subscriber::fmt::try_init().ok();
        let dir = tempfile::tempdir().unwrap();
        let db = DbPool::Local(LocalStorage::new(dir.path().join("db")).unwrap());
        let ledger = Arc::new(
            MemoryLedger::new()
                .with_account(account("alice", 10))
                .with_account(account("bob", 30))
                .with_account(account("newbie", 2)),
        );
        let faucet = Faucet::new(db.clone(), ledger.clone(), Duration::from_secs(5));
        Env {
            _dir: dir,
            db,
            ledger,
            faucet,
        }
    }

    pub fn session() -> Session {
        Session::authenticated(UserId::new_v4())
    }

    pub fn milli(n: i64) -> Decimal {
        Decimal::new(n, 3)
    }
}
