use crate::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Object as Connection, Transaction};
use faucet_lib::{
    AccountInfo, AccountName, AggregateStats, AlreadySettled, Amount, Claim, ClaimId, Denial,
    UserAccount, UserId,
};
use std::future::Future;
use tokio_postgres::{Error as PgError, Row, types::ToSql};

mod conn_impl;

/// Input of [`FaucetConnection::admit_claim`].
///
/// `account` is the ledger lookup for `account_name`, done by the caller
/// before the transaction starts.
#[derive(Clone, Debug)]
pub struct Admission {
    pub claim_id: ClaimId,
    pub user_id: UserId,
    pub account_name: AccountName,
    pub account: Option<AccountInfo>,
    pub amount: Amount,
    pub now: DateTime<Utc>,
}

impl Admission {
    pub fn new(
        user_id: UserId,
        account_name: AccountName,
        account: Option<AccountInfo>,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            claim_id: ClaimId::now_v7(),
            user_id,
            account_name,
            account,
            amount,
            now,
        }
    }

    /// Re-runs eligibility against freshly read state.
    pub fn evaluate(&self, user: &UserAccount, pending: Option<ClaimId>) -> Result<(), Denial> {
        faucet_lib::eligibility::evaluate(
            user,
            pending,
            self.account.as_ref(),
            self.amount,
            self.now,
        )
    }

    /// The pending claim this admission creates, stamped with the tier the
    /// user held before the claim.
    pub fn to_claim(&self, user: &UserAccount) -> Claim {
        Claim::new_pending(
            self.claim_id,
            self.user_id,
            self.account_name.clone(),
            self.amount,
            user.tier(),
            self.now,
        )
    }
}

#[async_trait]
pub trait FaucetConnection: Send + Sync {
    /// Returns the user, creating it with defaults on first access.
    async fn ensure_user(&self, user_id: UserId, now: DateTime<Utc>)
    -> crate::Result<UserAccount>;

    async fn get_user(&self, user_id: UserId) -> crate::Result<Option<UserAccount>>;

    async fn link_account(
        &self,
        user_id: UserId,
        name: &AccountName,
        now: DateTime<Utc>,
    ) -> crate::Result<UserAccount>;

    /// Re-validates eligibility, inserts a pending claim and advances the
    /// user's cooldown and streak, all in one transaction.
    async fn admit_claim(&self, admission: &Admission) -> crate::Result<Claim, Denial>;

    async fn get_claim(&self, id: ClaimId) -> crate::Result<Option<Claim>>;

    async fn list_pending_claims(&self, user_id: UserId) -> crate::Result<Vec<Claim>>;

    /// Newest first.
    async fn list_user_claims(&self, user_id: UserId, limit: usize) -> crate::Result<Vec<Claim>>;

    /// Newest first, across all users.
    async fn recent_claims(&self, limit: usize) -> crate::Result<Vec<Claim>>;

    /// Oldest first.
    async fn oldest_pending_claims(&self, limit: usize) -> crate::Result<Vec<Claim>>;

    /// Marks a pending claim completed and adds it to the aggregate stats in
    /// the same transaction.
    async fn complete_claim(
        &self,
        id: ClaimId,
        transaction_id: &str,
        now: DateTime<Utc>,
    ) -> crate::Result<Claim, AlreadySettled>;

    async fn fail_claim(
        &self,
        id: ClaimId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> crate::Result<Claim, AlreadySettled>;

    async fn get_stats(&self) -> crate::Result<AggregateStats>;

    /// Rebuilds the aggregate stats from completed claims and stores them.
    async fn recompute_stats(&self, now: DateTime<Utc>) -> crate::Result<AggregateStats>;
}

pub trait DbClient {
    #[track_caller]
    fn do_query_one(
        &self,
        stmt: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<Row, PgError>> + Send;

    #[track_caller]
    fn do_query(
        &self,
        stmt: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<Vec<Row>, PgError>> + Send;

    #[track_caller]
    fn do_execute(
        &self,
        stmt: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<u64, PgError>> + Send;

    #[track_caller]
    fn do_query_opt(
        &self,
        stmt: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = Result<Option<Row>, PgError>> + Send;
}

impl DbClient for Connection {
    async fn do_query_one(
        &self,
        stmt: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Row, PgError> {
        let stmt = self.prepare_cached(stmt).await?;
        self.query_one(&stmt, params).await
    }

    async fn do_query(
        &self,
        stmt: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, PgError> {
        let stmt = self.prepare_cached(stmt).await?;
        self.query(&stmt, params).await
    }

    async fn do_execute(&self, stmt: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64, PgError> {
        let stmt = self.prepare_cached(stmt).await?;
        self.execute(&stmt, params).await
    }

    async fn do_query_opt(
        &self,
        stmt: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<Row>, PgError> {
        let stmt = self.prepare_cached(stmt).await?;
        self.query_opt(&stmt, params).await
    }
}

impl DbClient for Transaction<'_> {
    async fn do_query_one(
        &self,
        stmt: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Row, PgError> {
        let stmt = self.prepare_cached(stmt).await?;
        self.query_one(&stmt, params).await
    }

    async fn do_query(
        &self,
        stmt: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, PgError> {
        let stmt = self.prepare_cached(stmt).await?;
        self.query(&stmt, params).await
    }

    async fn do_execute(&self, stmt: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64, PgError> {
        let stmt = self.prepare_cached(stmt).await?;
        self.execute(&stmt, params).await
    }

    async fn do_query_opt(
        &self,
        stmt: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<Row>, PgError> {
        let stmt = self.prepare_cached(stmt).await?;
        self.query_opt(&stmt, params).await
    }
}

/// Maps a unique violation on `constraint` to [`Error::Conflict`].
#[track_caller]
pub(crate) fn unique_conflict<E>(
    context: &'static str,
    constraint: &'static str,
) -> impl FnOnce(PgError) -> Error<E> {
    let exec = Error::exec(context);
    move |error: PgError| {
        if let Some(db_error) = error.as_db_error()
            && *db_error.code() == crate::SqlState::UNIQUE_VIOLATION
            && db_error.constraint() == Some(constraint)
        {
            return Error::Conflict { context };
        }
        exec(error)
    }
}

/// Splits a domain outcome carried inside `Ok` into [`Error::LogicError`].
#[track_caller]
pub(crate) fn flatten<T, E>(result: crate::Result<Result<T, E>>) -> crate::Result<T, E> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(Error::LogicError(error)),
        Err(error) => Err(error.retype()),
    }
}
