use super::*;
use crate::pool::RealDbPool;
use faucet_lib::{ClaimStatus, Decimal, Tier};

mod claims;
mod stats;
mod users;

fn to_limit(limit: usize) -> i64 {
    limit.min(crate::MAX_LIST_LIMIT) as i64
}

#[async_trait]
impl FaucetConnection for RealDbPool {
    async fn ensure_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> crate::Result<UserAccount> {
        self.ensure_user_impl(user_id, now).await
    }

    async fn get_user(&self, user_id: UserId) -> crate::Result<Option<UserAccount>> {
        let conn = self.get_conn().await?;
        users::get_user(&conn, user_id).await
    }

    async fn link_account(
        &self,
        user_id: UserId,
        name: &AccountName,
        now: DateTime<Utc>,
    ) -> crate::Result<UserAccount> {
        self.link_account_impl(user_id, name, now).await
    }

    async fn admit_claim(&self, admission: &Admission) -> crate::Result<Claim, Denial> {
        flatten(self.admit_claim_impl(admission).await)
    }

    async fn get_claim(&self, id: ClaimId) -> crate::Result<Option<Claim>> {
        let conn = self.get_conn().await?;
        claims::get_claim(&conn, id).await
    }

    async fn list_pending_claims(&self, user_id: UserId) -> crate::Result<Vec<Claim>> {
        self.list_pending_claims_impl(user_id).await
    }

    async fn list_user_claims(&self, user_id: UserId, limit: usize) -> crate::Result<Vec<Claim>> {
        self.list_user_claims_impl(user_id, to_limit(limit)).await
    }

    async fn recent_claims(&self, limit: usize) -> crate::Result<Vec<Claim>> {
        self.recent_claims_impl(to_limit(limit)).await
    }

    async fn oldest_pending_claims(&self, limit: usize) -> crate::Result<Vec<Claim>> {
        self.oldest_pending_claims_impl(to_limit(limit)).await
    }

    async fn complete_claim(
        &self,
        id: ClaimId,
        transaction_id: &str,
        now: DateTime<Utc>,
    ) -> crate::Result<Claim, AlreadySettled> {
        flatten(self.complete_claim_impl(id, transaction_id, now).await)
    }

    async fn fail_claim(
        &self,
        id: ClaimId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> crate::Result<Claim, AlreadySettled> {
        flatten(self.fail_claim_impl(id, reason, now).await)
    }

    async fn get_stats(&self) -> crate::Result<AggregateStats> {
        self.get_stats_impl().await
    }

    async fn recompute_stats(&self, now: DateTime<Utc>) -> crate::Result<AggregateStats> {
        self.recompute_stats_impl(now).await
    }
}
