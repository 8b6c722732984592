//! Embedded faucet store on sled.
//!
//! All records live in one bucket so that a single sled transaction can
//! cover a user, their claim, the pending-claim pointer and the stats record.
//! Keys are namespaced: `user/{id}`, `claim/{id}`, `pending/{user id}` and
//! `stats`.

use crate::{
    Admission, Error,
    connection::{FaucetConnection, flatten},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use faucet_lib::{
    AccountName, AggregateStats, AlreadySettled, Claim, ClaimId, ClaimStatus, Denial,
    UserAccount, UserId,
};
use kv::{Bucket, Json, Raw, Store};
use serde::{Deserialize, Serialize};
use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

const BUCKET: &str = "faucet";

#[derive(Clone)]
pub struct LocalStorage {
    db: kv::Store,
    // held by writers of the stats record that also iterate claims
    stats_lock: Arc<Mutex<()>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
enum Record {
    User(UserAccount),
    Claim(Claim),
    Pending(ClaimId),
    Stats(AggregateStats),
}

impl Record {
    fn into_user(self) -> Option<UserAccount> {
        match self {
            Record::User(user) => Some(user),
            _ => None,
        }
    }

    fn into_claim(self) -> Option<Claim> {
        match self {
            Record::Claim(claim) => Some(claim),
            _ => None,
        }
    }

    fn into_pending(self) -> Option<ClaimId> {
        match self {
            Record::Pending(id) => Some(id),
            _ => None,
        }
    }

    fn into_stats(self) -> Option<AggregateStats> {
        match self {
            Record::Stats(stats) => Some(stats),
            _ => None,
        }
    }
}

fn key(s: String) -> Raw {
    Raw::from(s.as_bytes())
}

fn user_key(id: &UserId) -> Raw {
    key(format!("user/{id}"))
}

fn claim_key(id: &ClaimId) -> Raw {
    key(format!("claim/{id}"))
}

fn pending_key(user_id: &UserId) -> Raw {
    key(format!("pending/{user_id}"))
}

fn stats_key() -> Raw {
    Raw::from(b"stats".as_slice())
}

fn claim_time(claim: &Claim) -> DateTime<Utc> {
    claim.processed_at.unwrap_or(claim.created_at)
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        tracing::info!("openning sled storage: {}", path.as_ref().display());
        let db = Store::new(kv::Config::new(path)).map_err(Error::local("open"))?;
        Ok(Self {
            db,
            stats_lock: Arc::new(Mutex::new(())),
        })
    }

    fn bucket(&self) -> crate::Result<Bucket<'_, Raw, Json<Record>>> {
        self.db
            .bucket(Some(BUCKET))
            .map_err(Error::local("open faucet bucket"))
    }

    /// Runs sled calls off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> crate::Result<T>
    where
        F: FnOnce(&LocalStorage) -> crate::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(&this)).await?
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, ()> {
        self.stats_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn get_record(&self, key: &Raw) -> crate::Result<Option<Record>> {
        Ok(self
            .bucket()?
            .get(key)
            .map_err(Error::local("get"))?
            .map(|json| json.0))
    }

    fn claims_where(&self, filter: impl Fn(&Claim) -> bool) -> crate::Result<Vec<Claim>> {
        let bucket = self.bucket()?;
        let mut claims = Vec::new();
        for item in bucket.iter() {
            let item = item.map_err(Error::local("iter"))?;
            let value = item
                .value::<Json<Record>>()
                .map_err(Error::local("decode"))?;
            if let Record::Claim(claim) = value.0
                && filter(&claim)
            {
                claims.push(claim);
            }
        }
        Ok(claims)
    }

    fn newest_first(mut claims: Vec<Claim>, limit: usize) -> Vec<Claim> {
        claims.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        claims.truncate(limit);
        claims
    }

    fn ensure_user_sync(&self, user_id: UserId, now: DateTime<Utc>) -> crate::Result<UserAccount> {
        let key = user_key(&user_id);
        let (user, created) = self
            .bucket()?
            .transaction::<_, kv::Error, _>(|tx| {
                match tx.get(&key)?.and_then(|r| r.0.into_user()) {
                    Some(user) => Ok((user, false)),
                    None => {
                        let user = UserAccount::new(user_id, now);
                        tx.set(&key, &Json(Record::User(user.clone())))?;
                        Ok((user, true))
                    }
                }
            })
            .map_err(Error::local("ensure user"))?;
        if created {
            tracing::info!("created faucet user {}", user_id);
        }
        Ok(user)
    }

    fn link_account_sync(
        &self,
        user_id: UserId,
        name: &AccountName,
        now: DateTime<Utc>,
    ) -> crate::Result<UserAccount> {
        let key = user_key(&user_id);
        self.bucket()?
            .transaction::<_, kv::Error, _>(|tx| {
                let mut user = tx
                    .get(&key)?
                    .and_then(|r| r.0.into_user())
                    .unwrap_or_else(|| UserAccount::new(user_id, now));
                user.account_name = Some(name.clone());
                user.updated_at = now;
                tx.set(&key, &Json(Record::User(user.clone())))?;
                Ok(user)
            })
            .map_err(Error::local("link account"))
    }

    fn admit_claim_sync(&self, admission: &Admission) -> crate::Result<Result<Claim, Denial>> {
        let user_key = user_key(&admission.user_id);
        let pending_key = pending_key(&admission.user_id);
        self.bucket()?
            .transaction::<_, kv::Error, _>(|tx| {
                let Some(mut user) = tx.get(&user_key)?.and_then(|r| r.0.into_user()) else {
                    return Ok(None);
                };
                let pending = tx.get(&pending_key)?.and_then(|r| r.0.into_pending());
                if let Err(denial) = admission.evaluate(&user, pending) {
                    return Ok(Some(Err(denial)));
                }

                let claim = admission.to_claim(&user);
                user.record_claim(admission.amount, admission.now);

                tx.set(&claim_key(&claim.id), &Json(Record::Claim(claim.clone())))?;
                tx.set(&pending_key, &Json(Record::Pending(claim.id)))?;
                tx.set(&user_key, &Json(Record::User(user)))?;
                Ok(Some(Ok(claim)))
            })
            .map_err(Error::local("admit claim"))?
            .ok_or_else(|| Error::not_found("user", admission.user_id))
    }

    /// Applies `settle` to a pending claim and clears the owner's pending
    /// pointer. With `count` set the claim is also added to the stats record.
    fn settle_claim_sync(
        &self,
        id: ClaimId,
        context: &'static str,
        count: bool,
        settle: impl Fn(&mut Claim) -> Result<(), AlreadySettled>,
    ) -> crate::Result<Result<Claim, AlreadySettled>> {
        let key = claim_key(&id);
        let outcome = self
            .bucket()?
            .transaction::<_, kv::Error, _>(|tx| {
                let Some(mut claim) = tx.get(&key)?.and_then(|r| r.0.into_claim()) else {
                    return Ok(None);
                };
                if let Err(settled) = settle(&mut claim) {
                    return Ok(Some(Err(settled)));
                }
                tx.set(&key, &Json(Record::Claim(claim.clone())))?;

                let pending_key = pending_key(&claim.user_id);
                if tx.get(&pending_key)?.and_then(|r| r.0.into_pending()) == Some(claim.id) {
                    tx.remove(&pending_key)?;
                }

                let mut first_sighting = false;
                if count {
                    let mut stats = tx
                        .get(&stats_key())?
                        .and_then(|r| r.0.into_stats())
                        .unwrap_or_default();
                    first_sighting =
                        stats.record_completed_claim(claim.amount, &claim.account_name, claim_time(&claim));
                    tx.set(&stats_key(), &Json(Record::Stats(stats)))?;
                }
                Ok(Some(Ok((claim, first_sighting))))
            })
            .map_err(Error::local(context))?
            .ok_or_else(|| Error::not_found("claim", id))?;

        Ok(outcome.map(|(claim, first_sighting)| {
            if first_sighting {
                tracing::info!("first completed claim for account {}", claim.account_name);
            }
            claim
        }))
    }

    fn complete_claim_sync(
        &self,
        id: ClaimId,
        transaction_id: &str,
        now: DateTime<Utc>,
    ) -> crate::Result<Result<Claim, AlreadySettled>> {
        let _guard = self.lock_stats();
        self.settle_claim_sync(id, "complete claim", true, |claim| {
            claim.complete(transaction_id, now)
        })
    }

    fn fail_claim_sync(
        &self,
        id: ClaimId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> crate::Result<Result<Claim, AlreadySettled>> {
        self.settle_claim_sync(id, "fail claim", false, |claim| claim.fail(reason, now))
    }

    fn get_stats_sync(&self) -> crate::Result<AggregateStats> {
        Ok(self
            .get_record(&stats_key())?
            .and_then(Record::into_stats)
            .unwrap_or_default())
    }

    fn recompute_stats_sync(&self, now: DateTime<Utc>) -> crate::Result<AggregateStats> {
        let _guard = self.lock_stats();
        let completed = self.claims_where(|c| c.status == ClaimStatus::Completed)?;
        let stats = AggregateStats::replay(&completed, now);
        self.bucket()?
            .set(&stats_key(), &Json(Record::Stats(stats.clone())))
            .map_err(Error::local("set stats"))?;
        tracing::info!(
            "recomputed stats: total_distributed={}, total_users={}",
            stats.total_distributed,
            stats.total_users
        );
        Ok(stats)
    }
}

#[async_trait]
impl FaucetConnection for LocalStorage {
    async fn ensure_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> crate::Result<UserAccount> {
        self.blocking(move |s| s.ensure_user_sync(user_id, now))
            .await
    }

    async fn get_user(&self, user_id: UserId) -> crate::Result<Option<UserAccount>> {
        self.blocking(move |s| {
            Ok(s.get_record(&user_key(&user_id))?
                .and_then(Record::into_user))
        })
        .await
    }

    async fn link_account(
        &self,
        user_id: UserId,
        name: &AccountName,
        now: DateTime<Utc>,
    ) -> crate::Result<UserAccount> {
        let name = name.clone();
        self.blocking(move |s| s.link_account_sync(user_id, &name, now))
            .await
    }

    async fn admit_claim(&self, admission: &Admission) -> crate::Result<Claim, Denial> {
        let admission = admission.clone();
        flatten(
            self.blocking(move |s| s.admit_claim_sync(&admission))
                .await,
        )
    }

    async fn get_claim(&self, id: ClaimId) -> crate::Result<Option<Claim>> {
        self.blocking(move |s| Ok(s.get_record(&claim_key(&id))?.and_then(Record::into_claim)))
            .await
    }

    async fn list_pending_claims(&self, user_id: UserId) -> crate::Result<Vec<Claim>> {
        self.blocking(move |s| {
            let Some(id) = s
                .get_record(&pending_key(&user_id))?
                .and_then(Record::into_pending)
            else {
                return Ok(Vec::new());
            };
            Ok(s.get_record(&claim_key(&id))?
                .and_then(Record::into_claim)
                .filter(Claim::is_pending)
                .into_iter()
                .collect())
        })
        .await
    }

    async fn list_user_claims(&self, user_id: UserId, limit: usize) -> crate::Result<Vec<Claim>> {
        self.blocking(move |s| {
            let claims = s.claims_where(|c| c.user_id == user_id)?;
            Ok(Self::newest_first(claims, limit))
        })
        .await
    }

    async fn recent_claims(&self, limit: usize) -> crate::Result<Vec<Claim>> {
        self.blocking(move |s| Ok(Self::newest_first(s.claims_where(|_| true)?, limit)))
            .await
    }

    async fn oldest_pending_claims(&self, limit: usize) -> crate::Result<Vec<Claim>> {
        self.blocking(move |s| {
            let mut claims = s.claims_where(Claim::is_pending)?;
            claims.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
            claims.truncate(limit);
            Ok(claims)
        })
        .await
    }

    async fn complete_claim(
        &self,
        id: ClaimId,
        transaction_id: &str,
        now: DateTime<Utc>,
    ) -> crate::Result<Claim, AlreadySettled> {
        let transaction_id = transaction_id.to_owned();
        flatten(
            self.blocking(move |s| s.complete_claim_sync(id, &transaction_id, now))
                .await,
        )
    }

    async fn fail_claim(
        &self,
        id: ClaimId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> crate::Result<Claim, AlreadySettled> {
        let reason = reason.to_owned();
        flatten(
            self.blocking(move |s| s.fail_claim_sync(id, &reason, now))
                .await,
        )
    }

    async fn get_stats(&self) -> crate::Result<AggregateStats> {
        self.blocking(|s| s.get_stats_sync()).await
    }

    async fn recompute_stats(&self, now: DateTime<Utc>) -> crate::Result<AggregateStats> {
        self.blocking(move |s| s.recompute_stats_sync(now)).await
    }
}
