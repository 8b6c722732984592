//! Settlement of pending claims.
//!
//! A batch takes the oldest pending claims, re-checks each target account,
//! submits the transfer and records the outcome. Claims are settled
//! independently: one failure never affects its siblings, and a failed claim
//! is terminal.

use crate::{
    ClaimError,
    notify::{self, Notifier},
};
use chrono::Utc;
use db::DbPool;
use faucet_lib::{
    AccountName, Claim, ClaimId, Denial, LedgerClient, LedgerError, TransactionId,
    TransferRequest, ValidationError, ledger::steem::LedgerConfig,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct SettlementConfig {
    /// Seconds between scheduled batches, 0 disables the schedule.
    #[serde(default = "SettlementConfig::default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "SettlementConfig::default_batch_size")]
    pub batch_size: usize,
    /// Claims settled at the same time within a batch.
    #[serde(default = "SettlementConfig::default_concurrency")]
    pub concurrency: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            interval_secs: Self::default_interval_secs(),
            batch_size: Self::default_batch_size(),
            concurrency: Self::default_concurrency(),
        }
    }
}

impl SettlementConfig {
    fn default_interval_secs() -> u64 {
        60
    }

    fn default_batch_size() -> usize {
        10
    }

    fn default_concurrency() -> usize {
        4
    }

    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub selected: usize,
    pub completed: usize,
    pub failed: usize,
    /// Claims another runner settled first.
    pub already_settled: usize,
    /// Claims whose outcome could not be stored.
    pub errors: usize,
    /// Another batch was still running, nothing was done.
    pub busy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
    AlreadySettled,
    Error,
}

#[derive(Clone)]
pub struct Settlement {
    db: DbPool,
    ledger: Arc<dyn LedgerClient>,
    notifier: Arc<dyn Notifier>,
    faucet_account: AccountName,
    symbol: String,
    call_timeout: Duration,
    config: SettlementConfig,
    running: Arc<tokio::sync::Mutex<()>>,
    /// Transfers that went through but whose completion could not be stored.
    /// Later batches retry the store write instead of transferring again.
    unrecorded: Arc<Mutex<HashMap<ClaimId, TransactionId>>>,
}

impl Settlement {
    pub fn new(
        db: DbPool,
        ledger: Arc<dyn LedgerClient>,
        notifier: Arc<dyn Notifier>,
        ledger_config: &LedgerConfig,
        config: SettlementConfig,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            db,
            ledger,
            notifier,
            faucet_account: AccountName::new(&ledger_config.faucet_account)?,
            symbol: ledger_config.symbol.clone(),
            call_timeout: ledger_config.timeout(),
            config,
            running: Arc::new(tokio::sync::Mutex::new(())),
            unrecorded: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Resolves once no batch is running.
    pub async fn wait_idle(&self) {
        let _guard = self.running.lock().await;
    }

    /// Settles up to `max` (default `batch_size`) of the oldest pending
    /// claims.
    ///
    /// Only one batch runs at a time per `Settlement`; an overlapping call
    /// returns a report with `busy` set.
    pub async fn run_batch(&self, max: Option<usize>) -> Result<BatchReport, ClaimError> {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::info!("settlement batch already running");
            return Ok(BatchReport {
                busy: true,
                ..BatchReport::default()
            });
        };

        let limit = db::clamp_limit(max, self.config.batch_size);
        let claims = self.db.conn().oldest_pending_claims(limit).await?;
        let mut report = BatchReport {
            selected: claims.len(),
            ..BatchReport::default()
        };
        if claims.is_empty() {
            return Ok(report);
        }

        let outcomes = futures_util::stream::iter(claims)
            .map(|claim| self.settle_one(claim))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;
        for outcome in outcomes {
            match outcome {
                Outcome::Completed => report.completed += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::AlreadySettled => report.already_settled += 1,
                Outcome::Error => report.errors += 1,
            }
        }

        tracing::info!(
            "settlement batch: selected={}, completed={}, failed={}, already_settled={}, errors={}",
            report.selected,
            report.completed,
            report.failed,
            report.already_settled,
            report.errors
        );
        Ok(report)
    }

    async fn account_exists(&self, name: &AccountName) -> Result<bool, LedgerError> {
        let account = tokio::time::timeout(self.call_timeout, self.ledger.get_account(name))
            .await
            .map_err(|_| LedgerError::Timeout)??;
        Ok(account.is_some())
    }

    async fn transfer(&self, claim: &Claim) -> Result<TransactionId, LedgerError> {
        let req = TransferRequest {
            from: self.faucet_account.clone(),
            to: claim.account_name.clone(),
            amount: claim.amount,
            memo: claim.memo(&self.symbol),
        };
        tokio::time::timeout(self.call_timeout, self.ledger.transfer(&req))
            .await
            .map_err(|_| LedgerError::Timeout)?
    }

    fn unrecorded(&self) -> std::sync::MutexGuard<'_, HashMap<ClaimId, TransactionId>> {
        self.unrecorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn settle_one(&self, claim: Claim) -> Outcome {
        let sent = self.unrecorded().get(&claim.id).cloned();
        if let Some(transaction_id) = sent {
            tracing::info!(
                "retrying completion of claim {} with tx {}",
                claim.id,
                transaction_id
            );
            return self.record_completed(claim, transaction_id).await;
        }

        let reason = match self.account_exists(&claim.account_name).await {
            Ok(true) => match self.transfer(&claim).await {
                Ok(transaction_id) => return self.record_completed(claim, transaction_id).await,
                Err(error) => error.to_string(),
            },
            Ok(false) => Denial::AccountNotFound.to_string(),
            Err(error) => error.to_string(),
        };
        self.record_failed(claim, reason).await
    }

    async fn record_completed(&self, claim: Claim, transaction_id: TransactionId) -> Outcome {
        let result = self
            .db
            .conn()
            .complete_claim(claim.id, &transaction_id, Utc::now())
            .await;
        if let Err(db::Error::LogicError(_)) | Ok(_) = &result {
            self.unrecorded().remove(&claim.id);
        }
        match result {
            Ok(claim) => {
                tracing::info!(
                    "claim {} completed: {} to {}, tx {}",
                    claim.id,
                    claim.amount,
                    claim.account_name,
                    transaction_id
                );
                notify::spawn_claim_completed(self.notifier.clone(), claim, self.symbol.clone());
                Outcome::Completed
            }
            Err(db::Error::LogicError(settled)) => {
                tracing::error!(
                    "transfer {} sent but claim was already settled: {}",
                    transaction_id,
                    settled
                );
                Outcome::AlreadySettled
            }
            Err(error) => {
                tracing::error!(
                    "transfer {} sent for claim {} but recording it failed: {}",
                    transaction_id,
                    claim.id,
                    error
                );
                self.unrecorded().insert(claim.id, transaction_id);
                Outcome::Error
            }
        }
    }

    async fn record_failed(&self, claim: Claim, reason: String) -> Outcome {
        tracing::warn!("claim {} failed: {}", claim.id, reason);
        match self
            .db
            .conn()
            .fail_claim(claim.id, &reason, Utc::now())
            .await
        {
            Ok(_) => Outcome::Failed,
            Err(db::Error::LogicError(settled)) => {
                tracing::warn!("{}", settled);
                Outcome::AlreadySettled
            }
            Err(error) => {
                tracing::error!("failed to record failure of claim {}: {}", claim.id, error);
                Outcome::Error
            }
        }
    }
}
