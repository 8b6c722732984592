use super::{AccountInfo, LedgerClient, LedgerError, TransactionId, TransferRequest};
use crate::AccountName;
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

/// In-process ledger for local runs and tests.
#[derive(Default)]
pub struct MemoryLedger {
    accounts: Mutex<HashMap<AccountName, AccountInfo>>,
    transfers: Mutex<Vec<TransferRequest>>,
    lookup_error: Mutex<Option<LedgerError>>,
    transfer_error: Mutex<Option<LedgerError>>,
    fixed_tx_id: Mutex<Option<TransactionId>>,
    next_tx: AtomicU64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, info: AccountInfo) -> Self {
        self.insert_account(info);
        self
    }

    pub fn insert_account(&self, info: AccountInfo) {
        lock(&self.accounts).insert(info.name.clone(), info);
    }

    pub fn remove_account(&self, name: &AccountName) {
        lock(&self.accounts).remove(name);
    }

    /// Every later lookup fails with `error` until cleared with `None`.
    pub fn fail_lookups(&self, error: Option<LedgerError>) {
        *lock(&self.lookup_error) = error;
    }

    /// Every later transfer fails with `error` until cleared with `None`.
    pub fn fail_transfers(&self, error: Option<LedgerError>) {
        *lock(&self.transfer_error) = error;
    }

    pub fn set_tx_id(&self, id: Option<&str>) {
        *lock(&self.fixed_tx_id) = id.map(str::to_owned);
    }

    pub fn transfers(&self) -> Vec<TransferRequest> {
        lock(&self.transfers).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait::async_trait]
impl LedgerClient for MemoryLedger {
    async fn get_account(&self, name: &AccountName) -> Result<Option<AccountInfo>, LedgerError> {
        if let Some(error) = lock(&self.lookup_error).clone() {
            return Err(error);
        }
        Ok(lock(&self.accounts).get(name).cloned())
    }

    async fn transfer(&self, req: &TransferRequest) -> Result<TransactionId, LedgerError> {
        if let Some(error) = lock(&self.transfer_error).clone() {
            return Err(error);
        }
        lock(&self.transfers).push(req.clone());
        let id = match lock(&self.fixed_tx_id).clone() {
            Some(id) => id,
            None => format!("mem-tx-{}", self.next_tx.fetch_add(1, Ordering::Relaxed)),
        };
        Ok(id)
    }
}
