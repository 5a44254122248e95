//! Transaction managers
//!
//! The engine only needs begin/commit/rollback boundaries. Resources with real
//! transactional semantics wrap their own manager; file and memory adapters
//! emulate it through `mark`/`reset`.

use crate::adapters::traits::{TransactionAttributes, TransactionHandle, TransactionManager};
use crate::domain::{BatchError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Transaction manager with no underlying resource
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourcelessTransactionManager;

impl ResourcelessTransactionManager {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransactionManager for ResourcelessTransactionManager {
    async fn begin(&self, attributes: &TransactionAttributes) -> Result<TransactionHandle> {
        Ok(TransactionHandle::new(attributes))
    }

    async fn commit(&self, _handle: TransactionHandle) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self, _handle: TransactionHandle) -> Result<()> {
        Ok(())
    }
}

/// Counts of transaction outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub begun: usize,
    pub committed: usize,
    pub rolled_back: usize,
}

#[derive(Default)]
struct Ledger {
    open: HashSet<Uuid>,
    stats: TransactionStats,
    fail_commits: bool,
}

/// Transaction manager that tracks open transactions
///
/// Commit and rollback of a handle that is not open are errors, which catches
/// double completion. Commits can be made to fail to exercise fatal paths.
#[derive(Clone, Default)]
pub struct InMemoryTransactionManager {
    ledger: Arc<Mutex<Ledger>>,
}

impl InMemoryTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> TransactionStats {
        self.ledger.lock().stats
    }

    /// Transactions begun but not yet completed
    pub fn open_transactions(&self) -> usize {
        self.ledger.lock().open.len()
    }

    /// Make every following commit fail
    pub fn fail_commits(&self, fail: bool) {
        self.ledger.lock().fail_commits = fail;
    }
}

#[async_trait]
impl TransactionManager for InMemoryTransactionManager {
    async fn begin(&self, attributes: &TransactionAttributes) -> Result<TransactionHandle> {
        let handle = TransactionHandle::new(attributes);
        let mut ledger = self.ledger.lock();
        ledger.open.insert(handle.id);
        ledger.stats.begun += 1;
        Ok(handle)
    }

    async fn commit(&self, handle: TransactionHandle) -> Result<()> {
        let mut ledger = self.ledger.lock();
        if !ledger.open.remove(&handle.id) {
            return Err(BatchError::Transaction(format!(
                "Transaction {} is not open",
                handle.id
            )));
        }
        if ledger.fail_commits {
            return Err(BatchError::Transaction(format!(
                "Commit of transaction {} failed",
                handle.id
            )));
        }
        ledger.stats.committed += 1;
        Ok(())
    }

    async fn rollback(&self, handle: TransactionHandle) -> Result<()> {
        let mut ledger = self.ledger.lock();
        if !ledger.open.remove(&handle.id) {
            return Err(BatchError::Transaction(format!(
                "Transaction {} is not open",
                handle.id
            )));
        }
        ledger.stats.rolled_back += 1;
        Ok(())
    }
}
