// ============================================================================
// Transaction Manager
// ============================================================================

use super::{Transaction, TransactionId};
use crate::core::{DeskError, Result};
use crate::storage::{InMemoryStorage, JournalEntry, PersistenceManager, RowKey};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{Level, event};

/// Outcome of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitInfo {
    pub txn_id: TransactionId,
    /// Store version after the commit; unchanged for read-only transactions
    pub commit_version: u64,
    pub change_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub started: u64,
    pub committed: u64,
    pub conflicts: u64,
    pub rolled_back: u64,
}

pub struct TransactionManager {
    storage: Arc<RwLock<InMemoryStorage>>,
    persistence: Option<Arc<Mutex<PersistenceManager>>>,
    started: AtomicU64,
    committed: AtomicU64,
    conflicts: AtomicU64,
    rolled_back: AtomicU64,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(InMemoryStorage::new())
    }
}

impl TransactionManager {
    pub fn new(storage: InMemoryStorage) -> Self {
        Self {
            storage: Arc::new(RwLock::new(storage)),
            persistence: None,
            started: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            rolled_back: AtomicU64::new(0),
        }
    }

    pub fn with_persistence(storage: InMemoryStorage, persistence: PersistenceManager) -> Self {
        let mut manager = Self::new(storage);
        manager.persistence = Some(Arc::new(Mutex::new(persistence)));
        manager
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence.is_some()
    }

    pub async fn begin(&self) -> Transaction {
        let snapshot = self.storage.read().await.clone();
        self.started.fetch_add(1, Ordering::Relaxed);
        let txn = Transaction::new(TransactionId::new(), snapshot);
        event!(
            Level::TRACE,
            txn = %txn.id(),
            base_version = txn.base_version(),
            "transaction started"
        );
        txn
    }

    /// Consistent read-only copy of the committed store.
    pub async fn snapshot(&self) -> InMemoryStorage {
        self.storage.read().await.clone()
    }

    /// Validate the read set and apply the buffered changes atomically.
    ///
    /// The journal entry is written before the in-memory store changes; if
    /// that write fails nothing is applied.
    pub async fn commit(&self, mut txn: Transaction) -> Result<CommitInfo> {
        if !txn.state().is_active() {
            return Err(DeskError::ExecutionError(format!(
                "Transaction {} is not active",
                txn.id()
            )));
        }

        if txn.changes().is_empty() {
            txn.commit()?;
            self.committed.fetch_add(1, Ordering::Relaxed);
            return Ok(CommitInfo {
                txn_id: txn.id(),
                commit_version: txn.base_version(),
                change_count: 0,
            });
        }

        let mut storage = self.storage.write().await;

        if let Some(stale) = Self::first_stale_row(&storage, &txn) {
            txn.rollback()?;
            self.conflicts.fetch_add(1, Ordering::Relaxed);
            event!(
                Level::DEBUG,
                txn = %txn.id(),
                row = %stale,
                "commit rejected, row changed since snapshot"
            );
            return Err(DeskError::WriteConflict(format!(
                "{} changed after {} started",
                stale,
                txn.id()
            )));
        }

        let commit_version = storage.commit_version() + 1;
        if let Some(persistence) = &self.persistence {
            let entry = JournalEntry {
                commit_version,
                txn_id: txn.id().as_u64(),
                committed_at: Utc::now(),
                changes: txn.changes().to_vec(),
            };
            let mut persistence = persistence.lock().await;
            if let Err(err) = persistence.log_commit(&entry) {
                txn.rollback()?;
                self.rolled_back.fetch_add(1, Ordering::Relaxed);
                event!(Level::ERROR, error = %err, "journal append failed");
                return Err(err);
            }
        }

        for change in txn.changes() {
            change.apply_to(&mut storage);
        }
        storage.set_commit_version(commit_version);

        if let Some(persistence) = &self.persistence {
            let mut persistence = persistence.lock().await;
            if persistence.needs_checkpoint() {
                // the commit is already durable in the journal
                if let Err(err) = persistence.checkpoint(&storage) {
                    event!(Level::WARN, error = %err, "automatic checkpoint failed");
                }
            }
        }

        let change_count = txn.change_count();
        txn.commit()?;
        self.committed.fetch_add(1, Ordering::Relaxed);
        event!(
            Level::TRACE,
            txn = %txn.id(),
            commit_version,
            change_count,
            "transaction committed"
        );

        Ok(CommitInfo {
            txn_id: txn.id(),
            commit_version,
            change_count,
        })
    }

    pub fn rollback(&self, mut txn: Transaction) -> Result<()> {
        if txn.state().is_active() {
            txn.rollback()?;
            self.rolled_back.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Snapshot the store and truncate the journal. No-op when in-memory.
    pub async fn checkpoint(&self) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        let storage = self.storage.read().await;
        persistence.lock().await.checkpoint(&storage)
    }

    pub fn stats(&self) -> TransactionStats {
        TransactionStats {
            started: self.started.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
        }
    }

    fn first_stale_row(storage: &InMemoryStorage, txn: &Transaction) -> Option<RowKey> {
        txn.read_set()
            .iter()
            .find(|(key, version)| storage.version_of(key) != **version)
            .map(|(key, _)| key.clone())
    }
}
