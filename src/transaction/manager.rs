//! Transaction manager - coordinates all transaction operations.
//!
//! The TransactionManager is the main entry point for transactions.
//! It handles:
//! - Transaction creation and lifecycle
//! - Tracking active transactions
//! - Serializing commits to the store
//! - Retrying transactions that lost a race

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::warn;
use ulid::Ulid;

use crate::storage::{Datastore, KvReader};
use crate::transaction::context::{Transaction, TransactionMetadata, TxActive};
use crate::transaction::error::{Retryable, TransactionError, TransactionResult};

/// default number of retries for retryable failures
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Transaction manager - coordinates all transaction operations.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc internally).
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<TransactionManagerInner>,
}

struct TransactionManagerInner {
    /// The underlying store.
    store: Arc<dyn Datastore>,
    /// Active transactions tracked by ID.
    active: RwLock<HashMap<String, TransactionMetadata>>,
    /// Mutex for serializing commits.
    commit_lock: Mutex<()>,
    max_retries: u32,
}

impl TransactionManager {
    /// Create a new transaction manager for the given store.
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self::with_max_retries(store, DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(store: Arc<dyn Datastore>, max_retries: u32) -> Self {
        Self {
            inner: Arc::new(TransactionManagerInner {
                store,
                active: RwLock::new(HashMap::new()),
                commit_lock: Mutex::new(()),
                max_retries,
            }),
        }
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &Arc<dyn Datastore> {
        &self.inner.store
    }

    /// A read-only snapshot of the current state, for queries.
    pub fn snapshot(&self) -> Arc<dyn KvReader> {
        self.inner.store.snapshot()
    }

    pub fn max_retries(&self) -> u32 {
        self.inner.max_retries
    }

    /// Begin a new transaction.
    pub fn begin(&self) -> Transaction<TxActive> {
        let tx_id = Ulid::new().to_string().to_lowercase();
        let tx = Transaction::new(Arc::clone(&self.inner.store), tx_id.clone());

        self.inner.active.write().insert(tx_id, tx.metadata.clone());
        tx
    }

    /// Get the number of active transactions.
    pub fn active_count(&self) -> usize {
        self.inner.active.read().len()
    }

    /// List all active transaction IDs.
    pub fn active_transactions(&self) -> Vec<String> {
        self.inner.active.read().keys().cloned().collect()
    }

    /// Check if a transaction is active.
    pub fn is_active(&self, tx_id: &str) -> bool {
        self.inner.active.read().contains_key(tx_id)
    }

    /// Get metadata for an active transaction.
    pub fn get_transaction_info(&self, tx_id: &str) -> Option<TransactionMetadata> {
        self.inner.active.read().get(tx_id).cloned()
    }

    fn mark_completed(&self, tx_id: &str) {
        self.inner.active.write().remove(tx_id);
    }

    /// Commit a transaction with serialization.
    ///
    /// Returns the number of writes applied.
    pub fn commit_transaction(&self, tx: Transaction<TxActive>) -> TransactionResult<usize> {
        let _guard = self.inner.commit_lock.lock();

        let tx_id = tx.id().to_string();
        let result = tx.commit();
        self.mark_completed(&tx_id);

        Ok(result?.applied_writes())
    }

    /// Rollback a transaction.
    pub fn rollback_transaction(&self, tx: Transaction<TxActive>) {
        let tx_id = tx.id().to_string();
        tx.rollback();
        self.mark_completed(&tx_id);
    }

    /// Execute a function within a transaction, automatically committing or rolling back.
    ///
    /// If the function returns Ok, the transaction is committed.
    /// If it returns Err, the transaction is rolled back.
    /// Retryable failures start a fresh transaction, up to the configured
    /// number of retries.
    pub fn with_transaction<F, T, E>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut(&mut Transaction<TxActive>) -> Result<T, E>,
        E: From<TransactionError> + Retryable + std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            let mut tx = self.begin();
            let outcome = match f(&mut tx) {
                Ok(value) => self.commit_transaction(tx).map(|_| value).map_err(E::from),
                Err(e) => {
                    self.rollback_transaction(tx);
                    Err(e)
                }
            };

            match outcome {
                Err(e) if e.is_retryable() && attempt < self.inner.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "retrying transaction");
                }
                other => return other,
            }
        }
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("active_count", &self.active_count())
            .field("max_retries", &self.inner.max_retries)
            .finish()
    }
}
