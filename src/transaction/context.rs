//! Transaction context using typestate pattern.
//!
//! The typestate pattern ensures at compile time that transactions
//! are used correctly:
//! - Only active transactions can read and write
//! - Committed/aborted transactions cannot be reused
//!
//! An active transaction reads from the snapshot taken when it began,
//! overlaid with its own buffered writes. Nothing reaches the store until
//! commit, where all writes and all compare-and-swap guards are applied as
//! one atomic batch.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::storage::{BufferedWriter, Datastore, Key, KvReader, KvWriter, StorageError, StorageResult};
use crate::transaction::error::{TransactionError, TransactionResult};

/// Active transactions own their buffered writes.
pub struct TxActive {
    writes: BufferedWriter,
}

/// Marker for committed transactions, with the number of writes applied.
#[derive(Debug)]
pub struct TxCommitted {
    applied: usize,
}

/// Marker type for aborted transactions.
#[derive(Debug)]
pub struct TxAborted;

/// Transaction metadata stored in the manager.
#[derive(Debug, Clone)]
pub struct TransactionMetadata {
    /// Unique transaction ID.
    pub tx_id: String,
    /// When the transaction started.
    pub started_at: DateTime<Utc>,
}

/// A datastore transaction with typestate for lifecycle safety.
pub struct Transaction<State> {
    pub(crate) metadata: TransactionMetadata,
    store: Arc<dyn Datastore>,
    state: State,
}

impl<State> Transaction<State> {
    /// Get the transaction ID.
    pub fn id(&self) -> &str {
        &self.metadata.tx_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.metadata.started_at
    }
}

impl Transaction<TxActive> {
    /// Create a new active transaction over a fresh snapshot.
    pub(crate) fn new(store: Arc<dyn Datastore>, tx_id: String) -> Self {
        let writes = BufferedWriter::new(store.snapshot());
        Self {
            metadata: TransactionMetadata {
                tx_id,
                started_at: Utc::now(),
            },
            store,
            state: TxActive { writes },
        }
    }

    /// number of buffered writes
    pub fn pending_writes(&self) -> usize {
        self.state.writes.batch().len()
    }

    /// Commit the transaction.
    ///
    /// Fails with a retryable conflict if a key this transaction guarded
    /// was changed by someone else since the snapshot.
    pub fn commit(self) -> TransactionResult<Transaction<TxCommitted>> {
        let batch = self.state.writes.into_batch();
        let applied = batch.len();

        match self.store.apply(batch) {
            Ok(()) => {}
            Err(StorageError::ConcurrentModification { key }) => {
                return Err(TransactionError::conflict(&self.metadata.tx_id, key));
            }
            Err(e) => return Err(TransactionError::Storage(e)),
        }

        debug!(tx_id = %self.metadata.tx_id, applied, "transaction committed");
        Ok(Transaction {
            metadata: self.metadata,
            store: self.store,
            state: TxCommitted { applied },
        })
    }

    /// Rollback the transaction, discarding all buffered writes.
    pub fn rollback(self) -> Transaction<TxAborted> {
        debug!(
            tx_id = %self.metadata.tx_id,
            discarded = self.state.writes.batch().len(),
            "transaction rolled back"
        );
        Transaction {
            metadata: self.metadata,
            store: self.store,
            state: TxAborted,
        }
    }
}

impl Transaction<TxCommitted> {
    /// Get the number of writes the commit applied.
    pub fn applied_writes(&self) -> usize {
        self.state.applied
    }
}

impl Transaction<TxAborted> {
    pub fn was_rolled_back(&self) -> bool {
        true
    }
}

impl KvReader for Transaction<TxActive> {
    fn get(&self, key: &Key) -> StorageResult<Option<Vec<u8>>> {
        self.state.writes.get(key)
    }

    fn scan_prefix(&self, prefix: &Key) -> StorageResult<Vec<(Key, Vec<u8>)>> {
        self.state.writes.scan_prefix(prefix)
    }
}

impl KvWriter for Transaction<TxActive> {
    fn put(&mut self, key: Key, value: Vec<u8>) -> StorageResult<()> {
        self.state.writes.put(key, value)
    }

    fn delete(&mut self, key: Key) -> StorageResult<()> {
        self.state.writes.delete(key)
    }

    fn expect(&mut self, key: Key, observed: Option<Vec<u8>>) -> StorageResult<()> {
        self.state.writes.expect(key, observed)
    }
}

impl<State> fmt::Debug for Transaction<State> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("tx_id", &self.metadata.tx_id)
            .field("started_at", &self.metadata.started_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryDatastore, WriteBatch};

    fn setup() -> (MemoryDatastore, Arc<dyn Datastore>) {
        let store = MemoryDatastore::new();
        let shared: Arc<dyn Datastore> = Arc::new(store.clone());
        (store, shared)
    }

    #[test]
    fn test_transaction_write_read_commit() {
        let (store, shared) = setup();
        let mut tx = Transaction::new(shared, "tx001".to_string());

        tx.put(Key::new("/a"), b"1".to_vec()).unwrap();
        assert_eq!(tx.get(&Key::new("/a")).unwrap(), Some(b"1".to_vec()));
        assert!(!store.has(&Key::new("/a")).unwrap());

        let committed = tx.commit().unwrap();
        assert_eq!(committed.applied_writes(), 1);
        assert_eq!(store.get(&Key::new("/a")).unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_transaction_rollback() {
        let (store, shared) = setup();
        let mut tx = Transaction::new(shared, "tx001".to_string());
        tx.put(Key::new("/a"), b"1".to_vec()).unwrap();
        assert_eq!(tx.pending_writes(), 1);

        let aborted = tx.rollback();
        assert!(aborted.was_rolled_back());
        assert!(store.is_empty());
    }

    #[test]
    fn test_transaction_reads_its_snapshot() {
        let (store, shared) = setup();
        let tx = Transaction::new(shared, "tx001".to_string());

        let mut batch = WriteBatch::new();
        batch.put(Key::new("/outside"), b"x".to_vec());
        store.apply(batch).unwrap();

        assert!(!tx.has(&Key::new("/outside")).unwrap());
        tx.rollback();
    }

    #[test]
    fn test_guarded_key_conflict() {
        let (store, shared) = setup();
        let mut tx = Transaction::new(shared, "tx001".to_string());

        let key = Key::new("/heads/doc/C");
        let observed = tx.get(&key).unwrap();
        tx.expect(key.clone(), observed).unwrap();
        tx.put(key.clone(), b"mine".to_vec()).unwrap();

        // someone else moves the head first
        let mut batch = WriteBatch::new();
        batch.put(key.clone(), b"theirs".to_vec());
        store.apply(batch).unwrap();

        let err = tx.commit().unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, TransactionError::Conflict { .. }));
        assert_eq!(store.get(&key).unwrap(), Some(b"theirs".to_vec()));
    }
}
