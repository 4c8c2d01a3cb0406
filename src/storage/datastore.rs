//! Transactional key-value store the commit graph is persisted into.
//!
//! Readers work on immutable snapshots, so a long traversal never blocks a
//! writer. Writers submit a [`WriteBatch`] that is applied atomically: every
//! guard is checked first and nothing is written unless all of them hold.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::keys::Key;

/// Read access to an ordered key space.
pub trait KvReader: Send + Sync {
    fn get(&self, key: &Key) -> StorageResult<Option<Vec<u8>>>;

    fn has(&self, key: &Key) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// all entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &Key) -> StorageResult<Vec<(Key, Vec<u8>)>>;
}

/// Buffered write access.
pub trait KvWriter: KvReader {
    fn put(&mut self, key: Key, value: Vec<u8>) -> StorageResult<()>;

    fn delete(&mut self, key: Key) -> StorageResult<()>;

    /// require `key` to still hold `observed` when the writes are applied
    fn expect(&mut self, key: Key, observed: Option<Vec<u8>>) -> StorageResult<()>;
}

/// A store that hands out snapshots and applies batches atomically.
pub trait Datastore: KvReader {
    fn snapshot(&self) -> Arc<dyn KvReader>;

    fn apply(&self, batch: WriteBatch) -> StorageResult<()>;
}

/// One pending mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(Vec<u8>),
    Delete,
}

/// Writes and compare-and-swap guards applied as one unit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: BTreeMap<Key, WriteOp>,
    guards: BTreeMap<Key, Option<Vec<u8>>>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Key, value: Vec<u8>) {
        self.ops.insert(key, WriteOp::Put(value));
    }

    pub fn delete(&mut self, key: Key) {
        self.ops.insert(key, WriteOp::Delete);
    }

    /// the first observation of a key wins; later reads of our own writes
    /// must not overwrite what the snapshot showed
    pub fn guard(&mut self, key: Key, observed: Option<Vec<u8>>) {
        self.guards.entry(key).or_insert(observed);
    }

    pub fn pending(&self, key: &Key) -> Option<&WriteOp> {
        self.ops.get(key)
    }

    pub fn ops(&self) -> impl Iterator<Item = (&Key, &WriteOp)> {
        self.ops.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Writes buffered over a snapshot.
///
/// Reads see the buffered writes first, then the snapshot. Nothing reaches
/// the store until the batch is applied.
pub struct BufferedWriter {
    base: Arc<dyn KvReader>,
    batch: WriteBatch,
}

impl BufferedWriter {
    pub fn new(base: Arc<dyn KvReader>) -> Self {
        Self {
            base,
            batch: WriteBatch::new(),
        }
    }

    pub fn batch(&self) -> &WriteBatch {
        &self.batch
    }

    pub fn into_batch(self) -> WriteBatch {
        self.batch
    }
}

impl KvReader for BufferedWriter {
    fn get(&self, key: &Key) -> StorageResult<Option<Vec<u8>>> {
        match self.batch.pending(key) {
            Some(WriteOp::Put(value)) => Ok(Some(value.clone())),
            Some(WriteOp::Delete) => Ok(None),
            None => self.base.get(key),
        }
    }

    fn scan_prefix(&self, prefix: &Key) -> StorageResult<Vec<(Key, Vec<u8>)>> {
        let mut merged: BTreeMap<Key, Vec<u8>> = self.base.scan_prefix(prefix)?.into_iter().collect();
        for (key, op) in self.batch.ops.range(prefix.clone()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match op {
                WriteOp::Put(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                WriteOp::Delete => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

impl KvWriter for BufferedWriter {
    fn put(&mut self, key: Key, value: Vec<u8>) -> StorageResult<()> {
        self.batch.put(key, value);
        Ok(())
    }

    fn delete(&mut self, key: Key) -> StorageResult<()> {
        self.batch.delete(key);
        Ok(())
    }

    fn expect(&mut self, key: Key, observed: Option<Vec<u8>>) -> StorageResult<()> {
        // a value we wrote ourselves says nothing about the store
        if self.batch.pending(&key).is_none() {
            self.batch.guard(key, observed);
        }
        Ok(())
    }
}

type Tree = BTreeMap<Key, Vec<u8>>;

/// In-memory datastore with copy-on-write snapshots.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone, Default)]
pub struct MemoryDatastore {
    inner: Arc<RwLock<Arc<Tree>>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl fmt::Debug for MemoryDatastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDatastore")
            .field("entries", &self.len())
            .finish()
    }
}

impl KvReader for MemoryDatastore {
    fn get(&self, key: &Key) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &Key) -> StorageResult<Vec<(Key, Vec<u8>)>> {
        let tree = self.inner.read().clone();
        Ok(scan(&tree, prefix))
    }
}

impl Datastore for MemoryDatastore {
    fn snapshot(&self) -> Arc<dyn KvReader> {
        let tree = self.inner.read().clone();
        Arc::new(MemorySnapshot { tree })
    }

    fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut current = self.inner.write();

        for (key, observed) in &batch.guards {
            if current.get(key) != observed.as_ref() {
                return Err(StorageError::ConcurrentModification {
                    key: key.to_string(),
                });
            }
        }

        if batch.ops.is_empty() {
            return Ok(());
        }

        // readers holding the old Arc keep their view
        let tree = Arc::make_mut(&mut *current);
        for (key, op) in batch.ops {
            match op {
                WriteOp::Put(value) => {
                    tree.insert(key, value);
                }
                WriteOp::Delete => {
                    tree.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Frozen view of a [`MemoryDatastore`].
struct MemorySnapshot {
    tree: Arc<Tree>,
}

impl KvReader for MemorySnapshot {
    fn get(&self, key: &Key) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.tree.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &Key) -> StorageResult<Vec<(Key, Vec<u8>)>> {
        Ok(scan(&self.tree, prefix))
    }
}

fn scan(tree: &Tree, prefix: &Key) -> Vec<(Key, Vec<u8>)> {
    tree.range(prefix.clone()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
