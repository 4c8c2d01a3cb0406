//! The commit store.
//!
//! Blocks are keyed by CID and never rewritten. A put writes the new blocks,
//! their secondary index entries and the head moves through one writer, so
//! they become durable together when the surrounding transaction commits.

use tracing::{debug, trace};

use crate::address::{Cid, DocId};
use crate::storage::commit::{Commit, SealedCommit};
use crate::storage::datastore::{KvReader, KvWriter};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::heads::{DocumentHeads, HeadManager, HeadUpdate};
use crate::storage::keys::Key;
use crate::storage::types::CollectionId;

/// New commits plus the head moves they cause, persisted as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitBatch {
    pub commits: Vec<SealedCommit>,
    pub heads: Vec<HeadUpdate>,
}

impl CommitBatch {
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty() && self.heads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    /// the composite commit of the batch, if any
    pub fn composite(&self) -> Option<&Commit> {
        self.commits
            .iter()
            .map(|sealed| &sealed.commit)
            .find(|commit| commit.is_composite())
    }

    pub fn field_commits(&self) -> impl Iterator<Item = &Commit> {
        self.commits
            .iter()
            .map(|sealed| &sealed.commit)
            .filter(|commit| !commit.is_composite())
    }
}

/// Outcome of a put.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOutcome {
    /// blocks newly written
    pub written: usize,
    /// blocks that were already present
    pub deduplicated: usize,
}

/// Reads and writes commits.
pub struct CommitStore;

impl CommitStore {
    /// Write all commit blocks and head moves of a batch.
    ///
    /// Writing a block that already exists is a no-op for that block.
    pub fn put(writer: &mut dyn KvWriter, batch: &CommitBatch) -> StorageResult<PutOutcome> {
        let mut outcome = PutOutcome::default();

        for sealed in &batch.commits {
            if Self::write_block(writer, &sealed.commit, &sealed.block)? {
                outcome.written += 1;
            } else {
                outcome.deduplicated += 1;
            }
        }

        for update in &batch.heads {
            HeadManager::update_if_unchanged(writer, update)?;
            trace!(
                doc_id = %update.doc_id,
                chain = %update.chain,
                cid = %update.next.head().cid,
                height = update.next.height(),
                tips = update.next.len(),
                "head moved"
            );
        }

        debug!(
            written = outcome.written,
            deduplicated = outcome.deduplicated,
            heads = batch.heads.len(),
            "commit batch stored"
        );
        Ok(outcome)
    }

    /// Store a block received from elsewhere after checking its CID.
    ///
    /// Returns the decoded commit and whether the block was new.
    pub fn put_block(writer: &mut dyn KvWriter, cid: Cid, bytes: &[u8]) -> StorageResult<(Commit, bool)> {
        let commit = Commit::open(cid, bytes).map_err(|e| StorageError::CorruptedBlock {
            cid,
            reason: e.to_string(),
        })?;
        let written = Self::write_block(writer, &commit, bytes)?;
        Ok((commit, written))
    }

    fn write_block(writer: &mut dyn KvWriter, commit: &Commit, bytes: &[u8]) -> StorageResult<bool> {
        let cid = commit.cid();
        if !cid.verifies(bytes) {
            return Err(StorageError::CidMismatch { cid: *cid });
        }

        let key = Key::block(cid);
        if writer.has(&key)? {
            return Ok(false);
        }

        writer.put(key, bytes.to_vec())?;
        writer.put(Key::height_index(commit.doc_id(), commit.height(), cid), Vec::new())?;
        writer.put(
            Key::collection_index(commit.collection_id(), commit.doc_id(), cid),
            Vec::new(),
        )?;
        Ok(true)
    }

    /// Look up a commit. A missing CID is `None`, not an error.
    pub fn get_by_cid(reader: &dyn KvReader, cid: &Cid) -> StorageResult<Option<Commit>> {
        let Some(bytes) = reader.get(&Key::block(cid))? else {
            return Ok(None);
        };
        let commit = Commit::open(*cid, &bytes).map_err(|e| StorageError::CorruptedBlock {
            cid: *cid,
            reason: e.to_string(),
        })?;
        Ok(Some(commit))
    }

    /// The raw canonical bytes of a block.
    pub fn get_block(reader: &dyn KvReader, cid: &Cid) -> StorageResult<Option<Vec<u8>>> {
        reader.get(&Key::block(cid))
    }

    pub fn contains(reader: &dyn KvReader, cid: &Cid) -> StorageResult<bool> {
        reader.has(&Key::block(cid))
    }

    pub fn get_heads(reader: &dyn KvReader, doc_id: &DocId) -> StorageResult<DocumentHeads> {
        HeadManager::for_document(reader, doc_id)
    }

    /// Every commit of a document at a given height, ordered by CID.
    pub fn by_height(reader: &dyn KvReader, doc_id: &DocId, height: u64) -> StorageResult<Vec<Commit>> {
        Self::resolve_index(reader, &Key::height_index_prefix(doc_id, height))
    }

    /// Every commit of a collection, ordered by DocID then CID.
    pub fn by_collection(reader: &dyn KvReader, collection: CollectionId) -> StorageResult<Vec<Commit>> {
        Self::resolve_index(reader, &Key::collection_index_prefix(collection))
    }

    fn resolve_index(reader: &dyn KvReader, prefix: &Key) -> StorageResult<Vec<Commit>> {
        let mut commits = Vec::new();
        for (key, _) in reader.scan_prefix(prefix)? {
            let cid = key.trailing_cid()?;
            if let Some(commit) = Self::get_by_cid(reader, &cid)? {
                commits.push(commit);
            }
        }
        Ok(commits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::NormalValue;
    use crate::storage::commit::{CommitLink, CompositeDelta, Delta, FieldDelta};
    use crate::storage::datastore::{BufferedWriter, Datastore, MemoryDatastore};
    use crate::storage::types::{Chain, DocumentStatus, FieldId, Head, HeadSet};

    fn store_batch(store: &MemoryDatastore, batch: &CommitBatch) -> StorageResult<PutOutcome> {
        let mut writer = BufferedWriter::new(store.snapshot());
        let outcome = CommitStore::put(&mut writer, batch)?;
        store.apply(writer.into_batch())?;
        Ok(outcome)
    }

    fn setup_batch(doc: &DocId) -> CommitBatch {
        let field = Commit::seal(
            Delta::Field(FieldDelta {
                doc_id: doc.clone(),
                collection_id: CollectionId::new(1),
                schema_version_id: Cid::for_raw(b"schema"),
                field_id: FieldId::new(1),
                field_name: "age".to_string(),
                priority: 1,
                data: NormalValue::Int(21),
            }),
            vec![],
            vec![],
        )
        .unwrap();
        let composite = Commit::seal(
            Delta::Composite(CompositeDelta {
                doc_id: doc.clone(),
                collection_id: CollectionId::new(1),
                schema_version_id: Cid::for_raw(b"schema"),
                priority: 1,
                status: DocumentStatus::Active,
            }),
            vec![],
            vec![CommitLink::new("age", *field.commit.cid())],
        )
        .unwrap();

        let heads = vec![
            HeadUpdate {
                doc_id: doc.clone(),
                chain: Chain::Field(FieldId::new(1)),
                previous: None,
                next: HeadSet::single(Head::new(*field.commit.cid(), 1)),
            },
            HeadUpdate {
                doc_id: doc.clone(),
                chain: Chain::Composite,
                previous: None,
                next: HeadSet::single(Head::new(*composite.commit.cid(), 1)),
            },
        ];
        CommitBatch {
            commits: vec![field, composite],
            heads,
        }
    }

    #[test]
    fn test_put_and_get() {
        let store = MemoryDatastore::new();
        let doc = DocId::new(Cid::for_raw(b"doc"));
        let batch = setup_batch(&doc);

        let outcome = store_batch(&store, &batch).unwrap();
        assert_eq!(outcome.written, 2);

        let composite = batch.composite().unwrap();
        let loaded = CommitStore::get_by_cid(&store, composite.cid()).unwrap().unwrap();
        assert_eq!(&loaded, composite);

        let heads = CommitStore::get_heads(&store, &doc).unwrap();
        assert_eq!(heads.composite.unwrap().head().cid, *composite.cid());
        assert_eq!(heads.fields.len(), 1);
    }

    #[test]
    fn test_missing_cid_is_none() {
        let store = MemoryDatastore::new();
        assert!(CommitStore::get_by_cid(&store, &Cid::for_block(b"nope"))
            .unwrap()
            .is_none());
        assert!(CommitStore::get_block(&store, &Cid::for_block(b"nope"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_blocks_are_idempotent() {
        let store = MemoryDatastore::new();
        let doc = DocId::new(Cid::for_raw(b"doc"));
        let batch = setup_batch(&doc);
        store_batch(&store, &batch).unwrap();

        let blocks_only = CommitBatch {
            commits: batch.commits.clone(),
            heads: vec![],
        };
        let outcome = store_batch(&store, &blocks_only).unwrap();
        assert_eq!(outcome.written, 0);
        assert_eq!(outcome.deduplicated, 2);
    }

    #[test]
    fn test_failed_head_update_leaves_no_blocks() {
        let store = MemoryDatastore::new();
        let doc = DocId::new(Cid::for_raw(b"doc"));
        let mut batch = setup_batch(&doc);
        // claims a previous head that does not exist
        batch.heads[1].previous = Some(HeadSet::single(Head::new(Cid::for_block(b"ghost"), 1)));

        assert!(store_batch(&store, &batch).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_secondary_indexes() {
        let store = MemoryDatastore::new();
        let doc = DocId::new(Cid::for_raw(b"doc"));
        store_batch(&store, &setup_batch(&doc)).unwrap();

        assert_eq!(CommitStore::by_height(&store, &doc, 1).unwrap().len(), 2);
        assert!(CommitStore::by_height(&store, &doc, 2).unwrap().is_empty());
        assert_eq!(
            CommitStore::by_collection(&store, CollectionId::new(1)).unwrap().len(),
            2
        );
        assert!(CommitStore::by_collection(&store, CollectionId::new(9))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_put_block_checks_cid() {
        let store = MemoryDatastore::new();
        let doc = DocId::new(Cid::for_raw(b"doc"));
        let batch = setup_batch(&doc);
        let sealed = &batch.commits[0];

        let mut writer = BufferedWriter::new(store.snapshot());
        let err = CommitStore::put_block(&mut writer, Cid::for_block(b"other"), &sealed.block)
            .unwrap_err();
        assert!(err.is_corruption());

        let (commit, written) =
            CommitStore::put_block(&mut writer, *sealed.commit.cid(), &sealed.block).unwrap();
        assert!(written);
        assert_eq!(&commit, &sealed.commit);
    }
}
