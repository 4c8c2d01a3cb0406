//! Head pointer management.
//!
//! Every chain of a document has one head entry in the store:
//! - `/heads/<docID>/<fieldID>` for each field chain
//! - `/heads/<docID>/C` for the composite chain
//!
//! The entry holds all tips of the chain (see [`HeadSet`]).
//!
//! Heads are only moved with compare-and-swap semantics: an update names the
//! head it expects to replace, and the write fails if another writer moved
//! the head in between.

use crate::address::DocId;
use crate::storage::datastore::{KvReader, KvWriter};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::keys::Key;
use crate::storage::types::{Chain, HeadSet};

/// A pending move of one chain head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadUpdate {
    pub doc_id: DocId,
    pub chain: Chain,
    /// the tips observed when the update was built
    pub previous: Option<HeadSet>,
    pub next: HeadSet,
}

/// The heads of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentHeads {
    pub composite: Option<HeadSet>,
    /// field heads in field ID order
    pub fields: Vec<(Chain, HeadSet)>,
}

impl DocumentHeads {
    pub fn is_empty(&self) -> bool {
        self.composite.is_none() && self.fields.is_empty()
    }

    pub fn field(&self, chain: Chain) -> Option<&HeadSet> {
        self.fields
            .iter()
            .find(|(c, _)| *c == chain)
            .map(|(_, head)| head)
    }
}

/// Manages head entries.
pub struct HeadManager;

impl HeadManager {
    /// Get the current tips of a chain.
    pub fn get(reader: &dyn KvReader, doc_id: &DocId, chain: Chain) -> StorageResult<Option<HeadSet>> {
        reader
            .get(&Key::head(doc_id, chain))?
            .map(|bytes| decode_head(&bytes))
            .transpose()
    }

    /// Get every head of a document.
    pub fn for_document(reader: &dyn KvReader, doc_id: &DocId) -> StorageResult<DocumentHeads> {
        let mut heads = DocumentHeads::default();
        for (key, bytes) in reader.scan_prefix(&Key::doc_heads_prefix(doc_id))? {
            let (_, chain) = key.parse_head()?;
            let head = decode_head(&bytes)?;
            match chain {
                Chain::Composite => heads.composite = Some(head),
                Chain::Field(_) => heads.fields.push((chain, head)),
            }
        }
        Ok(heads)
    }

    /// List every head in the store, in key order.
    ///
    /// Per document the field chains come first (by ID), the composite last.
    pub fn list(reader: &dyn KvReader) -> StorageResult<Vec<(DocId, Chain, HeadSet)>> {
        reader
            .scan_prefix(&Key::all_heads_prefix())?
            .into_iter()
            .map(|(key, bytes)| {
                let (doc_id, chain) = key.parse_head()?;
                Ok((doc_id, chain, decode_head(&bytes)?))
            })
            .collect()
    }

    /// Apply a head update if the head still matches what the update expects.
    pub fn update_if_unchanged(writer: &mut dyn KvWriter, update: &HeadUpdate) -> StorageResult<()> {
        let key = Key::head(&update.doc_id, update.chain);
        let observed = writer.get(&key)?;
        let current = observed.as_deref().map(decode_head).transpose()?;

        if current != update.previous {
            return Err(StorageError::ConcurrentModification {
                key: key.to_string(),
            });
        }

        writer.expect(key.clone(), observed)?;
        writer.put(key, encode_head(&update.next)?)
    }
}

fn encode_head(heads: &HeadSet) -> StorageResult<Vec<u8>> {
    Ok(serde_json::to_vec(heads)?)
}

fn decode_head(bytes: &[u8]) -> StorageResult<HeadSet> {
    Ok(serde_json::from_slice(bytes)?)
}
