//! Commits of the per-document version graph.
//!
//! A commit is an immutable block: a delta plus the links to the commits it
//! builds on. Field commits carry one field's new value and link only to the
//! previous head of that field. Composite commits link the field commits of
//! one mutation and, after the first mutation, the previous composite head.
//!
//! The height of a commit is stored in its delta as `priority`, so a commit
//! decoded from a block knows its position in the chain without a lookup.

use crate::address::{Cid, DocId};
use crate::document::NormalValue;
use crate::storage::block::{self, DecodeError, EncodingError};
use crate::storage::types::{Chain, CollectionId, DocumentStatus, FieldId, HEAD_LINK_NAME};

/// discriminator of field deltas (last-writer-wins register)
pub const LWW_CRDT: &str = "lww";

/// discriminator of composite deltas
pub const COMPOSITE_CRDT: &str = "composite";

/// One field's new value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDelta {
    pub doc_id: DocId,
    pub collection_id: CollectionId,
    pub schema_version_id: Cid,
    pub field_id: FieldId,
    pub field_name: String,
    pub priority: u64,
    pub data: NormalValue,
}

/// Whole-document version marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeDelta {
    pub doc_id: DocId,
    pub collection_id: CollectionId,
    pub schema_version_id: Cid,
    pub priority: u64,
    pub status: DocumentStatus,
}

/// The payload of a commit.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    Field(FieldDelta),
    Composite(CompositeDelta),
}

impl Delta {
    pub fn doc_id(&self) -> &DocId {
        match self {
            Delta::Field(d) => &d.doc_id,
            Delta::Composite(d) => &d.doc_id,
        }
    }

    pub fn collection_id(&self) -> CollectionId {
        match self {
            Delta::Field(d) => d.collection_id,
            Delta::Composite(d) => d.collection_id,
        }
    }

    pub fn schema_version_id(&self) -> &Cid {
        match self {
            Delta::Field(d) => &d.schema_version_id,
            Delta::Composite(d) => &d.schema_version_id,
        }
    }

    pub fn priority(&self) -> u64 {
        match self {
            Delta::Field(d) => d.priority,
            Delta::Composite(d) => d.priority,
        }
    }

    pub(crate) fn set_priority(&mut self, priority: u64) {
        match self {
            Delta::Field(d) => d.priority = priority,
            Delta::Composite(d) => d.priority = priority,
        }
    }

    pub fn chain(&self) -> Chain {
        match self {
            Delta::Field(d) => Chain::Field(d.field_id),
            Delta::Composite(_) => Chain::Composite,
        }
    }

    pub fn crdt(&self) -> &'static str {
        match self {
            Delta::Field(_) => LWW_CRDT,
            Delta::Composite(_) => COMPOSITE_CRDT,
        }
    }
}

/// A named link to another commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitLink {
    pub name: String,
    pub cid: Cid,
}

impl CommitLink {
    pub fn new(name: impl Into<String>, cid: Cid) -> Self {
        Self {
            name: name.into(),
            cid,
        }
    }

    pub fn head(cid: Cid) -> Self {
        Self::new(HEAD_LINK_NAME, cid)
    }

    pub fn is_head(&self) -> bool {
        self.name == HEAD_LINK_NAME
    }
}

/// A decoded commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    cid: Cid,
    delta: Delta,
    heads: Vec<Cid>,
    links: Vec<CommitLink>,
}

/// A commit together with its canonical block bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct SealedCommit {
    pub commit: Commit,
    pub block: Vec<u8>,
}

impl Commit {
    /// encode a new commit and derive its CID
    ///
    /// `heads` are the previous tips of the same chain; `links` name the
    /// commits this one aggregates. Both are sorted before encoding.
    pub fn seal(
        delta: Delta,
        mut heads: Vec<Cid>,
        mut links: Vec<CommitLink>,
    ) -> Result<SealedCommit, EncodingError> {
        heads.sort();
        heads.dedup();
        links.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.cid.cmp(&b.cid)));

        let bytes = block::encode_block(&delta, &heads, &links)?;
        let cid = Cid::for_block(&bytes);
        Ok(SealedCommit {
            commit: Commit {
                cid,
                delta,
                heads,
                links,
            },
            block: bytes,
        })
    }

    /// decode a stored block
    pub fn open(cid: Cid, bytes: &[u8]) -> Result<Self, DecodeError> {
        let decoded = block::decode_block(bytes)?;
        Ok(Commit {
            cid,
            delta: decoded.delta,
            heads: decoded.heads,
            links: decoded.links,
        })
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn height(&self) -> u64 {
        self.delta.priority()
    }

    pub fn delta(&self) -> &Delta {
        &self.delta
    }

    pub fn doc_id(&self) -> &DocId {
        self.delta.doc_id()
    }

    pub fn collection_id(&self) -> CollectionId {
        self.delta.collection_id()
    }

    pub fn schema_version_id(&self) -> &Cid {
        self.delta.schema_version_id()
    }

    pub fn chain(&self) -> Chain {
        self.delta.chain()
    }

    pub fn is_composite(&self) -> bool {
        self.chain().is_composite()
    }

    pub fn field_id(&self) -> Option<FieldId> {
        self.chain().field_id()
    }

    pub fn field_name(&self) -> Option<&str> {
        match &self.delta {
            Delta::Field(d) => Some(&d.field_name),
            Delta::Composite(_) => None,
        }
    }

    /// the field value carried by a field commit
    pub fn value(&self) -> Option<&NormalValue> {
        match &self.delta {
            Delta::Field(d) => Some(&d.data),
            Delta::Composite(_) => None,
        }
    }

    /// field commits are always active; composites carry the document status
    pub fn status(&self) -> DocumentStatus {
        match &self.delta {
            Delta::Field(_) => DocumentStatus::Active,
            Delta::Composite(d) => d.status,
        }
    }

    /// predecessors in the same chain
    pub fn heads(&self) -> &[Cid] {
        &self.heads
    }

    /// named links, sorted by name
    pub fn named_links(&self) -> &[CommitLink] {
        &self.links
    }

    /// every link: `_head` predecessors first, then the named links
    pub fn links(&self) -> Vec<CommitLink> {
        self.heads
            .iter()
            .map(|cid| CommitLink::head(*cid))
            .chain(self.links.iter().cloned())
            .collect()
    }
}
