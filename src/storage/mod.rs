//! storage layer for the document version graph
//!
//! this module persists commits and head pointers in an ordered key-value
//! store. The upper layers (commit builder, field clocks, query engine) use
//! this API and never build datastore keys themselves.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       CommitStore                           │
//! │   (put batches, get by CID, heads, height/collection index) │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │   commit    │       │    heads    │       │    keys     │
//!  │  (blocks)   │       │   (tips)    │       │  (layout)   │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!         │                     │                     │
//!         ▼                     └──────────┬──────────┘
//!  ┌─────────────┐                         ▼
//!  │    block    │                  ┌─────────────┐
//!  │   (codec)   │                  │  datastore  │
//!  └─────────────┘                  │ (snapshots) │
//!                                   └─────────────┘
//!  ```
//!
//! # Usage
//!
//! ```ignore
//! use docdag::storage::{BufferedWriter, CommitStore, Datastore, MemoryDatastore};
//!
//! let store = MemoryDatastore::new();
//!
//! // stage a batch produced by the commit builder
//! let mut writer = BufferedWriter::new(store.snapshot());
//! CommitStore::put(&mut writer, &batch)?;
//! store.apply(writer.into_batch())?;
//!
//! // read back
//! let commit = CommitStore::get_by_cid(&store, &cid)?;
//! let heads = CommitStore::get_heads(&store, &doc_id)?;
//! ```

mod block;
mod commit;
mod datastore;
mod error;
mod heads;
mod keys;
mod store;
mod types;

// Re-export public API
pub use block::{canonical_key_cmp, encode_fields, DecodeError, EncodingError, MAX_NESTING};
pub use commit::{
    Commit, CommitLink, CompositeDelta, Delta, FieldDelta, SealedCommit, COMPOSITE_CRDT, LWW_CRDT,
};
pub use datastore::{BufferedWriter, Datastore, KvReader, KvWriter, MemoryDatastore, WriteBatch, WriteOp};
pub use error::{StorageError, StorageResult};
pub use heads::{DocumentHeads, HeadUpdate};
pub use keys::Key;
pub use store::{CommitBatch, CommitStore, PutOutcome};
pub use types::{
    Chain, CollectionId, DocumentStatus, FieldId, Head, HeadSet, COMPOSITE_MARKER, HEAD_LINK_NAME,
};

// Re-export for internal use by other modules
pub(crate) use heads::HeadManager;
