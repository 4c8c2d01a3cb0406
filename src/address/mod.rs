//! Content addressing.
//!
//! Pure functions only: deriving CIDs from canonical bytes and DocIDs from
//! source CIDs. Nothing in here touches storage.

mod content_id;
mod doc_id;
mod error;

pub use content_id::{Cid, DAG_CBOR, RAW, SHA2_256};
pub use doc_id::{DocId, DOC_ID_NAMESPACE, DOC_ID_V1};
pub use error::{AddressError, AddressResult};
