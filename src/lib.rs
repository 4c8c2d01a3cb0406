//! docdag - a per-document Merkle-CRDT commit graph
//!
//! Every mutation of a document becomes a set of content-addressed commits:
//! one per changed field, plus one composite commit linking them. Each field
//! and the document as a whole form independent causal chains, so replicas
//! can exchange blocks and converge without coordination. The commit graph
//! can be queried by document, field, commit and depth.
//!
//! # Example
//!
//! ```no_run
//! use docdag::catalog::{FieldKind, ScalarKind, SchemaBuilder};
//! use docdag::db::Database;
//! use serde_json::json;
//!
//! let db = Database::in_memory();
//! db.create_collection(
//!     SchemaBuilder::new("User")
//!         .field("Name", FieldKind::scalar(ScalarKind::String))
//!         .field("Age", FieldKind::scalar(ScalarKind::Int)),
//! )
//! .unwrap();
//!
//! let doc_id = db.create_document("User", &json!({"Name": "John", "Age": 21})).unwrap();
//! db.update_document("User", &doc_id, &json!({"Age": 22})).unwrap();
//!
//! let history = db.commits_json(&json!({"docID": doc_id.to_string()})).unwrap();
//! ```

pub mod address;
pub mod builder;
pub mod catalog;
pub mod clock;
pub mod db;
pub mod document;
pub mod query;
pub mod storage;
pub mod transaction;
