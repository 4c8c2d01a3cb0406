//! Commit graph queries.
//!
//! Serves the `commits` query: the history of documents, filtered by
//! commit, document and field, bounded by depth, then ordered, grouped and
//! paged. Queries read from a snapshot and never write.
//!
//! # Usage
//!
//! ```ignore
//! use docdag::query::{CommitQuery, QueryContext, QueryEngine};
//!
//! let query = CommitQuery::from_json(&json!({"docID": doc_id, "depth": 1}))?;
//! let output = QueryEngine::new(&snapshot).execute(&query, &QueryContext::new())?;
//! println!("{}", output.to_json());
//! ```

mod context;
mod dagscan;
mod engine;
mod error;
mod operators;
mod request;
mod result;

pub use context::{CancelHandle, QueryContext};
pub use engine::{QueryEngine, QueryOptions};
pub use error::{QueryError, QueryResult};
pub use request::{CommitQuery, Direction, FieldSelector, GroupField, OrderBy, OrderField};
pub use result::{CommitGroup, CommitRecord, QueryOutput};
