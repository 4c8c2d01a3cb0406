//! Commit builder.
//!
//! Turns a create, update or delete of a document into the new commits of
//! its field chains and composite chain, plus the head moves that publish
//! them. All CIDs are computed here, before anything is written: a value
//! that cannot be encoded fails the whole mutation.
//!
//! ```text
//!   Document (dirty fields)
//!          │
//!          ▼
//!   ┌──────────────┐  advance   ┌──────────────┐
//!   │ CommitBuilder│───────────▶│  FieldClock  │ (one per dirty field)
//!   └──────────────┘            └──────────────┘
//!          │ advance_with_links
//!          ▼
//!   ┌──────────────┐
//!   │  composite   │──▶ CommitBatch ──▶ CommitStore::put
//!   └──────────────┘
//! ```

mod commit_builder;
mod error;

pub use commit_builder::{CommitBuilder, Mutation};
pub use error::{BuildError, BuildResult};
