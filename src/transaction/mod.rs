//! Transaction management over the datastore.
//!
//! Each transaction reads from the snapshot taken when it began and buffers
//! its writes. On commit the buffer is applied as one atomic batch; on
//! rollback it is dropped.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TransactionManager                        │
//! │  (Coordinates transactions, tracks active tx, retries)      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                ┌─────────────┴─────────────┐
//!                │                           │
//!                ▼                           ▼
//!         ┌─────────────┐             ┌─────────────┐
//!         │ Transaction │             │  Datastore  │
//!         │  (Context)  │────────────▶│ (snapshots, │
//!         │             │   commit    │   batches)  │
//!         └─────────────┘             └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use docdag::transaction::TransactionManager;
//!
//! let manager = TransactionManager::new(store);
//!
//! let mut tx = manager.begin();
//! CommitStore::put(&mut tx, &batch)?;
//! manager.commit_transaction(tx)?;  // or manager.rollback_transaction(tx);
//! ```

mod context;
mod error;
mod manager;

pub use context::{Transaction, TransactionMetadata, TxAborted, TxActive, TxCommitted};
pub use error::{Retryable, TransactionError, TransactionResult};
pub use manager::{TransactionManager, DEFAULT_MAX_RETRIES};
