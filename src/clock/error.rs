//! Field clock error types.

use thiserror::Error;

use crate::address::DocId;
use crate::storage::{Chain, EncodingError, StorageError};

/// Result type for clock operations.
pub type ClockResult<T> = Result<T, ClockError>;

/// Errors raised while advancing or merging a chain.
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// the delta cannot be canonically encoded
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// a delta or commit of another chain was handed to this clock
    #[error("clock for chain {expected} got a commit of chain {actual}")]
    ChainMismatch { expected: Chain, actual: Chain },

    #[error("clock for document {expected} got a commit of document {actual}")]
    DocumentMismatch { expected: DocId, actual: DocId },
}

impl ClockError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClockError::Storage(e) if e.is_retriable())
    }
}
