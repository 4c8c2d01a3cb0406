//! Commit builder error types.

use thiserror::Error;

use crate::address::DocId;
use crate::clock::ClockError;
use crate::storage::{EncodingError, StorageError};

/// Result type for building commits.
pub type BuildResult<T> = Result<T, BuildError>;

/// Errors raised while turning a mutation into commits.
///
/// Nothing is written when building fails.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("document {doc_id} already exists")]
    DocumentExists { doc_id: DocId },

    #[error("document {doc_id} not found")]
    DocumentNotFound { doc_id: DocId },

    #[error("document {doc_id} is deleted")]
    DocumentDeleted { doc_id: DocId },

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("clock error: {0}")]
    Clock(ClockError),
}

impl BuildError {
    pub fn is_retryable(&self) -> bool {
        match self {
            BuildError::Storage(e) => e.is_retriable(),
            BuildError::Clock(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<ClockError> for BuildError {
    fn from(e: ClockError) -> Self {
        match e {
            ClockError::Storage(e) => BuildError::Storage(e),
            ClockError::Encoding(e) => BuildError::Encoding(e),
            other => BuildError::Clock(other),
        }
    }
}
