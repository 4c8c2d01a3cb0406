//! Transaction error types.

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors that can occur during transaction operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Another transaction changed a key this one read before writing.
    #[error("transaction {tx_id} conflicts on key {key}")]
    Conflict { tx_id: String, key: String },

    /// Transaction was already committed or aborted.
    #[error("transaction {tx_id} is no longer active")]
    NotActive { tx_id: String },
}

impl TransactionError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransactionError::Conflict { .. } => true,
            TransactionError::Storage(e) => e.is_retriable(),
            _ => false,
        }
    }

    /// Create a conflict error.
    pub fn conflict(tx_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Conflict {
            tx_id: tx_id.into(),
            key: key.into(),
        }
    }
}

/// Errors that tell a transaction runner whether another attempt may succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for TransactionError {
    fn is_retryable(&self) -> bool {
        TransactionError::is_retryable(self)
    }
}

impl Retryable for StorageError {
    fn is_retryable(&self) -> bool {
        self.is_retriable()
    }
}
