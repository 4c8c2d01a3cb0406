//! Storage layer error types
//!
//! All errors that can occur during storage operations are defined here.
//! We use `thiserror` for ergonomic error definition and better error messages

use thiserror::Error;

use crate::address::{AddressError, Cid};

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// a guarded key changed between the snapshot read and the atomic write
    #[error("concurrent modification of key {key}")]
    ConcurrentModification { key: String },

    /// a key does not follow the store's key layout
    #[error("invalid key {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// JSON serialization or deserialization of a record failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// a stored block could not be decoded
    #[error("corrupted block {cid}: {reason}")]
    CorruptedBlock { cid: Cid, reason: String },

    /// the bytes handed to the store do not hash to the claimed CID
    #[error("block bytes do not match cid {cid}")]
    CidMismatch { cid: Cid },

    /// an identifier stored in a key or record failed to parse
    #[error("invalid stored identifier: {0}")]
    Address(#[from] AddressError),

    /// the backing store failed
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// check if this error is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::ConcurrentModification { .. })
    }

    /// check if this error is recoverable by retrying the whole transaction
    pub fn is_retriable(&self) -> bool {
        matches!(self, StorageError::ConcurrentModification { .. })
    }

    /// check if this error indicates damaged data rather than a transient failure
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StorageError::CorruptedBlock { .. }
                | StorageError::CidMismatch { .. }
                | StorageError::Address(_)
        )
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let conflict = StorageError::ConcurrentModification {
            key: "/heads/bae-x/C".to_string(),
        };
        assert!(conflict.is_conflict());
        assert!(conflict.is_retriable());
        assert!(!conflict.is_corruption());

        let corrupt = StorageError::CidMismatch {
            cid: Cid::for_block(b"x"),
        };
        assert!(!corrupt.is_retriable());
        assert!(corrupt.is_corruption());
    }
}
