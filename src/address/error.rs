//! Content addressing error types.

use thiserror::Error;

/// Errors raised while parsing or deriving content identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// the DocID string has no `<version>-<uuid>` shape
    #[error("malformed docID: {value}")]
    MalformedDocId { value: String },

    /// the DocID version prefix decoded to a version we do not know
    #[error("invalid docID version {version} in {value}")]
    InvalidDocIdVersion { version: u64, value: String },

    /// the CID string or bytes could not be decoded
    #[error("invalid cid {value}: {reason}")]
    InvalidCid { value: String, reason: String },
}

impl AddressError {
    pub(crate) fn malformed(value: &str) -> Self {
        Self::MalformedDocId {
            value: value.to_string(),
        }
    }

    pub(crate) fn invalid_cid(value: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidCid {
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

/// result type alias for addressing operations
pub type AddressResult<T> = Result<T, AddressError>;
