//! Document error types.

use thiserror::Error;

use crate::storage::EncodingError;

/// Result type for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Errors raised while building or changing a document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unknown field {field} in collection {collection}")]
    UnknownField { collection: String, field: String },

    #[error("field {field} expects {expected}, got {actual}")]
    KindMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("field {field}: element {index} expects {expected}, got {actual}")]
    ArrayElement {
        field: String,
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("field {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("field {field} must hold a document ID, got {value}")]
    InvalidRelation { field: String, value: String },

    #[error("document input must be a JSON object, got {actual}")]
    NotAnObject { actual: String },

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
}
