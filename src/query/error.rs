//! Query errors.

use thiserror::Error;

use crate::address::AddressError;
use crate::storage::StorageError;

/// Result type for commit queries.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors a commit query can fail with.
///
/// Unknown documents, commits or fields are not errors: they produce an
/// empty result.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid argument {argument}: {reason}")]
    InvalidArgument { argument: String, reason: String },

    #[error("malformed identifier: {0}")]
    Address(#[from] AddressError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("query cancelled")]
    Cancelled,

    #[error("query deadline exceeded")]
    DeadlineExceeded,
}

impl QueryError {
    pub(crate) fn invalid(argument: &str, reason: impl ToString) -> Self {
        QueryError::InvalidArgument {
            argument: argument.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Check if the query stopped because of its context.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, QueryError::Cancelled | QueryError::DeadlineExceeded)
    }
}
