//! Cancellation and deadlines for running queries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::query::error::{QueryError, QueryResult};

/// Carries the deadline and cancellation flag of one query.
///
/// The traversal checks the context before loading every commit.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancelled: Arc::default(),
        }
    }

    /// A handle that cancels this query from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Fail if the query was cancelled or ran past its deadline.
    pub fn check(&self) -> QueryResult<()> {
        if self.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(QueryError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// Cancels the query it was taken from.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel() {
        let ctx = QueryContext::new();
        assert!(ctx.check().is_ok());

        ctx.cancel_handle().cancel();
        assert!(matches!(ctx.check(), Err(QueryError::Cancelled)));
    }

    #[test]
    fn test_deadline() {
        let ctx = QueryContext::with_deadline(Instant::now());
        assert!(matches!(ctx.check(), Err(QueryError::DeadlineExceeded)));

        let ctx = QueryContext::with_timeout(Duration::from_secs(3600));
        assert!(ctx.check().is_ok());
    }
}
