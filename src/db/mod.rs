//! High-level database API.
//!
//! [`Database`] ties the layers together: collections in the catalog,
//! document mutations through the commit builder, commit queries, and the
//! exchange of blocks with other replicas. Every mutation runs in its own
//! transaction and is retried when it loses a race on a head.

mod api;
mod config;
mod logging;

pub use api::{Database, DatabaseError, DatabaseResult, MergeOutcome};
pub use config::{ConfigError, DatabaseConfig, LogFormat, LoggingConfig, QueryConfig, TransactionConfig};
pub use logging::{init_logging, LoggingError};
