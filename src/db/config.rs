//! Database configuration.
//!
//! Loaded from JSON; every section and field is optional:
//!
//! ```json
//! {
//!   "query": { "max_depth": 1000, "default_limit": 100 },
//!   "transaction": { "max_retries": 5 },
//!   "logging": { "level": "docdag=debug", "format": "json" }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::QueryOptions;
use crate::transaction::DEFAULT_MAX_RETRIES;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Database configuration options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub query: QueryConfig,
    pub transaction: TransactionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// Cap on generations walked by queries without a depth.
    pub max_depth: Option<u64>,
    /// Limit applied to queries that do not give one.
    pub default_limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionConfig {
    /// Retries of a transaction that lost a race on a head.
    pub max_retries: u32,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `info` or `docdag::query=trace`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl DatabaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Set the traversal cap for unbounded queries.
    pub fn max_depth(mut self, value: u64) -> Self {
        self.query.max_depth = Some(value);
        self
    }

    /// Set the default query limit.
    pub fn default_limit(mut self, value: usize) -> Self {
        self.query.default_limit = Some(value);
        self
    }

    /// Set max_retries.
    pub fn max_retries(mut self, value: u32) -> Self {
        self.transaction.max_retries = value;
        self
    }

    /// Set the log filter.
    pub fn log_level(mut self, value: impl Into<String>) -> Self {
        self.logging.level = value.into();
        self
    }

    pub fn log_format(mut self, value: LogFormat) -> Self {
        self.logging.format = value;
        self
    }

    pub(crate) fn query_options(&self) -> QueryOptions {
        QueryOptions {
            max_depth: self.query.max_depth,
            default_limit: self.query.default_limit,
        }
    }
}
