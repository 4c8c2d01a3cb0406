//! Logging bootstrap.
//!
//! The library only emits `tracing` events. Applications that want them on
//! stderr call [`init_logging`] once at startup.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use super::config::{LogFormat, LoggingConfig};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },
}

/// Install a global fmt subscriber for the configured level and format.
///
/// `RUST_LOG`, when set, takes precedence over the configured level. If a
/// global subscriber is already installed it is left in place and `false`
/// is returned.
pub fn init_logging(config: &LoggingConfig) -> Result<bool, LoggingError> {
    let filter = build_filter(config)?;

    let installed = match config.format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
            .is_ok(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true)
            .try_init()
            .is_ok(),
    };
    Ok(installed)
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidFilter {
        filter: config.level.clone(),
        reason: e.to_string(),
    })
}
