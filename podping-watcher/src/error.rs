//! Error types for the watcher binary.
//!
//! Mirrors the writer's layered taxonomy (`WatcherError`/`ConfigError`),
//! grounded on the same `ghost-fleet`/`ghostnet-indexer` error-module
//! split `podping-writer/src/error.rs` already follows.

use std::path::PathBuf;

use thiserror::Error;

use podping_core::AppError;

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Top-level error type returned by the watcher's `main` and service loop.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WatcherError {
    /// Configuration loading or validation failed.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A domain/infra/app error from the shared core crate.
    #[error(transparent)]
    Core(#[from] AppError),

    /// Node-pool error surfaced while estimating the history start block
    /// or fetching blocks.
    #[error("node pool error: {0}")]
    Pool(#[from] hive_rpc::PoolError),

    /// A CLI combination the watcher cannot satisfy (e.g. more than one
    /// history-start flag, or a malformed `start_date`).
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// A downstream sink (forward socket) failed to bind or connect.
    #[error("sink error: {0}")]
    Sink(String),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Failed to read the settings file.
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        /// Path to the file.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The `config` crate failed to build or deserialize settings.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Settings failed validation; carries every violation found.
    #[error("configuration validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_joins_messages() {
        let err = ConfigError::Validation(vec!["a is required".into(), "b must be > 0".into()]);
        let msg = err.to_string();
        assert!(msg.contains("a is required"));
        assert!(msg.contains("b must be > 0"));
    }

    #[test]
    fn watcher_error_wraps_config_error() {
        let err: WatcherError = ConfigError::Validation(vec!["x".into()]).into();
        assert!(matches!(err, WatcherError::Config(_)));
    }
}
