//! Error types for the writer binary.
//!
//! Mirrors `podping-core`'s layered taxonomy with the boot-time and
//! config-loading variants specific to this binary, the same split
//! `ghost-fleet` draws between `FleetServiceError` and `ConfigError`.

use std::path::PathBuf;

use thiserror::Error;

use podping_core::AppError;

/// Result type for writer operations.
pub type Result<T> = std::result::Result<T, WriterError>;

/// Top-level error type returned by the writer's `main` and service loop.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriterError {
    /// Configuration loading or validation failed.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A domain/infra/app error from the shared core crate.
    #[error(transparent)]
    Core(#[from] AppError),

    /// A required environment variable was missing at boot.
    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    /// The signer account does not exist or is not authorized.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// The publisher exhausted its retry ladder.
    #[error("publish retry ladder exhausted after {attempts} consecutive failures")]
    RetryLadderExhausted {
        /// Number of consecutive failures observed.
        attempts: usize,
    },

    /// An ingest transport (socket bind/accept) failed.
    #[error("ingest transport error: {0}")]
    Ingest(String),
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
    fn writer_error_wraps_config_error() {
        let err: WriterError = ConfigError::Validation(vec!["x".into()]).into();
        assert!(matches!(err, WriterError::Config(_)));
    }
}
