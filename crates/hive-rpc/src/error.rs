//! Error types for the Hive RPC client.
//!
//! This module provides the error hierarchy for node-pool operations:
//!
//! - [`RpcError`] - the primary error type for all client operations
//! - [`PoolError`] - wraps [`RpcError`] with pool-exhaustion semantics
//!
//! # Error Philosophy
//!
//! Errors are designed to be actionable (each variant says what went wrong),
//! convertible (easy to fold into an application's own error types), and
//! classifiable (`is_retryable` drives the pool's retry/backoff policy).

use thiserror::Error;

/// Result type alias using [`RpcError`].
pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors that can occur when talking to a single Hive RPC endpoint.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RpcError {
    /// Failed to establish a connection to the endpoint.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Request timed out waiting for a response.
    #[error("request timed out")]
    Timeout,

    /// Transport-level HTTP error (TLS issue, malformed request, etc) that
    /// did not make it to an HTTP status line.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Endpoint responded with a non-2xx HTTP status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// JSON-RPC error returned by the node.
    #[error("RPC error ({code}): {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Human-readable error message from the node.
        message: String,
    },

    /// Failed to serialize a request or deserialize a response.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response was valid JSON but had unexpected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid configuration supplied to the pool.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RpcError {
    /// Build an RPC error from a JSON-RPC error code and message.
    #[must_use]
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Whether this error is likely transient and worth retrying against the
    /// same or a different endpoint.
    ///
    /// Matches spec's `Retryable` classification (§4.1): network, timeout,
    /// malformed response, explicit RPC exception.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout | Self::InvalidResponse(_) => true,
            Self::Http(msg) => {
                msg.contains("500")
                    || msg.contains("502")
                    || msg.contains("503")
                    || msg.contains("504")
            }
            Self::Status(code) => (500..600).contains(code),
            Self::Rpc { .. } => true,
            Self::Serialization(_) | Self::InvalidConfig(_) => false,
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.is_request() || err.is_body() || err.is_decode() {
            Self::Http(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}

/// Errors surfaced by the pool as a whole, after endpoint-level retries are
/// exhausted.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Every endpoint in the pool has an open circuit breaker.
    #[error("node pool exhausted: all {endpoint_count} endpoints have open circuit breakers")]
    PoolExhausted {
        /// Number of configured endpoints.
        endpoint_count: usize,
    },

    /// The last attempted endpoint failed with a non-retryable error.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}
