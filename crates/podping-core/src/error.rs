//! Layered error types shared by the writer and watcher binaries.
//!
//! - [`DomainError`] - business-rule violations (bad batch, bad envelope)
//! - [`InfraError`] - external-system failures (RPC, decode, sink)
//! - [`AppError`] - application-level errors combining both, plus the
//!   boot-time fatal conditions both binaries share
//!
//! # Error philosophy
//!
//! Domain errors are programmer errors or malformed input and should never
//! occur in a correctly operating system. Infrastructure errors are
//! expected and are classified by [`InfraError::is_retryable`] to drive
//! retry policy. `AppError` is what binaries actually propagate with `?`.

use thiserror::Error;

/// Domain-level errors: a value failed an invariant before it should have
/// been possible to construct it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DomainError {
    /// A batch exceeded its URL count budget.
    #[error("batch holds {actual} URLs, exceeding the limit of {limit}")]
    BatchTooManyUrls {
        /// Number of URLs actually present.
        actual: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A batch's serialized URL list exceeded its byte budget.
    #[error("batch URL list is {actual} bytes, exceeding the limit of {limit}")]
    BatchTooManyBytes {
        /// Actual serialized byte size.
        actual: usize,
        /// Configured limit.
        limit: usize,
    },

    /// An envelope's JSON payload exceeded the chain's hard byte ceiling.
    #[error("envelope payload is {actual} bytes, exceeding the chain limit of {limit}")]
    EnvelopeTooLarge {
        /// Actual serialized byte size.
        actual: usize,
        /// Hard ceiling.
        limit: usize,
    },

    /// A URL failed basic validity checks on ingest (empty after trimming).
    #[error("empty URL rejected on ingest")]
    EmptyUrl,
}

/// Infrastructure-level errors from external systems (the chain, sinks,
/// sockets).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InfraError {
    /// Error talking to the Hive node pool.
    #[error("node pool error: {0}")]
    Pool(#[from] hive_rpc::PoolError),

    /// The signer account does not exist on-chain.
    #[error("signer account does not exist: {0}")]
    AccountDoesNotExist(String),

    /// The signer account is not present in the configured allow-list.
    #[error("signer account not authorized: {0}")]
    NotAuthorized(String),

    /// The chain rejected a broadcast for a reason the node pool couldn't
    /// classify as transient (e.g. resource-credit exhaustion).
    #[error("unhandled RPC error from chain: {0}")]
    UnhandledRpc(String),

    /// A posting key was required but none was configured.
    #[error("missing posting key")]
    MissingKey,

    /// Failed to decode an observed operation's JSON payload.
    #[error("failed to decode operation JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// A downstream sink (socket, forward target) rejected or dropped a
    /// write.
    #[error("sink error: {0}")]
    Sink(String),
}

impl InfraError {
    /// Whether this error should be retried by the caller (publisher
    /// retry ladder, watcher inline retry), matching spec §7's taxonomy.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Pool(hive_rpc::PoolError::Rpc(e)) => e.is_retryable(),
            Self::Pool(hive_rpc::PoolError::PoolExhausted { .. }) => true,
            Self::UnhandledRpc(_) => true,
            Self::AccountDoesNotExist(_)
            | Self::NotAuthorized(_)
            | Self::MissingKey
            | Self::Decode(_)
            | Self::Sink(_) => false,
        }
    }
}

/// Application-level errors: what binaries actually return from `main`
/// and from their top-level worker loops.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppError {
    /// Domain logic error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Infrastructure error.
    #[error(transparent)]
    Infra(#[from] InfraError),

    /// Configuration error (missing env var, bad CLI combination, invalid
    /// settings file).
    #[error("configuration error: {0}")]
    Config(String),

    /// The publisher exhausted its retry ladder (18 consecutive
    /// failures).
    #[error("retry ladder exhausted after {attempts} consecutive failures")]
    RetryLadderExhausted {
        /// Number of consecutive failures observed.
        attempts: usize,
    },

    /// Graceful shutdown was requested (SIGINT/SIGTERM) and is propagating
    /// up through the worker loops.
    #[error("shutdown requested")]
    ShutdownRequested,
}

/// Result type alias using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_error_displays_limits() {
        let err = DomainError::BatchTooManyUrls { actual: 91, limit: 90 };
        assert!(err.to_string().contains("91"));
        assert!(err.to_string().contains('9'));
    }

    #[test]
    fn app_error_from_domain() {
        let domain = DomainError::EmptyUrl;
        let app: AppError = domain.into();
        assert!(matches!(app, AppError::Domain(DomainError::EmptyUrl)));
    }

    #[test]
    fn infra_classifies_retryable() {
        assert!(InfraError::UnhandledRpc("rc exhausted".into()).is_retryable());
        assert!(!InfraError::MissingKey.is_retryable());
        assert!(!InfraError::AccountDoesNotExist("alice".into()).is_retryable());
    }
}
