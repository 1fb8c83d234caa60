//! Chain-agnostic domain types and pure logic shared by the podping writer
//! and watcher binaries.
//!
//! # Modules
//!
//! - [`constants`] - protocol constants (byte/count budgets, retry ladder, patterns)
//! - [`batch`] - [`batch::Batch`], the writer's in-flight URL accumulation
//! - [`envelope`] - [`envelope::PodpingEnvelope`], the on-chain wire payload
//! - [`cursor`] - [`cursor::BlockCursor`] and the block-number-from-timestamp estimator
//! - [`filter`] - [`filter::OperationFilter`], the watcher's id-match + schema normalizer
//! - [`allowlist`] - [`allowlist::AllowList`], the control-account follow-set snapshot
//! - [`clock`] - the [`clock::Clock`] time port
//! - [`error`] - the layered [`error::DomainError`]/[`error::InfraError`]/[`error::AppError`] taxonomy

pub mod allowlist;
pub mod batch;
pub mod clock;
pub mod constants;
pub mod cursor;
pub mod envelope;
pub mod error;
pub mod filter;

pub use allowlist::AllowList;
pub use batch::{Batch, SealReason};
pub use clock::{Clock, SystemClock};
pub use cursor::{estimate_block_num, BlockCursor, BlockSource, CursorMode};
pub use envelope::PodpingEnvelope;
pub use error::{AppError, DomainError, InfraError, Result};
pub use filter::{NormalizedRecord, OperationFilter, OperationKind};

#[cfg(any(test, feature = "test-utils"))]
pub use clock::FakeClock;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
