//! Round-robin, circuit-breaking JSON-RPC client for the Hive blockchain.
//!
//! This crate provides [`NodePool`], the transport the writer and watcher
//! binaries use to talk to `condenser_api`/`network_broadcast_api` nodes
//! without either one knowing about HTTP, retries, or endpoint health.
//!
//! # Modules
//!
//! - [`client`] - the [`NodePool`] implementation
//! - [`config`] - [`PoolConfig`] and its defaults
//! - [`circuit`] - per-endpoint [`CircuitBreaker`]
//! - [`backoff`] - bounded fibonacci backoff
//! - [`types`] - wire types for the Hive JSON-RPC surface
//! - [`error`] - [`RpcError`] / [`PoolError`]
//! - [`signing`] - posting-key transaction signing
//!
//! # Quick start
//!
//! ```no_run
//! # async fn run() -> Result<(), hive_rpc::PoolError> {
//! use hive_rpc::NodePool;
//!
//! let pool = NodePool::new(vec![
//!     "https://api.hive.blog".into(),
//!     "https://api.deathwing.me".into(),
//! ])?;
//! let head = pool.head_block_number().await?;
//! println!("head block: {head}");
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod circuit;
pub mod client;
pub mod config;
pub mod error;
pub mod signing;
pub mod types;

pub use circuit::CircuitBreaker;
pub use client::NodePool;
pub use config::PoolConfig;
pub use error::{PoolError, Result, RpcError};
pub use signing::{PostingKey, Signer, SigningError};
pub use types::{
    Account, Block, BroadcastResult, CustomJsonOperation, DynamicGlobalProperties, FindRcsResult,
    FollowEntry, RcAccount, RcManabar, SignedTransaction, Transaction, UnsignedTransaction,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version string.
#[must_use]
pub const fn version() -> &'static str {
    VERSION
}
