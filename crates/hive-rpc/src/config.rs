//! Configuration for the Hive node pool.
//!
//! This module provides [`PoolConfig`] for customizing retry, timeout, and
//! circuit-breaker behavior.
//!
//! ```
//! use hive_rpc::PoolConfig;
//! use std::time::Duration;
//!
//! let config = PoolConfig::default()
//!     .with_read_timeout(Duration::from_secs(60))
//!     .with_breaker_threshold(10);
//! ```

use std::time::Duration;

use crate::error::{RpcError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Connect timeout during normal operation (spec §4.1, §5).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Read timeout during normal operation.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Read timeout used during the writer's startup probe.
pub const STARTUP_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Number of endpoint-rotation attempts within a single logical call.
pub const DEFAULT_MAX_RETRIES_PER_CALL: usize = 3;

/// Consecutive failures before an endpoint's circuit breaker opens.
pub const DEFAULT_BREAKER_THRESHOLD: u32 = 5;

/// Cooldown before an open circuit breaker is eligible to close.
pub const DEFAULT_BREAKER_COOLDOWN: Duration = Duration::from_secs(60);

const MIN_TIMEOUT: Duration = Duration::from_millis(100);
const MAX_TIMEOUT: Duration = Duration::from_secs(300);
const MIN_RETRIES: usize = 1;
const MAX_RETRIES: usize = 10;

// ═══════════════════════════════════════════════════════════════════════════════
// POOL CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration options for [`NodePool`](crate::NodePool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Read timeout once connected.
    pub read_timeout: Duration,
    /// Maximum endpoint-rotation attempts within a single call.
    pub max_retries_per_call: usize,
    /// Consecutive failures before an endpoint's breaker opens.
    pub breaker_threshold: u32,
    /// Cooldown duration before an open breaker is eligible to close.
    pub breaker_cooldown: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_retries_per_call: DEFAULT_MAX_RETRIES_PER_CALL,
            breaker_threshold: DEFAULT_BREAKER_THRESHOLD,
            breaker_cooldown: DEFAULT_BREAKER_COOLDOWN,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the reduced startup-probe read timeout (spec §4.1: "3s during
    /// startup probe").
    #[must_use]
    pub fn with_startup_probe_timeouts(mut self) -> Self {
        self.read_timeout = STARTUP_READ_TIMEOUT;
        self
    }

    /// Override the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Override the per-call endpoint-rotation retry budget.
    #[must_use]
    pub fn with_max_retries_per_call(mut self, retries: usize) -> Self {
        self.max_retries_per_call = retries;
        self
    }

    /// Override the circuit-breaker failure threshold.
    #[must_use]
    pub fn with_breaker_threshold(mut self, threshold: u32) -> Self {
        self.breaker_threshold = threshold;
        self
    }

    /// Override the circuit-breaker cooldown.
    #[must_use]
    pub fn with_breaker_cooldown(mut self, cooldown: Duration) -> Self {
        self.breaker_cooldown = cooldown;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidConfig`] if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout < MIN_TIMEOUT || self.connect_timeout > MAX_TIMEOUT {
            return Err(RpcError::InvalidConfig(format!(
                "connect_timeout must be between {MIN_TIMEOUT:?} and {MAX_TIMEOUT:?}"
            )));
        }
        if self.read_timeout < MIN_TIMEOUT || self.read_timeout > MAX_TIMEOUT {
            return Err(RpcError::InvalidConfig(format!(
                "read_timeout must be between {MIN_TIMEOUT:?} and {MAX_TIMEOUT:?}"
            )));
        }
        if self.max_retries_per_call < MIN_RETRIES || self.max_retries_per_call > MAX_RETRIES {
            return Err(RpcError::InvalidConfig(format!(
                "max_retries_per_call must be between {MIN_RETRIES} and {MAX_RETRIES}"
            )));
        }
        if self.breaker_threshold == 0 {
            return Err(RpcError::InvalidConfig(
                "breaker_threshold must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn startup_probe_shortens_read_timeout() {
        let config = PoolConfig::default().with_startup_probe_timeouts();
        assert_eq!(config.read_timeout, STARTUP_READ_TIMEOUT);
    }

    #[test]
    fn builder_overrides_apply() {
        let config = PoolConfig::new()
            .with_connect_timeout(Duration::from_secs(1))
            .with_max_retries_per_call(5)
            .with_breaker_threshold(10);
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.max_retries_per_call, 5);
        assert_eq!(config.breaker_threshold, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_threshold() {
        let config = PoolConfig::new().with_breaker_threshold(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_timeout() {
        let too_low = PoolConfig::new().with_read_timeout(Duration::from_millis(1));
        assert!(too_low.validate().is_err());

        let too_high = PoolConfig::new().with_read_timeout(Duration::from_secs(1000));
        assert!(too_high.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_retries() {
        let config = PoolConfig::new().with_max_retries_per_call(0);
        assert!(config.validate().is_err());
    }
}
