//! Per-endpoint circuit breaker.
//!
//! Tracks consecutive failures per RPC endpoint and "trips" (disables)
//! endpoints that exceed the failure threshold. Tripped endpoints can
//! auto-reset after a cooldown period or be manually reset.
//!
//! ```
//! use hive_rpc::circuit::CircuitBreaker;
//! use std::time::Duration;
//!
//! let mut breaker = CircuitBreaker::new(5, Duration::from_secs(60));
//! breaker.record_failure("https://api.hive.blog");
//! assert!(!breaker.is_open("https://api.hive.blog"));
//! ```

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Per-endpoint circuit breaker (spec §4.1: "a per-endpoint circuit breaker
/// opens after N consecutive failures and closes after a cooldown").
///
/// Not thread-safe by itself; the pool wraps it in a `Mutex`.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    failure_counts: HashMap<String, u32>,
    open: HashSet<String>,
    opened_at: HashMap<String, DateTime<Utc>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    #[must_use]
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            failure_counts: HashMap::new(),
            open: HashSet::new(),
            opened_at: HashMap::new(),
        }
    }

    /// Record a successful call against an endpoint, clearing its failure
    /// count.
    pub fn record_success(&mut self, endpoint: &str) {
        self.failure_counts.remove(endpoint);
    }

    /// Record a failed call against an endpoint.
    ///
    /// Returns `true` if this failure just opened the breaker.
    pub fn record_failure(&mut self, endpoint: &str) -> bool {
        if self.open.contains(endpoint) {
            return false;
        }

        let count = self.failure_counts.entry(endpoint.to_string()).or_insert(0);
        *count = count.saturating_add(1);

        if *count >= self.threshold {
            warn!(endpoint, failures = *count, threshold = self.threshold, "circuit breaker opened");
            self.open.insert(endpoint.to_string());
            self.opened_at.insert(endpoint.to_string(), Utc::now());
            return true;
        }
        false
    }

    /// Whether the breaker for this endpoint is currently open.
    #[must_use]
    pub fn is_open(&self, endpoint: &str) -> bool {
        self.open.contains(endpoint)
    }

    /// Number of endpoints with an open breaker.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Manually close an endpoint's breaker.
    pub fn reset(&mut self, endpoint: &str) {
        if self.open.remove(endpoint) {
            info!(endpoint, "circuit breaker manually reset");
        }
        self.failure_counts.remove(endpoint);
        self.opened_at.remove(endpoint);
    }

    /// Close any breakers whose cooldown has elapsed. Returns the number
    /// closed.
    pub fn auto_reset(&mut self) -> usize {
        let now = Utc::now();
        let cooldown = chrono::Duration::from_std(self.cooldown).unwrap_or_else(|_| chrono::Duration::seconds(60));

        let to_reset: Vec<String> = self
            .opened_at
            .iter()
            .filter(|(_, opened)| now - **opened > cooldown)
            .map(|(endpoint, _)| endpoint.clone())
            .collect();

        let count = to_reset.len();
        for endpoint in to_reset {
            info!(endpoint = %endpoint, "circuit breaker auto-reset after cooldown");
            self.reset(&endpoint);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold() {
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(!breaker.record_failure("a"));
        assert!(!breaker.record_failure("a"));
        assert!(breaker.record_failure("a"));
        assert!(breaker.is_open("a"));
    }

    #[test]
    fn success_clears_count_without_closing() {
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure("a");
        breaker.record_failure("a");
        breaker.record_success("a");
        breaker.record_failure("a");
        assert!(!breaker.is_open("a"));
    }

    #[test]
    fn endpoints_are_independent() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure("a");
        assert!(breaker.is_open("a"));
        assert!(!breaker.is_open("b"));
        assert_eq!(breaker.open_count(), 1);
    }

    #[test]
    fn manual_reset_closes_breaker() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure("a");
        assert!(breaker.is_open("a"));
        breaker.reset("a");
        assert!(!breaker.is_open("a"));
    }

    #[test]
    fn auto_reset_after_cooldown() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure("a");
        assert!(breaker.is_open("a"));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(breaker.auto_reset(), 1);
        assert!(!breaker.is_open("a"));
    }

    #[test]
    fn already_open_does_not_recount() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        assert!(breaker.record_failure("a"));
        assert!(!breaker.record_failure("a"));
    }
}
