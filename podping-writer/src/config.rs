//! Settings for the writer binary, loaded in layers: compiled-in defaults,
//! an optional TOML file, then environment variables prefixed
//! `PODPING_WRITER__` (double underscore nesting), mirroring the
//! settings-loading shape of the reference indexer service.
//!
//! The three credentials (`HIVE_SERVER_ACCOUNT`, `HIVE_POSTING_KEY`,
//! `USE_TEST_NODE`) are deliberately *not* part of this struct; they are
//! read straight from the process environment in `main.rs`, matching the
//! split the original writer draws between CLI-derived config and
//! `os.getenv` secrets.

use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ConfigError;

/// Root settings structure for the writer.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Node-pool connection settings.
    #[serde(default)]
    pub node: NodeSettings,
    /// Publisher retry/fault-injection settings.
    #[serde(default)]
    pub publisher: PublisherSettings,
    /// Ingest transport settings.
    #[serde(default)]
    pub ingest: IngestSettings,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from an optional TOML file plus environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the file exists but fails to
    /// parse, or an environment override fails to coerce to its field's
    /// type.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("node.endpoints", vec!["https://api.hive.blog".to_string()])?
            .set_default("node.testnet_endpoints", vec!["https://testnet.openhive.network".to_string()])?
            .set_default("node.connect_timeout_ms", 3_000_i64)?
            .set_default("node.read_timeout_ms", 30_000_i64)?
            .set_default("node.max_retries_per_call", 3_i64)?
            .set_default("node.breaker_threshold", 5_i64)?
            .set_default("node.breaker_cooldown_secs", 60_i64)?
            .set_default("publisher.fault_injection_percent", 0_i64)?
            .set_default("ingest.line_socket_host", "0.0.0.0".to_string())?
            .set_default("ingest.reqrep_socket_host", "0.0.0.0".to_string())?
            .set_default("logging.json", false)?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        } else {
            builder = builder.add_source(File::with_name("podping-writer").required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("PODPING_WRITER")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Self = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Validate settings, collecting every violation rather than failing
    /// on the first (spec §10.3).
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.node.endpoints.is_empty() {
            errors.push("node.endpoints must contain at least one URL".into());
        }
        if self.node.breaker_threshold == 0 {
            errors.push("node.breaker_threshold must be > 0".into());
        }
        if self.publisher.fault_injection_percent > 100 {
            errors.push("publisher.fault_injection_percent must be <= 100".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Node-pool connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSettings {
    /// Production Hive RPC endpoints.
    pub endpoints: Vec<String>,
    /// Endpoints used instead when `USE_TEST_NODE` is set (spec §10.6).
    pub testnet_endpoints: Vec<String>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds.
    pub read_timeout_ms: u64,
    /// Endpoint-rotation attempts within a single call.
    pub max_retries_per_call: usize,
    /// Consecutive failures before a breaker opens.
    pub breaker_threshold: u32,
    /// Breaker cooldown in seconds.
    pub breaker_cooldown_secs: u64,
}

impl NodeSettings {
    /// Endpoints to use, honoring the testnet switch.
    #[must_use]
    pub fn active_endpoints(&self, use_test_node: bool) -> Vec<String> {
        if use_test_node {
            self.testnet_endpoints.clone()
        } else {
            self.endpoints.clone()
        }
    }

    /// Build a [`hive_rpc::PoolConfig`] from these settings.
    #[must_use]
    pub fn pool_config(&self) -> hive_rpc::PoolConfig {
        hive_rpc::PoolConfig::default()
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .with_read_timeout(Duration::from_millis(self.read_timeout_ms))
            .with_max_retries_per_call(self.max_retries_per_call)
            .with_breaker_threshold(self.breaker_threshold)
            .with_breaker_cooldown(Duration::from_secs(self.breaker_cooldown_secs))
    }
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            endpoints: vec!["https://api.hive.blog".to_string()],
            testnet_endpoints: vec!["https://testnet.openhive.network".to_string()],
            connect_timeout_ms: 3_000,
            read_timeout_ms: 30_000,
            max_retries_per_call: 3,
            breaker_threshold: 5,
            breaker_cooldown_secs: 60,
        }
    }
}

/// Publisher settings (spec §4.5, §10.6).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublisherSettings {
    /// Fault-injection percentage consulted only for id `"podping"`.
    #[serde(default)]
    pub fault_injection_percent: u8,
}

/// Ingest transport settings (spec §4.3).
#[derive(Debug, Clone, Deserialize)]
pub struct IngestSettings {
    /// Bind host for the line-socket ingest mode.
    pub line_socket_host: String,
    /// Bind host for the req/rep-socket ingest mode.
    pub reqrep_socket_host: String,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            line_socket_host: "0.0.0.0".to_string(),
            reqrep_socket_host: "0.0.0.0".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// Emit JSON-formatted log lines.
    #[serde(default)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        let settings = Settings::load(None).expect("load failed");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn testnet_switch_selects_testnet_endpoints() {
        let node = NodeSettings::default();
        assert_eq!(node.active_endpoints(true), node.testnet_endpoints);
        assert_eq!(node.active_endpoints(false), node.endpoints);
    }

    #[test]
    fn invalid_fault_injection_percent_is_rejected() {
        let mut settings_node = NodeSettings::default();
        settings_node.endpoints = vec!["https://x".into()];
        let settings = Settings {
            node: settings_node,
            publisher: PublisherSettings { fault_injection_percent: 101 },
            ingest: IngestSettings::default(),
            logging: LoggingSettings::default(),
        };
        assert!(settings.validate().is_err());
    }
}
