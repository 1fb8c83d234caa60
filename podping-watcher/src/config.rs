//! Settings for the watcher binary, loaded in layers: compiled-in
//! defaults, an optional TOML file, then environment variables prefixed
//! `PODPING_WATCHER__` (double underscore nesting) — the same layering
//! `podping-writer/src/config.rs` uses, grounded on
//! `ghostnet-indexer/src/config/settings.rs`.

use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ConfigError;

/// Root settings structure for the watcher.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Node-pool connection settings.
    #[serde(default)]
    pub node: NodeSettings,
    /// Allow-list refresh settings.
    #[serde(default)]
    pub allowlist: AllowlistSettings,
    /// Operation filter settings.
    #[serde(default)]
    pub filter: FilterSettings,
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
            .set_default("allowlist.control_account", "podping".to_string())?
            .set_default("allowlist.refresh_interval_secs", 3_600_i64)?
            .set_default("filter.enforce_allowlist", false)?
            .set_default("logging.json", false)?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        } else {
            builder = builder.add_source(File::with_name("podping-watcher").required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("PODPING_WATCHER")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Self = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Validate settings, collecting every violation rather than failing
    /// on the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.node.endpoints.is_empty() {
            errors.push("node.endpoints must contain at least one URL".into());
        }
        if self.node.breaker_threshold == 0 {
            errors.push("node.breaker_threshold must be > 0".into());
        }
        if self.allowlist.refresh_interval_secs == 0 {
            errors.push("allowlist.refresh_interval_secs must be > 0".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Node-pool connection settings. Identical shape to the writer's;
/// duplicated rather than shared because the two binaries' settings
/// files are independent deployment artifacts.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSettings {
    /// Production Hive RPC endpoints.
    pub endpoints: Vec<String>,
    /// Endpoints used instead when `-t`/`USE_TEST_NODE` is set.
    pub testnet_endpoints: Vec<String>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds.
    pub read_timeout_ms: u64,
    /// Endpoint-rotation attempts within a single call.
    pub max_retries_per_call: usize,
    /// Consecutive failures before an endpoint's breaker opens.
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

/// Allow-list refresh settings (spec §4.2).
#[derive(Debug, Clone, Deserialize)]
pub struct AllowlistSettings {
    /// Control account whose follow-list is consulted.
    pub control_account: String,
    /// Minimum time between refreshes.
    pub refresh_interval_secs: u64,
}

impl AllowlistSettings {
    /// The refresh interval as a [`chrono::Duration`].
    #[must_use]
    pub fn refresh_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.refresh_interval_secs).unwrap_or(3_600))
    }
}

impl Default for AllowlistSettings {
    fn default() -> Self {
        Self {
            control_account: "podping".to_string(),
            refresh_interval_secs: 3_600,
        }
    }
}

/// Operation filter settings (spec §4.8, §9 open question).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterSettings {
    /// Whether to discard operations whose `required_posting_auths`
    /// share no element with the allow-list. Off by default per spec
    /// §9's open-question decision.
    #[serde(default)]
    pub enforce_allowlist: bool,
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
    fn enforce_allowlist_defaults_off() {
        let settings = Settings::load(None).expect("load failed");
        assert!(!settings.filter.enforce_allowlist);
    }

    #[test]
    fn zero_refresh_interval_is_rejected() {
        let mut settings_allowlist = AllowlistSettings::default();
        settings_allowlist.refresh_interval_secs = 0;
        let settings = Settings {
            node: NodeSettings::default(),
            allowlist: settings_allowlist,
            filter: FilterSettings::default(),
            logging: LoggingSettings::default(),
        };
        assert!(settings.validate().is_err());
    }
}
