//! The watcher's operation filter: decides whether an observed
//! `custom_json` operation is a podping notification, and if so,
//! normalizes its JSON payload into a single schema (spec §4.8).

use regex::Regex;
use serde::Deserialize;

use crate::constants::{DIAGNOSTIC_OPERATION_IDS, PATTERN_LIVETEST, PATTERN_PRODUCTION};

/// Raw shape of a podping `json` payload before normalization. Different
/// podping library versions have sent different key names for the same
/// concept; this captures the union.
#[derive(Debug, Deserialize)]
struct RawPayload {
    version: Option<String>,
    #[serde(default)]
    iris: Vec<String>,
    #[serde(default)]
    urls: Vec<String>,
    url: Option<String>,
    medium: Option<String>,
    reason: Option<String>,
    #[serde(rename = "hiveTxId")]
    hive_tx_id: Option<String>,
    #[serde(rename = "hiveBlockNum")]
    hive_block_num: Option<u64>,
}

/// A single normalized notification, ready for a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    /// All URLs carried by the operation, in payload order.
    pub urls: Vec<String>,
    /// Free-text summary of medium + reason, or a generic fallback.
    pub medium_reason: String,
    /// Block number the operation was observed in.
    pub block_num: u64,
    /// Transaction id the operation was observed in.
    pub trx_id: String,
    /// RFC 3339 block timestamp.
    pub timestamp: String,
    /// Required posting auths on the operation (used for optional
    /// allow-list enforcement).
    pub required_posting_auths: Vec<String>,
    /// Hive tx id / block num annotation, present only when the source
    /// payload carried `hive_properties` and JSON output mode is active.
    pub hive_annotation: Option<(String, u64)>,
}

/// Which notification family an operation id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Matches the production podping pattern.
    Production,
    /// Matches the livetest podping pattern.
    Livetest,
    /// One of the startup-diagnostic ids.
    Diagnostic,
}

/// Decides which operations pass and normalizes the ones that do.
#[derive(Debug)]
pub struct OperationFilter {
    production: Regex,
    livetest: Regex,
    accept_livetest: bool,
    accept_diagnostic: bool,
    annotate_hive_properties: bool,
}

impl OperationFilter {
    /// Build a filter. `accept_livetest` selects the livetest id pattern
    /// instead of (not in addition to) production; `accept_diagnostic`
    /// admits `podping-startup`/`pp_startup`; `annotate_hive_properties`
    /// controls whether normalized records carry the `hiveTxId`/
    /// `hiveBlockNum` annotation (only meaningful for JSON-output sinks).
    ///
    /// # Panics
    ///
    /// Never: the patterns are compile-time constants known to be valid
    /// regexes.
    #[must_use]
    pub fn new(accept_livetest: bool, accept_diagnostic: bool, annotate_hive_properties: bool) -> Self {
        Self {
            production: Regex::new(PATTERN_PRODUCTION).expect("built-in pattern is valid"),
            livetest: Regex::new(PATTERN_LIVETEST).expect("built-in pattern is valid"),
            accept_livetest,
            accept_diagnostic,
            annotate_hive_properties,
        }
    }

    /// Classify an operation id, or `None` if it should be rejected
    /// outright.
    #[must_use]
    pub fn classify(&self, operation_id: &str) -> Option<OperationKind> {
        if self.accept_diagnostic && DIAGNOSTIC_OPERATION_IDS.contains(&operation_id) {
            return Some(OperationKind::Diagnostic);
        }
        if self.accept_livetest {
            if self.livetest.is_match(operation_id) {
                return Some(OperationKind::Livetest);
            }
            return None;
        }
        if self.production.is_match(operation_id) {
            return Some(OperationKind::Production);
        }
        None
    }

    /// Parse and normalize a payload for an operation that already passed
    /// [`classify`](Self::classify).
    ///
    /// Returns `None` if the payload is not valid JSON or carries no
    /// URLs at all (both treated as a skip-and-warn at the call site,
    /// per spec §7's "Decode" error kind).
    #[must_use]
    pub fn normalize(
        &self,
        json: &str,
        block_num: u64,
        trx_id: &str,
        timestamp: &str,
        required_posting_auths: Vec<String>,
    ) -> Option<NormalizedRecord> {
        let raw: RawPayload = serde_json::from_str(json).ok()?;

        let (urls, medium_reason) = if raw.version.as_deref() == Some("1.0") && !raw.iris.is_empty() {
            let medium = raw.medium.unwrap_or_default();
            let reason = raw.reason.unwrap_or_default();
            (raw.iris, format!("{medium} {reason}").trim().to_string())
        } else if !raw.urls.is_empty() {
            (raw.urls, "podcast update".to_string())
        } else if let Some(url) = raw.url {
            (vec![url], "podcast update".to_string())
        } else {
            return None;
        };

        let hive_annotation = if self.annotate_hive_properties {
            match (raw.hive_tx_id, raw.hive_block_num) {
                (Some(tx), Some(block)) => Some((tx, block)),
                _ => None,
            }
        } else {
            None
        };

        Some(NormalizedRecord {
            urls,
            medium_reason,
            block_num,
            trx_id: trx_id.to_string(),
            timestamp: timestamp.to_string(),
            required_posting_auths,
            hive_annotation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_pattern_matches_podping() {
        let filter = OperationFilter::new(false, false, false);
        assert_eq!(filter.classify("podping"), Some(OperationKind::Production));
        assert_eq!(filter.classify("pp_1_2"), Some(OperationKind::Production));
        assert_eq!(filter.classify("podping-lite"), None);
        assert_eq!(filter.classify("vote"), None);
    }

    #[test]
    fn livetest_mode_only_matches_livetest_pattern() {
        let filter = OperationFilter::new(true, false, false);
        assert_eq!(filter.classify("podping-livetest"), Some(OperationKind::Livetest));
        assert_eq!(filter.classify("podping"), None);
    }

    #[test]
    fn diagnostic_ids_require_opt_in() {
        let without = OperationFilter::new(false, false, false);
        assert_eq!(without.classify("podping-startup"), None);

        let with = OperationFilter::new(false, true, false);
        assert_eq!(with.classify("podping-startup"), Some(OperationKind::Diagnostic));
        assert_eq!(with.classify("pp_startup"), Some(OperationKind::Diagnostic));
    }

    #[test]
    fn block_with_mixed_ids_filters_correctly() {
        let filter = OperationFilter::new(false, false, false);
        let ids = ["podping", "podping-lite", "pp_1_2", "vote"];
        let passed: Vec<&str> = ids
            .iter()
            .filter(|id| filter.classify(id).is_some())
            .copied()
            .collect();
        assert_eq!(passed, vec!["podping", "pp_1_2"]);
    }

    #[test]
    fn normalizes_simple_url_field() {
        let filter = OperationFilter::new(false, false, false);
        let record = filter
            .normalize(
                r#"{"url": "https://a.example/f.xml"}"#,
                10,
                "abc",
                "2024-01-01T00:00:03",
                vec!["alice".into()],
            )
            .expect("normalize failed");
        assert_eq!(record.urls, vec!["https://a.example/f.xml".to_string()]);
        assert_eq!(record.medium_reason, "podcast update");
    }

    #[test]
    fn normalizes_legacy_iris_schema() {
        let filter = OperationFilter::new(false, false, false);
        let record = filter
            .normalize(
                r#"{"version":"1.0","medium":"podcast","reason":"update","iris":["a","b"]}"#,
                10,
                "abc",
                "2024-01-01T00:00:03",
                vec![],
            )
            .expect("normalize failed");
        assert_eq!(record.urls, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(record.medium_reason, "podcast update");
    }

    #[test]
    fn hive_annotation_only_when_enabled() {
        let filter = OperationFilter::new(false, false, true);
        let record = filter
            .normalize(
                r#"{"url":"https://a.example","hiveTxId":"tx1","hiveBlockNum":5}"#,
                10,
                "tx1",
                "2024-01-01T00:00:03",
                vec![],
            )
            .expect("normalize failed");
        assert_eq!(record.hive_annotation, Some(("tx1".to_string(), 5)));
    }

    #[test]
    fn payload_without_urls_is_rejected() {
        let filter = OperationFilter::new(false, false, false);
        assert!(filter
            .normalize(r#"{"foo":"bar"}"#, 1, "t", "2024-01-01T00:00:00", vec![])
            .is_none());
    }

    #[test]
    fn invalid_json_is_rejected() {
        let filter = OperationFilter::new(false, false, false);
        assert!(filter.normalize("not json", 1, "t", "2024-01-01T00:00:00", vec![]).is_none());
    }
}
