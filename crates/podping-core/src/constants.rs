//! Protocol constants shared by the writer and watcher.
//!
//! Values here are not tunables; they describe the wire protocol and the
//! chain's own cadence. Deployment-specific knobs (timeouts, ports, node
//! lists) live in each binary's settings module instead.

use std::time::Duration;

/// Current podping envelope version (`v` field).
pub const CURRENT_PODPING_VERSION: u8 = 2;

/// Maximum number of URLs a single batch may hold before it seals.
pub const MAX_URL_PER_CUSTOM_JSON: usize = 90;

/// Maximum serialized byte size of a batch's URL list before it seals.
pub const MAX_URL_LIST_BYTES: usize = 7000;

/// Batch accumulation window. The source's comment ("1 Hive operation per
/// this period") is aspirational, not enforced; see the design notes on
/// the batcher's sealing rule.
pub const HIVE_OPERATION_PERIOD: Duration = Duration::from_secs(3);

/// Hive's average block production interval, used by the block-number
/// estimator and the watcher's live-mode poll cadence.
pub const BLOCK_INTERVAL: Duration = Duration::from_secs(3);

/// Hard ceiling on a published `custom_json` operation's JSON payload.
pub const MAX_CUSTOM_JSON_BYTES: usize = 8192;

/// Number of history blocks fetched per pipelined RPC batch.
pub const HISTORY_BATCH_SIZE: u64 = 50;

/// Notification reason codes carried in the `r` field of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum NotificationReason {
    /// A feed's episode list changed.
    FeedUpdate = 1,
    /// A brand-new feed was announced.
    NewFeed = 2,
    /// A feed's canonical URL moved.
    HostChange = 3,
}

impl Default for NotificationReason {
    fn default() -> Self {
        Self::FeedUpdate
    }
}

/// The bounded retry ladder consulted by the publisher between failed
/// publish attempts: `HALT_TIME[failure_count]` seconds of sleep, indexed
/// from zero. 18 entries; the 19th consecutive failure is fatal.
pub const HALT_TIME: [u64; 18] = [0, 1, 1, 1, 1, 1, 1, 1, 3, 6, 9, 15, 15, 15, 15, 15, 15, 15];

/// Operation id used for production podping notifications.
pub const OPERATION_ID_PRODUCTION: &str = "podping";

/// Operation id used for livetest podping notifications.
pub const OPERATION_ID_LIVETEST: &str = "podping-livetest";

/// Operation id used by the writer's startup diagnostic probe.
pub const OPERATION_ID_STARTUP: &str = "podping-startup";

/// Regex pattern matching production podping operation ids (spec §4.8).
pub const PATTERN_PRODUCTION: &str = r"^pp_(.*)_(.*)|podping$";

/// Regex pattern matching livetest podping operation ids (spec §4.8).
pub const PATTERN_LIVETEST: &str = r"^pplt_(.*)_(.*)|podping-livetest$";

/// Diagnostic operation ids, which only pass the filter when diagnostic
/// output is explicitly enabled.
pub const DIAGNOSTIC_OPERATION_IDS: [&str; 2] = ["podping-startup", "pp_startup"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halt_time_has_eighteen_entries() {
        assert_eq!(HALT_TIME.len(), 18);
        assert_eq!(HALT_TIME[0], 0);
        assert_eq!(HALT_TIME[17], 15);
    }

    #[test]
    fn notification_reason_codes_match_wire_values() {
        assert_eq!(NotificationReason::FeedUpdate as u8, 1);
        assert_eq!(NotificationReason::NewFeed as u8, 2);
        assert_eq!(NotificationReason::HostChange as u8, 3);
    }
}
