//! The allow-list snapshot: the set of accounts permitted to publish
//! podping notifications, sourced from a control account's follow list
//! (spec §4.2).
//!
//! This module holds the pure snapshot type only. Refreshing it against
//! the chain (via `get_following`) is the watcher's concern, since it
//! needs a live [`hive_rpc::NodePool`] and a refresh cadence.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

/// A point-in-time view of the allow-list.
#[derive(Debug, Clone)]
pub struct AllowList {
    accounts: HashSet<String>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl AllowList {
    /// An empty allow-list with no refresh recorded yet (the cold-start
    /// state, spec §4.2: "returns an empty set and logs a warning").
    #[must_use]
    pub fn empty() -> Self {
        Self {
            accounts: HashSet::new(),
            refreshed_at: None,
        }
    }

    /// Build a snapshot from a freshly-fetched account set.
    #[must_use]
    pub fn from_accounts(accounts: impl IntoIterator<Item = String>, refreshed_at: DateTime<Utc>) -> Self {
        Self {
            accounts: accounts.into_iter().collect(),
            refreshed_at: Some(refreshed_at),
        }
    }

    /// Whether `account` is currently allow-listed.
    #[must_use]
    pub fn contains(&self, account: &str) -> bool {
        self.accounts.contains(account)
    }

    /// Whether any of `auths` is allow-listed (used by the operation
    /// filter's optional authorization check).
    #[must_use]
    pub fn any_authorized(&self, auths: &[String]) -> bool {
        auths.iter().any(|a| self.contains(a))
    }

    /// When this snapshot was last refreshed, if ever.
    #[must_use]
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Whether a refresh is due given `now` and a refresh interval
    /// (spec §4.2: "at least once per hour").
    #[must_use]
    pub fn is_due_for_refresh(&self, now: DateTime<Utc>, interval: chrono::Duration) -> bool {
        match self.refreshed_at {
            None => true,
            Some(last) => now - last >= interval,
        }
    }

    /// Number of accounts currently allow-listed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the snapshot holds no accounts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn empty_allowlist_authorizes_nothing() {
        let list = AllowList::empty();
        assert!(!list.contains("alice"));
        assert!(list.refreshed_at().is_none());
        assert!(list.is_empty());
    }

    #[test]
    fn cold_start_is_always_due_for_refresh() {
        let list = AllowList::empty();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(list.is_due_for_refresh(now, chrono::Duration::hours(1)));
    }

    #[test]
    fn refresh_due_after_interval_elapses() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let list = AllowList::from_accounts(["alice".to_string()], now);
        assert!(!list.is_due_for_refresh(now + chrono::Duration::minutes(30), chrono::Duration::hours(1)));
        assert!(list.is_due_for_refresh(now + chrono::Duration::hours(2), chrono::Duration::hours(1)));
    }

    #[test]
    fn any_authorized_checks_membership() {
        let list = AllowList::from_accounts(["alice".to_string(), "bob".to_string()], Utc::now());
        assert!(list.any_authorized(&["carol".to_string(), "bob".to_string()]));
        assert!(!list.any_authorized(&["carol".to_string()]));
    }
}
