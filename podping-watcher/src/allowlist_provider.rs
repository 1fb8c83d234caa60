//! Hourly-refresh wrapper around [`hive_rpc::NodePool::get_following`],
//! feeding [`podping_core::AllowList`] (spec §4.2).
//!
//! Grounded on `original_source/hive-watcher/hive-watcher.py`'s
//! `get_allowed_accounts()` (fetch the control account's `blog` follows,
//! paginate in pages of 1000 by `start_author`) and its once-per-hour
//! refresh check inside `scan_chain`.

use std::sync::Arc;

use podping_core::{AllowList, Clock};
use tracing::{info, warn};

use crate::error::WatcherError;

const FOLLOW_TYPE: &str = "blog";
const PAGE_LIMIT: u32 = 1000;

/// Keeps an [`AllowList`] snapshot fresh against the control account's
/// follow list, refreshing no more than once per configured interval.
pub struct AllowListProvider {
    pool: Arc<hive_rpc::NodePool>,
    clock: Arc<dyn Clock>,
    control_account: String,
    refresh_interval: chrono::Duration,
    current: AllowList,
}

impl AllowListProvider {
    /// Build a provider that starts out empty (spec §4.2 cold-start:
    /// "returns an empty set and logs a warning"), to be refreshed by
    /// the first [`Self::refresh_if_due`] call.
    #[must_use]
    pub fn new(
        pool: Arc<hive_rpc::NodePool>,
        clock: Arc<dyn Clock>,
        control_account: String,
        refresh_interval: chrono::Duration,
    ) -> Self {
        warn!(control_account = %control_account, "allow-list starting empty, awaiting first refresh");
        Self {
            pool,
            clock,
            control_account,
            refresh_interval,
            current: AllowList::empty(),
        }
    }

    /// The current snapshot, regardless of staleness.
    #[must_use]
    pub fn current(&self) -> &AllowList {
        &self.current
    }

    /// Refresh the snapshot from the chain if due, replacing
    /// [`Self::current`] on success. A fetch failure is logged and the
    /// stale snapshot is kept in service (spec §4.2/§7: "Pool" error
    /// kind while refreshing the allow-list logs and keeps serving the
    /// previous snapshot").
    pub async fn refresh_if_due(&mut self) {
        let now = self.clock.now();
        if !self.current.is_due_for_refresh(now, self.refresh_interval) {
            return;
        }

        match self.fetch_all().await {
            Ok(accounts) => {
                let count = accounts.len();
                self.current = AllowList::from_accounts(accounts, now);
                info!(control_account = %self.control_account, count, "allow-list refreshed");
            }
            Err(e) => {
                warn!(control_account = %self.control_account, error = %e, "allow-list refresh failed, keeping stale snapshot");
            }
        }
    }

    async fn fetch_all(&self) -> Result<Vec<String>, WatcherError> {
        let mut accounts = Vec::new();
        let mut start: Option<String> = None;

        loop {
            let page = self
                .pool
                .get_following(&self.control_account, start.as_deref(), FOLLOW_TYPE, PAGE_LIMIT)
                .await?;

            let page_len = page.len();
            let last = page.last().map(|entry| entry.following.clone());

            for entry in &page {
                // `get_following` pagination is inclusive of `start`; the
                // first entry of every page but the first is a repeat.
                if start.as_deref() != Some(entry.following.as_str()) {
                    accounts.push(entry.following.clone());
                }
            }

            if page_len < PAGE_LIMIT as usize {
                break;
            }
            start = last;
        }

        Ok(accounts)
    }
}
