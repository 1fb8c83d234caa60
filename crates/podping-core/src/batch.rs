//! The URL batch: the writer's in-flight accumulation of URLs destined for
//! a single on-chain `custom_json` operation.
//!
//! A batch has set semantics (duplicate URLs within the batch collapse to
//! one) but preserves first-seen order, since the chain-side record of
//! which URL arrived first is otherwise lost.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::constants::{HIVE_OPERATION_PERIOD, MAX_URL_LIST_BYTES, MAX_URL_PER_CUSTOM_JSON};

/// Why a batch sealed when it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealReason {
    /// The accumulation window elapsed.
    TimeWindow,
    /// The serialized byte budget was reached.
    ByteBudget,
    /// The URL count budget was reached.
    CountBudget,
}

/// An in-progress (or just-sealed) accumulation of URLs.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    urls: Vec<String>,
    seen: HashSet<String>,
    first_arrival: Option<DateTime<Utc>>,
}

impl Batch {
    /// An empty batch with nothing accumulated yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a URL to the batch. Returns `false` if the URL was already
    /// present (set semantics; the batch is unchanged).
    pub fn push(&mut self, url: impl Into<String>, arrived_at: DateTime<Utc>) -> bool {
        let url = url.into();
        if self.first_arrival.is_none() {
            self.first_arrival = Some(arrived_at);
        }
        if self.seen.insert(url.clone()) {
            self.urls.push(url);
            true
        } else {
            false
        }
    }

    /// Whether the batch holds no URLs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Number of distinct URLs currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// The distinct URLs in first-arrival order.
    #[must_use]
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Total serialized byte size of the current URL list (sum of UTF-8
    /// lengths; matches the budget the source enforces before JSON
    /// encoding overhead).
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.urls.iter().map(String::len).sum()
    }

    /// Whether this batch should seal right now, given the current time.
    /// Returns the reason if so.
    #[must_use]
    pub fn should_seal(&self, now: DateTime<Utc>) -> Option<SealReason> {
        if self.is_empty() {
            return None;
        }
        if self.len() >= MAX_URL_PER_CUSTOM_JSON {
            return Some(SealReason::CountBudget);
        }
        if self.byte_size() >= MAX_URL_LIST_BYTES {
            return Some(SealReason::ByteBudget);
        }
        if let Some(first) = self.first_arrival {
            let window = chrono::Duration::from_std(HIVE_OPERATION_PERIOD)
                .unwrap_or_else(|_| chrono::Duration::seconds(3));
            if now - first >= window {
                return Some(SealReason::TimeWindow);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn duplicate_urls_collapse() {
        let mut batch = Batch::new();
        assert!(batch.push("https://a.example/f.xml", at(0)));
        assert!(!batch.push("https://a.example/f.xml", at(1)));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn preserves_first_arrival_order() {
        let mut batch = Batch::new();
        batch.push("B", at(0));
        batch.push("A", at(1));
        batch.push("B", at(2));
        assert_eq!(batch.urls(), &["B".to_string(), "A".to_string()]);
    }

    #[test]
    fn empty_batch_never_seals() {
        let batch = Batch::new();
        assert_eq!(batch.should_seal(at(100)), None);
    }

    #[test]
    fn seals_on_time_window() {
        let mut batch = Batch::new();
        batch.push("x", at(0));
        assert_eq!(batch.should_seal(at(2)), None);
        assert_eq!(batch.should_seal(at(3)), Some(SealReason::TimeWindow));
    }

    #[test]
    fn seals_on_count_budget() {
        let mut batch = Batch::new();
        for i in 0..MAX_URL_PER_CUSTOM_JSON {
            batch.push(format!("u{i}"), at(0));
        }
        assert_eq!(batch.should_seal(at(0)), Some(SealReason::CountBudget));
    }

    #[test]
    fn seals_on_byte_budget() {
        let mut batch = Batch::new();
        let long = "x".repeat(MAX_URL_LIST_BYTES);
        batch.push(long, at(0));
        assert_eq!(batch.should_seal(at(0)), Some(SealReason::ByteBudget));
    }

    #[test]
    fn two_hundred_short_urls_seal_in_multiple_batches_under_byte_budget() {
        let mut batches: Vec<Batch> = vec![Batch::new()];
        for i in 0..200 {
            let url = format!("{i:0>96}");
            let current = batches.last_mut().expect("at least one batch");
            current.push(url, at(0));
            if current.should_seal(at(0)).is_some() {
                batches.push(Batch::new());
            }
        }
        let total: usize = batches.iter().map(Batch::len).sum();
        assert_eq!(total, 200);
        for b in &batches {
            assert!(b.byte_size() <= MAX_URL_LIST_BYTES);
        }
    }
}
