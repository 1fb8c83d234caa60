//! The watcher's block cursor: history-vs-live mode tracking, and the
//! bisection-refined block-number-from-timestamp estimator (spec §4.7).

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hive_rpc::{Block, PoolError};

use crate::constants::BLOCK_INTERVAL;

/// A source of block data, implemented by [`hive_rpc::NodePool`] in
/// production and by an in-memory fake in tests.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Current chain head.
    async fn head_block_number(&self) -> Result<u64, PoolError>;
    /// Fetch a single block.
    async fn get_block(&self, number: u64) -> Result<Block, PoolError>;
}

#[async_trait]
impl BlockSource for hive_rpc::NodePool {
    async fn head_block_number(&self) -> Result<u64, PoolError> {
        self.head_block_number().await
    }

    async fn get_block(&self, number: u64) -> Result<Block, PoolError> {
        self.get_block(number).await
    }
}

/// Parse a Hive block timestamp (`"2024-01-01T00:00:03"`, no offset —
/// Hive timestamps are always UTC) into a `DateTime<Utc>`.
#[must_use]
pub fn parse_hive_timestamp(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or_else(|_| Utc::now())
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q }
}

/// Estimate the block number containing `target`, refined by bisection
/// against observed block timestamps.
///
/// Ported from the reference watcher's `get_estimated_block_num`
/// (itself adapted from `beem`'s blockchain estimator): seed a guess
/// from the head block's time delta, then repeatedly fetch the guessed
/// block and step by `Δt / BLOCK_INTERVAL` until the guess stabilizes or
/// lands within one block interval of the target.
///
/// # Errors
///
/// Propagates any [`PoolError`] from the underlying [`BlockSource`].
pub async fn estimate_block_num<S: BlockSource + ?Sized>(
    source: &S,
    target: DateTime<Utc>,
) -> Result<u64, PoolError> {
    let interval = i64::try_from(BLOCK_INTERVAL.as_secs()).unwrap_or(3);

    let head_num = source.head_block_number().await?;
    let head_block = source.get_block(head_num).await?;
    let head_time = parse_hive_timestamp(&head_block.timestamp);

    let time_diff_secs = (head_time - target).num_seconds();
    let mut block_number = i64::try_from(head_num).unwrap_or(i64::MAX) - floor_div(time_diff_secs, interval);
    if block_number < 1 {
        block_number = 1;
    }
    if block_number > i64::try_from(head_num).unwrap_or(i64::MAX) {
        block_number = i64::try_from(head_num).unwrap_or(i64::MAX);
    }

    let mut last_diff = 10i64;
    let mut second_last_diff = 10i64;
    let mut diff = 10i64;

    while diff > interval || diff < -interval {
        let block = source.get_block(block_number as u64).await?;
        let block_time = parse_hive_timestamp(&block.timestamp);

        second_last_diff = last_diff;
        last_diff = diff;
        diff = (target - block_time).num_seconds();

        if second_last_diff == diff && second_last_diff < 10 {
            return Ok(block_number as u64);
        }

        let mut delta = floor_div(diff, interval);
        if delta == 0 && diff < 0 {
            delta = -1;
        } else if delta == 0 && diff > 0 {
            delta = 1;
        }
        block_number += delta;

        if block_number < 1 || block_number > i64::try_from(head_num).unwrap_or(i64::MAX) {
            break;
        }
    }

    let _ = last_diff;
    Ok(block_number.max(1) as u64)
}

/// Which mode the watcher's cursor is currently operating in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    /// Replaying a bounded range of already-produced blocks.
    History,
    /// Following the chain head as new blocks arrive.
    Live,
}

/// Tracks the watcher's progress through the chain.
#[derive(Debug, Clone)]
pub struct BlockCursor {
    current: u64,
    end: Option<u64>,
    mode: CursorMode,
    stop_at: Option<DateTime<Utc>>,
}

impl BlockCursor {
    /// Start a history cursor from `start` up to (and including) `end`.
    #[must_use]
    pub fn history(start: u64, end: u64, stop_at: Option<DateTime<Utc>>) -> Self {
        Self {
            current: start,
            end: Some(end),
            mode: CursorMode::History,
            stop_at,
        }
    }

    /// Start a live cursor at `start`, with no fixed end.
    #[must_use]
    pub fn live(start: u64) -> Self {
        Self {
            current: start,
            end: None,
            mode: CursorMode::Live,
            stop_at: None,
        }
    }

    /// The next block number to process.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Which mode the cursor is in.
    #[must_use]
    pub fn mode(&self) -> CursorMode {
        self.mode
    }

    /// Advance the cursor past a fully-processed block. Transitions from
    /// history to live once `end` is passed.
    pub fn advance(&mut self) {
        self.current += 1;
        if let (CursorMode::History, Some(end)) = (self.mode, self.end) {
            if self.current > end {
                self.mode = CursorMode::Live;
                self.end = None;
            }
        }
    }

    /// Whether history replay has reached its end block (still in
    /// history mode, about to process the last one).
    #[must_use]
    pub fn is_history_exhausted(&self) -> bool {
        matches!((self.mode, self.end), (CursorMode::History, Some(end)) if self.current > end)
    }

    /// Whether `timestamp` is at or past the configured stop point.
    #[must_use]
    pub fn past_stop_at(&self, timestamp: DateTime<Utc>) -> bool {
        self.stop_at.is_some_and(|stop| timestamp >= stop)
    }
}
