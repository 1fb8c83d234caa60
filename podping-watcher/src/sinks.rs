//! Watcher sinks (spec §4.9): stdout presentation (json/urls/default),
//! optional downstream forward sockets, and the periodic status report.
//!
//! Grounded on `ghostnet-indexer/src/ports/streaming.rs`'s
//! `EventPublisher` port-plus-mocks pattern, adapted from an
//! event-streaming port to a fan-out URL-forwarding port. The forward
//! sinks are genuinely pluggable (`Box<dyn UrlSink>`); stdout
//! presentation is a format choice, not a capability, so it stays a
//! plain enum.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use podping_core::NormalizedRecord;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::error::WatcherError;

/// A downstream target a URL can be forwarded to, independent of stdout
/// presentation (spec §4.9: `forward-line`, `forward-reqrep`).
#[async_trait]
pub trait UrlSink: Send + Sync {
    /// Forward a single URL. Failures are logged by the caller and do
    /// not stop the pipeline (spec §7: "Sink" error kind).
    async fn send(&self, url: &str) -> Result<(), WatcherError>;

    /// A short name for logging which sink dropped a URL.
    fn name(&self) -> &'static str;
}

/// `forward-line`: for each URL, open a fresh TCP connection, write the
/// URL bytes, and close (spec §4.9/§6).
#[derive(Debug, Clone)]
pub struct LineForwardSink {
    host: String,
    port: u16,
}

impl LineForwardSink {
    /// Build a sink targeting `host:port`. No connection is made until
    /// the first [`UrlSink::send`] call.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

#[async_trait]
impl UrlSink for LineForwardSink {
    async fn send(&self, url: &str) -> Result<(), WatcherError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| WatcherError::Sink(e.to_string()))?;
        stream
            .write_all(url.as_bytes())
            .await
            .map_err(|e| WatcherError::Sink(e.to_string()))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "forward-line"
    }
}

/// `forward-reqrep`: send the URL on a ZeroMQ REQ socket and block for
/// the acknowledgement reply (spec §4.9/§6). `zmq::Socket` is blocking
/// and `!Sync`, so sends run on a blocking task behind a `Mutex`.
pub struct ReqRepForwardSink {
    socket: Arc<Mutex<zmq::Socket>>,
}

impl std::fmt::Debug for ReqRepForwardSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqRepForwardSink").finish_non_exhaustive()
    }
}

impl ReqRepForwardSink {
    /// Connect a REQ socket to `host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::Sink`] if the socket cannot be created or
    /// connected.
    pub fn connect(host: &str, port: u16) -> Result<Self, WatcherError> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::REQ).map_err(|e| WatcherError::Sink(e.to_string()))?;
        socket
            .connect(&format!("tcp://{host}:{port}"))
            .map_err(|e| WatcherError::Sink(e.to_string()))?;
        Ok(Self { socket: Arc::new(Mutex::new(socket)) })
    }
}

#[async_trait]
impl UrlSink for ReqRepForwardSink {
    async fn send(&self, url: &str) -> Result<(), WatcherError> {
        let socket = Arc::clone(&self.socket);
        let url = url.to_string();
        tokio::task::spawn_blocking(move || {
            let socket = socket.lock().unwrap_or_else(PoisonError::into_inner);
            socket.send(&url, 0).map_err(|e| WatcherError::Sink(e.to_string()))?;
            match socket.recv_string(0) {
                Ok(Ok(_reply)) => Ok(()),
                Ok(Err(_)) => Err(WatcherError::Sink("non-UTF8 acknowledgement".to_string())),
                Err(e) => Err(WatcherError::Sink(e.to_string())),
            }
        })
        .await
        .map_err(|e| WatcherError::Sink(e.to_string()))?
    }

    fn name(&self) -> &'static str {
        "forward-reqrep"
    }
}

/// Which stdout presentation the watcher is configured to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// One JSON object per line.
    Json,
    /// One bare URL per line.
    Urls,
    /// A structured log line per URL (default).
    #[default]
    Default,
}

/// Serializable shape of a [`NormalizedRecord`] for `stdout-json`
/// output (spec §4.9).
#[derive(Debug, serde::Serialize)]
struct JsonRecord<'a> {
    url: &'a str,
    block_num: u64,
    trx_id: &'a str,
    timestamp: &'a str,
    medium_reason: &'a str,
    required_posting_auths: &'a [String],
    #[serde(rename = "hiveTxId", skip_serializing_if = "Option::is_none")]
    hive_tx_id: Option<&'a str>,
    #[serde(rename = "hiveBlockNum", skip_serializing_if = "Option::is_none")]
    hive_block_num: Option<u64>,
}

/// Write one line per URL in `record` to stdout, per `mode`.
pub fn emit_stdout(mode: OutputMode, record: &NormalizedRecord) {
    for url in &record.urls {
        match mode {
            OutputMode::Urls => println!("{url}"),
            OutputMode::Json => {
                let json_record = JsonRecord {
                    url,
                    block_num: record.block_num,
                    trx_id: &record.trx_id,
                    timestamp: &record.timestamp,
                    medium_reason: &record.medium_reason,
                    required_posting_auths: &record.required_posting_auths,
                    hive_tx_id: record.hive_annotation.as_ref().map(|(tx, _)| tx.as_str()),
                    hive_block_num: record.hive_annotation.as_ref().map(|(_, num)| *num),
                };
                match serde_json::to_string(&json_record) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "failed to serialize watcher record"),
                }
            }
            OutputMode::Default => {
                info!(
                    timestamp = %record.timestamp,
                    trx_id = %record.trx_id,
                    url = %url,
                    required_posting_auths = ?record.required_posting_auths,
                    medium_reason = %record.medium_reason,
                    "Feed Updated"
                );
            }
        }
    }
}

/// Forward every URL in `record` to each configured forward sink,
/// logging and continuing past individual failures (spec §7: "Sink"
/// error kind never stops the pipeline).
pub async fn forward(sinks: &[Box<dyn UrlSink>], record: &NormalizedRecord) {
    for url in &record.urls {
        for sink in sinks {
            if let Err(e) = sink.send(url).await {
                warn!(sink = sink.name(), url = %url, error = %e, "dropping forward, sink failed");
            }
        }
    }
}

/// Accumulated counters for the periodic `status-report` sink (spec
/// §4.9): podpings and total ops seen since the last report, plus a
/// running lifetime total.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    window_podpings: u64,
    lifetime_podpings: u64,
    window_ops: u64,
    window_started_at: Option<DateTime<Utc>>,
}

impl StatusReport {
    /// A fresh, zeroed report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observed (non-podping) operation.
    pub fn record_op(&mut self) {
        self.window_ops += 1;
    }

    /// Record `count` podpings (URLs) emitted from one operation.
    pub fn record_podpings(&mut self, count: u64) {
        self.window_podpings += count;
        self.lifetime_podpings += count;
        self.window_ops += 1;
    }

    /// Whether a report is due given `now`, the window start, and the
    /// configured cadence. A cadence of zero disables reporting (spec
    /// §4.9: "0 disables").
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>, interval: chrono::Duration) -> bool {
        if interval.is_zero() {
            return false;
        }
        match self.window_started_at {
            None => true,
            Some(start) => now - start >= interval,
        }
    }

    /// Log the aggregated status line and reset the window counters.
    /// `current_block` and `lag` annotate the chain position at report
    /// time.
    pub fn emit(&mut self, now: DateTime<Utc>, current_block: u64, lag: chrono::Duration) {
        info!(
            podpings_in_window = self.window_podpings,
            lifetime_podpings = self.lifetime_podpings,
            ops_in_window = self.window_ops,
            current_block,
            lag_secs = lag.num_seconds(),
            "status report"
        );
        self.window_podpings = 0;
        self.window_ops = 0;
        self.window_started_at = Some(now);
    }

    /// Start (or restart) the report window at `now` without emitting.
    pub fn start_window(&mut self, now: DateTime<Utc>) {
        if self.window_started_at.is_none() {
            self.window_started_at = Some(now);
        }
    }
}

/// Fans a [`crate::pipeline::BlockOutcome`] out to stdout, the forward
/// sinks, and the periodic status report in one place, so the
/// block-tailing loop in `pipeline.rs` stays free of sink vocabulary.
pub struct Dispatcher {
    output_mode: OutputMode,
    forwards: Vec<Box<dyn UrlSink>>,
    report: StatusReport,
    report_interval: chrono::Duration,
    clock: Arc<dyn podping_core::Clock>,
}

impl Dispatcher {
    /// Build a dispatcher. `report_interval` of zero disables the
    /// status-report sink (spec §4.9).
    #[must_use]
    pub fn new(
        output_mode: OutputMode,
        forwards: Vec<Box<dyn UrlSink>>,
        report_interval: chrono::Duration,
        clock: Arc<dyn podping_core::Clock>,
    ) -> Self {
        Self {
            output_mode,
            forwards,
            report: StatusReport::new(),
            report_interval,
            clock,
        }
    }

    /// Emit every record in `outcome` to stdout and the forward sinks,
    /// update the status-report counters, and emit a report line if one
    /// is due.
    pub async fn dispatch(&mut self, outcome: &crate::pipeline::BlockOutcome) {
        for record in &outcome.records {
            emit_stdout(self.output_mode, record);
            forward(&self.forwards, record).await;
            self.report.record_podpings(u64::try_from(record.urls.len()).unwrap_or(u64::MAX));
        }

        let non_podping_ops = outcome.ops_seen.saturating_sub(outcome.records.len());
        for _ in 0..non_podping_ops {
            self.report.record_op();
        }

        let now = self.clock.now();
        self.report.start_window(now);
        if self.report.is_due(now, self.report_interval) {
            let lag = now - outcome.block_time;
            self.report.emit(now, outcome.block_num, lag);
        }
    }
}

#[cfg(test)]
pub mod mocks {
    //! Test doubles for [`super::UrlSink`].

    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::WatcherError;

    use super::UrlSink;

    /// Records every URL handed to it; never fails.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        received: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        /// A fresh, empty recorder.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// URLs received so far, in order.
        #[must_use]
        pub fn received(&self) -> Vec<String> {
            self.received.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
        }
    }

    #[async_trait]
    impl UrlSink for RecordingSink {
        async fn send(&self, url: &str) -> Result<(), WatcherError> {
            self.received
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(url.to_string());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "mock-recording"
        }
    }

    #[async_trait]
    impl UrlSink for std::sync::Arc<RecordingSink> {
        async fn send(&self, url: &str) -> Result<(), WatcherError> {
            RecordingSink::send(self, url).await
        }

        fn name(&self) -> &'static str {
            "mock-recording"
        }
    }

    /// Always fails, for exercising the "sink error, drop and continue"
    /// path.
    #[derive(Debug, Default)]
    pub struct FailingSink;

    #[async_trait]
    impl UrlSink for FailingSink {
        async fn send(&self, _url: &str) -> Result<(), WatcherError> {
            Err(WatcherError::Sink("mock failure".to_string()))
        }

        fn name(&self) -> &'static str {
            "mock-failing"
        }
    }
}
