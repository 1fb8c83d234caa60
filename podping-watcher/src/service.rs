//! `WatcherService`: owns the node pool, allow-list provider, operation
//! filter, and sink dispatcher, and drives history-then-live block
//! tailing until shutdown (spec §4.7-§4.9).
//!
//! Grounded on `ghostnet-indexer/src/main.rs` + `ghost-fleet/src/service.rs`'s
//! shared `*Service::new()`/`run()` shape: an orchestrator that builds its
//! subsystems in `new()` and drives them to completion in `run()`,
//! observing a shutdown signal rather than threading it through every
//! call site.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hive_rpc::NodePool;
use podping_core::cursor::estimate_block_num;
use podping_core::{AllowList, BlockCursor, Clock, OperationFilter, SystemClock};
use tokio::sync::{watch, Mutex};
use tracing::info;

use crate::allowlist_provider::AllowListProvider;
use crate::config::Settings;
use crate::error::WatcherError;
use crate::pipeline::Pipeline;
use crate::sinks::{Dispatcher, LineForwardSink, OutputMode, ReqRepForwardSink, UrlSink};

/// Which history-start flag selected the watcher's starting point
/// (spec §4.7/§6: `-b`, `-e`, `-o`, `-y`).
#[derive(Debug, Clone)]
pub enum HistoryStart {
    /// Explicit starting block number.
    Block(u64),
    /// Unix epoch seconds.
    Epoch(i64),
    /// An ISO-8601 timestamp.
    Date(DateTime<Utc>),
    /// Hours back from now.
    OldHours(i64),
}

/// Boot-time parameters not covered by [`Settings`] (CLI flags).
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Whether to target the Hive testnet.
    pub use_test_node: bool,
    /// Watch the livetest id/pattern instead of production.
    pub livetest: bool,
    /// Admit startup-diagnostic operation ids.
    pub diagnostic: bool,
    /// Where to start history replay; `None` means live-only from head.
    pub history_start: Option<HistoryStart>,
    /// Stop after history replay instead of continuing into live mode.
    pub history_only: bool,
    /// Stop processing once a block's timestamp passes `now + this`.
    pub stop_after_hours: Option<i64>,
    /// stdout presentation mode.
    pub output_mode: OutputMode,
    /// `forward-line` target, if configured.
    pub line_forward: Option<(String, u16)>,
    /// `forward-reqrep` target, if configured.
    pub reqrep_forward: Option<(String, u16)>,
    /// Status-report cadence in minutes; `0` disables it.
    pub report_minutes: u64,
}

/// Orchestrates the watcher's block-tailing loop and sinks.
pub struct WatcherService {
    pool: Arc<NodePool>,
    settings: Settings,
    params: RunParams,
}

impl WatcherService {
    /// Construct the service: builds the node pool, but does not yet
    /// touch the chain or bind any sink.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError`] if the node pool fails to construct.
    pub fn new(settings: &Settings, params: RunParams) -> Result<Self, WatcherError> {
        let endpoints = settings.node.active_endpoints(params.use_test_node);
        let pool = NodePool::with_config(endpoints, settings.node.pool_config())
            .map_err(|e| WatcherError::Config(crate::error::ConfigError::Validation(vec![e.to_string()])))?;

        Ok(Self {
            pool: Arc::new(pool),
            settings: settings.clone(),
            params,
        })
    }

    fn build_forward_sinks(&self) -> Result<Vec<Box<dyn UrlSink>>, WatcherError> {
        let mut sinks: Vec<Box<dyn UrlSink>> = Vec::new();
        if let Some((host, port)) = &self.params.line_forward {
            sinks.push(Box::new(LineForwardSink::new(host.clone(), *port)));
        }
        if let Some((host, port)) = &self.params.reqrep_forward {
            sinks.push(Box::new(ReqRepForwardSink::connect(host, *port)?));
        }
        Ok(sinks)
    }

    /// Resolve the configured history start into a concrete block
    /// number, using the bisection estimator for any timestamp-based
    /// flag (spec §4.7).
    async fn resolve_start_block(&self, start: &HistoryStart, clock: &dyn Clock) -> Result<u64, WatcherError> {
        let target = match start {
            HistoryStart::Block(n) => return Ok(*n),
            HistoryStart::Epoch(secs) => DateTime::from_timestamp(*secs, 0).unwrap_or_else(Utc::now),
            HistoryStart::Date(d) => *d,
            HistoryStart::OldHours(hours) => clock.now() - chrono::Duration::hours(*hours),
        };
        Ok(estimate_block_num(self.pool.as_ref(), target).await?)
    }

    /// Run the watcher until `shutdown` fires: resolve the starting
    /// point, replay history if configured, then tail the chain live
    /// unless `history_only` was set.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError`] if the node pool is exhausted, a forward
    /// sink fails to bind, or history replay exhausts its retries.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), WatcherError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

        let allowlist_provider = AllowListProvider::new(
            Arc::clone(&self.pool),
            Arc::clone(&clock),
            self.settings.allowlist.control_account.clone(),
            self.settings.allowlist.refresh_interval(),
        );
        let allowlist = Mutex::new(allowlist_provider);

        let filter = OperationFilter::new(
            self.params.livetest,
            self.params.diagnostic,
            self.params.output_mode == OutputMode::Json,
        );
        let pipeline = Pipeline::new(Arc::clone(&self.pool), filter, self.settings.filter.enforce_allowlist, Arc::clone(&clock));

        let forwards = self.build_forward_sinks()?;
        let report_interval = chrono::Duration::minutes(i64::try_from(self.params.report_minutes).unwrap_or(0));
        let mut dispatcher = Dispatcher::new(self.params.output_mode, forwards, report_interval, Arc::clone(&clock));

        let head = self.pool.head_block_number().await?;
        info!(head, "watcher resolved chain head");

        let mut cursor = match &self.params.history_start {
            None => BlockCursor::live(head + 1),
            Some(start) => {
                let start_block = self.resolve_start_block(start, clock.as_ref()).await?;
                let stop_at = self
                    .params
                    .stop_after_hours
                    .map(|hours| clock.now() + chrono::Duration::hours(hours));
                info!(start_block, head, "watcher starting history replay");
                BlockCursor::history(start_block, head, stop_at)
            }
        };

        if self.params.history_start.is_some() {
            pipeline
                .run_history(&mut cursor, head, &allowlist, shutdown.clone(), &mut dispatcher)
                .await?;
        }

        if self.params.history_only {
            info!("history-only mode, stopping without entering live tail");
            return Ok(());
        }

        if cursor.mode() != podping_core::CursorMode::Live {
            cursor = BlockCursor::live(cursor.current());
        }

        pipeline.run_live(&mut cursor, &allowlist, shutdown, &mut dispatcher).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        Settings::load(None).expect("load failed")
    }

    fn test_params() -> RunParams {
        RunParams {
            use_test_node: true,
            livetest: false,
            diagnostic: false,
            history_start: None,
            history_only: false,
            stop_after_hours: None,
            output_mode: OutputMode::Default,
            line_forward: None,
            reqrep_forward: None,
            report_minutes: 5,
        }
    }

    #[test]
    fn service_construction_succeeds_with_valid_endpoints() {
        let settings = test_settings();
        let service = WatcherService::new(&settings, test_params());
        assert!(service.is_ok());
    }

    #[test]
    fn build_forward_sinks_empty_when_unconfigured() {
        let settings = test_settings();
        let service = WatcherService::new(&settings, test_params()).expect("construction failed");
        let sinks = service.build_forward_sinks().expect("build failed");
        assert!(sinks.is_empty());
    }

    #[test]
    fn build_forward_sinks_includes_configured_line_sink() {
        let settings = test_settings();
        let mut params = test_params();
        params.line_forward = Some(("127.0.0.1".to_string(), 9999));
        let service = WatcherService::new(&settings, params).expect("construction failed");
        let sinks = service.build_forward_sinks().expect("build failed");
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].name(), "forward-line");
    }
}
