//! Podping Watcher - block-tail, filter, and fan-out daemon
//!
//! Tails the Hive blockchain head (and optionally a historical range
//! first), filters `custom_json` operations belonging to the podping
//! namespace, normalizes their payload, and re-emits the extracted URLs
//! over stdout and/or forwarding sockets.
//!
//! # Usage
//!
//! ```bash
//! # Live tail, default stdout format
//! podping-watcher
//!
//! # Replay from block 12345678, then continue live
//! podping-watcher -b 12345678
//!
//! # History only, JSON output
//! podping-watcher -b 12345678 -H -j
//! ```

use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::{error, warn};

mod allowlist_provider;
mod config;
mod error;
mod pipeline;
mod service;
mod sinks;

use config::Settings;
use error::WatcherError;
use service::{HistoryStart, RunParams, WatcherService};
use sinks::OutputMode;

/// Podping Watcher - tail, filter, and forward feed-update notifications.
#[derive(Parser, Debug)]
#[command(name = "podping-watcher")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML settings file (falls back to `podping-watcher.toml`
    /// in the working directory if unset).
    #[arg(short = 'c', long, env = "PODPING_WATCHER_CONFIG")]
    config: Option<String>,

    /// Start history replay at this block number.
    #[arg(short = 'b', long = "block", value_name = "BLOCK_NUM")]
    block_num: Option<u64>,

    /// Start history replay at this Unix epoch timestamp.
    #[arg(short = 'e', long = "epoch", value_name = "SECONDS")]
    epoch: Option<i64>,

    /// Start history replay this many hours before now.
    #[arg(short = 'o', long = "old", value_name = "HOURS")]
    old_hours: Option<i64>,

    /// Start history replay at this ISO-8601 timestamp.
    #[arg(short = 'y', long = "start-date", value_name = "ISO8601")]
    start_date: Option<String>,

    /// Stop processing once a block's timestamp passes `now + HOURS`.
    #[arg(short = 'a', long = "stop-after", value_name = "HOURS")]
    stop_after_hours: Option<i64>,

    /// Stop after history replay instead of continuing into live mode.
    #[arg(short = 'H', long)]
    history_only: bool,

    /// Admit startup-diagnostic operation ids (`podping-startup`, `pp_startup`).
    #[arg(short = 'd', long)]
    diagnostic: bool,

    /// Emit bare URLs on stdout instead of structured log lines.
    #[arg(short = 'u', long = "urls")]
    urls_only: bool,

    /// Emit one JSON object per line on stdout.
    #[arg(short = 'j', long)]
    json: bool,

    /// Status-report cadence in minutes (0 disables; spec §4.9).
    #[arg(short = 'r', long = "report", value_name = "MINUTES", default_value_t = 0)]
    report_minutes: u64,

    /// Forward each URL to a TCP line socket at `host:port`.
    #[arg(short = 's', long = "socket", value_name = "HOST:PORT")]
    line_forward: Option<String>,

    /// Forward each URL to a ZeroMQ req/rep socket at `host:port`.
    #[arg(short = 'z', long = "zsocket", value_name = "HOST:PORT")]
    reqrep_forward: Option<String>,

    /// Use the Hive testnet instead of production endpoints.
    #[arg(short = 't', long)]
    testnet: bool,

    /// Watch the `podping-livetest` id/pattern instead of production.
    #[arg(short = 'l', long)]
    livetest: bool,

    /// Quiet: only warnings and errors.
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Verbose: debug-level logging.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Emit JSON-formatted log lines (distinct from `-j`, which governs
    /// the watcher's own stdout sink, not its diagnostic logging).
    #[arg(long, env = "PODPING_WATCHER_JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(log_level(&args), args.json_logs) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "watcher exiting with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), WatcherError> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting podping-watcher");

    let settings = Settings::load(args.config.as_deref())?;
    settings.validate().map_err(|errors| error::ConfigError::Validation(errors))?;

    let history_start = parse_history_start(&args)?;
    let output_mode = match (args.json, args.urls_only) {
        (true, _) => OutputMode::Json,
        (false, true) => OutputMode::Urls,
        (false, false) => OutputMode::Default,
    };

    let line_forward = args.line_forward.as_deref().map(parse_host_port).transpose()?;
    let reqrep_forward = args.reqrep_forward.as_deref().map(parse_host_port).transpose()?;

    let params = RunParams {
        use_test_node: args.testnet || env_flag("USE_TEST_NODE"),
        livetest: args.livetest,
        diagnostic: args.diagnostic,
        history_start,
        history_only: args.history_only,
        stop_after_hours: args.stop_after_hours,
        output_mode,
        line_forward,
        reqrep_forward,
        report_minutes: args.report_minutes,
    };

    let service = WatcherService::new(&settings, params)?;
    let shutdown = setup_shutdown_handler();

    tokio::select! {
        result = service.run(shutdown.1) => {
            result?;
        }
        () = shutdown.0 => {
            warn!("shutdown signal received");
        }
    }

    tracing::info!("podping-watcher stopped");
    Ok(())
}

/// Resolve the mutually-exclusive history-start flags (spec §6) into a
/// single [`HistoryStart`], or `None` for live-only from head.
fn parse_history_start(args: &Args) -> Result<Option<HistoryStart>, WatcherError> {
    let given = [
        args.block_num.is_some(),
        args.epoch.is_some(),
        args.old_hours.is_some(),
        args.start_date.is_some(),
    ]
    .into_iter()
    .filter(|&b| b)
    .count();

    if given > 1 {
        return Err(WatcherError::InvalidArgs(
            "only one of --block, --epoch, --old, or --start-date may be given".to_string(),
        ));
    }

    if let Some(n) = args.block_num {
        return Ok(Some(HistoryStart::Block(n)));
    }
    if let Some(secs) = args.epoch {
        return Ok(Some(HistoryStart::Epoch(secs)));
    }
    if let Some(hours) = args.old_hours {
        return Ok(Some(HistoryStart::OldHours(hours)));
    }
    if let Some(date) = &args.start_date {
        let parsed = DateTime::parse_from_rfc3339(date)
            .map_err(|e| WatcherError::InvalidArgs(format!("invalid --start-date {date:?}: {e}")))?
            .with_timezone(&Utc);
        return Ok(Some(HistoryStart::Date(parsed)));
    }
    Ok(None)
}

/// Parse a `host:port` forwarding target.
fn parse_host_port(s: &str) -> Result<(String, u16), WatcherError> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| WatcherError::InvalidArgs(format!("expected host:port, got {s:?}")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| WatcherError::InvalidArgs(format!("invalid port in {s:?}")))?;
    Ok((host.to_string(), port))
}

fn log_level(args: &Args) -> &'static str {
    if args.quiet {
        "warn"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
}

fn init_logging(level: &str, json: bool) -> Result<(), WatcherError> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let init_result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
    };

    init_result.map_err(|e| WatcherError::Sink(format!("failed to init logging: {e}")))
}

/// Sets up a `tokio::sync::watch` shutdown signal fired by Ctrl+C or
/// SIGTERM, plus a future that resolves once either fires (for the
/// top-level `tokio::select!`).
fn setup_shutdown_handler() -> (impl std::future::Future<Output = ()>, tokio::sync::watch::Receiver<bool>) {
    let (tx, rx) = tokio::sync::watch::channel(false);

    let signal_future = async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to install Ctrl+C handler");
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => error!(error = %e, "failed to install SIGTERM handler"),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {}
            () = terminate => {}
        }
        let _ = tx.send(true);
    };

    (signal_future, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            config: None,
            block_num: None,
            epoch: None,
            old_hours: None,
            start_date: None,
            stop_after_hours: None,
            history_only: false,
            diagnostic: false,
            urls_only: false,
            json: false,
            report_minutes: 0,
            line_forward: None,
            reqrep_forward: None,
            testnet: false,
            livetest: false,
            quiet: false,
            verbose: false,
            json_logs: false,
        }
    }

    #[test]
    fn log_level_prefers_quiet_over_verbose() {
        let mut args = base_args();
        args.quiet = true;
        args.verbose = true;
        assert_eq!(log_level(&args), "warn");
    }

    #[test]
    fn parse_history_start_defaults_to_none() {
        let args = base_args();
        assert!(parse_history_start(&args).expect("should parse").is_none());
    }

    #[test]
    fn parse_history_start_rejects_conflicting_flags() {
        let mut args = base_args();
        args.block_num = Some(100);
        args.old_hours = Some(2);
        assert!(parse_history_start(&args).is_err());
    }

    #[test]
    fn parse_history_start_accepts_block_flag() {
        let mut args = base_args();
        args.block_num = Some(42);
        match parse_history_start(&args).expect("should parse") {
            Some(HistoryStart::Block(n)) => assert_eq!(n, 42),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn parse_host_port_splits_on_last_colon() {
        let (host, port) = parse_host_port("127.0.0.1:9999").expect("should parse");
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 9999);
    }

    #[test]
    fn parse_host_port_rejects_missing_colon() {
        assert!(parse_host_port("not-a-target").is_err());
    }

    #[test]
    fn output_mode_prefers_json_over_urls_only() {
        let mut args = base_args();
        args.json = true;
        args.urls_only = true;
        let mode = match (args.json, args.urls_only) {
            (true, _) => OutputMode::Json,
            (false, true) => OutputMode::Urls,
            (false, false) => OutputMode::Default,
        };
        assert_eq!(mode, OutputMode::Json);
    }
}
