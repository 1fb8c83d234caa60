//! Podping Writer - URL ingest, batch, and publish daemon
//!
//! Accepts feed-update URLs from one of three mutually exclusive ingest
//! transports, batches them under a time/byte/count budget, and publishes
//! each sealed batch as a signed `custom_json` operation on Hive.
//!
//! # Usage
//!
//! ```bash
//! # Line-socket ingest
//! podping-writer -s 9999
//!
//! # Req/rep-socket ingest
//! podping-writer -z 9999
//!
//! # One-shot publish
//! podping-writer -u https://example.com/feed.xml
//! ```

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

mod batcher;
mod config;
mod error;
mod ingest;
mod prober;
mod publisher;
mod service;

use config::Settings;
use error::WriterError;
use service::{IngestMode, RunParams, WriterService};

/// Podping Writer - ingest, batch, and publish feed-update notifications.
#[derive(Parser, Debug)]
#[command(name = "podping-writer")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML settings file (falls back to `podping-writer.toml`
    /// in the working directory if unset).
    #[arg(short = 'c', long, env = "PODPING_WRITER_CONFIG")]
    config: Option<String>,

    /// Listen for URLs on a TCP line socket at this port.
    #[arg(short = 's', long = "socket", value_name = "PORT")]
    line_socket_port: Option<u16>,

    /// Listen for URLs on a ZeroMQ req/rep socket at this port.
    #[arg(short = 'z', long = "zsocket", value_name = "PORT")]
    reqrep_socket_port: Option<u16>,

    /// Publish a single URL and exit (skips the ingest/batcher pipeline).
    #[arg(short = 'u', long = "url")]
    url: Option<String>,

    /// Use the Hive testnet instead of production endpoints.
    #[arg(short = 't', long)]
    testnet: bool,

    /// Publish under the `podping-livetest` operation id.
    #[arg(short = 'l', long)]
    livetest: bool,

    /// Percentage chance of synthetic publish failure, for fault-injection
    /// testing (id `podping` only).
    #[arg(short = 'e', long = "errors", value_name = "PCT")]
    fault_injection_percent: Option<u8>,

    /// Quiet: only warnings and errors.
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Verbose: debug-level logging.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Emit JSON-formatted log lines.
    #[arg(long, env = "PODPING_WRITER_JSON_LOGS")]
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
            error!(error = %e, "writer exiting with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), WriterError> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting podping-writer");

    let settings = Settings::load(args.config.as_deref())?;
    settings.validate().map_err(|errors| error::ConfigError::Validation(errors))?;

    let server_account = std::env::var("HIVE_SERVER_ACCOUNT")
        .map_err(|_| WriterError::MissingEnv("HIVE_SERVER_ACCOUNT".to_string()))?;
    let posting_key = std::env::var("HIVE_POSTING_KEY")
        .map_err(|_| WriterError::MissingEnv("HIVE_POSTING_KEY".to_string()))?;
    let use_test_node = args.testnet || env_flag("USE_TEST_NODE");

    let ingest_mode = match (args.line_socket_port, args.reqrep_socket_port, &args.url) {
        (Some(port), None, None) => IngestMode::LineSocket(port),
        (None, Some(port), None) => IngestMode::ReqRepSocket(port),
        (None, None, Some(url)) => IngestMode::OneShot(url.clone()),
        _ => {
            return Err(WriterError::Config(error::ConfigError::Validation(vec![
                "exactly one of --socket, --zsocket, or --url must be given".to_string(),
            ])))
        }
    };

    let fault_injection_percent = args
        .fault_injection_percent
        .unwrap_or(settings.publisher.fault_injection_percent);

    let params = RunParams {
        server_account,
        posting_key,
        use_test_node,
        livetest: args.livetest,
        fault_injection_percent,
        ignore_errors: use_test_node,
        ingest_mode: ingest_mode.clone(),
    };

    let service = WriterService::new(&settings, params)?;

    if let IngestMode::OneShot(url) = ingest_mode {
        let trx_id = service.run_one_shot(&url).await?;
        info!(trx_id = %trx_id, "one-shot publish complete");
        return Ok(());
    }

    let shutdown = setup_shutdown_handler();
    tokio::select! {
        result = service.run(shutdown.1) => {
            result?;
        }
        () = shutdown.0 => {
            warn!("shutdown signal received");
        }
    }

    info!("podping-writer stopped");
    Ok(())
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

fn init_logging(level: &str, json: bool) -> Result<(), WriterError> {
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

    init_result.map_err(|e| WriterError::Ingest(format!("failed to init logging: {e}")))
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

    #[test]
    fn log_level_prefers_quiet_over_verbose() {
        let args = Args {
            config: None,
            line_socket_port: None,
            reqrep_socket_port: None,
            url: None,
            testnet: false,
            livetest: false,
            fault_injection_percent: None,
            quiet: true,
            verbose: true,
            json_logs: false,
        };
        assert_eq!(log_level(&args), "warn");
    }

    #[test]
    fn env_flag_rejects_falsey_values() {
        std::env::remove_var("PODPING_WRITER_TEST_FLAG_UNSET");
        assert!(!env_flag("PODPING_WRITER_TEST_FLAG_UNSET"));
    }
}
