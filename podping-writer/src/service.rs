//! `WriterService`: owns the ingest/batcher/publisher workers plus the
//! startup prober, grounded on `ghost-fleet/src/service.rs`'s
//! `FleetService::new()`/`run()` shape (owned subsystems constructed by
//! private factory methods, `#[instrument]`, shutdown observed by
//! `run()` rather than threaded through every call).

use std::sync::Arc;

use hive_rpc::signing::{PostingKey, Signer};
use hive_rpc::NodePool;
use podping_core::constants::{OPERATION_ID_LIVETEST, OPERATION_ID_PRODUCTION};
use podping_core::{AllowList, Batch, SystemClock};
use tokio::sync::{mpsc, watch};
use tracing::{info, instrument};

use crate::batcher::{self, HaltTheQueue};
use crate::config::Settings;
use crate::error::WriterError;
use crate::ingest;
use crate::prober;
use crate::publisher;

/// Which ingest transport the writer is configured to use.
#[derive(Debug, Clone)]
pub enum IngestMode {
    /// TCP line socket on the given port.
    LineSocket(u16),
    /// ZeroMQ req/rep socket on the given port.
    ReqRepSocket(u16),
    /// A single URL supplied at startup; no worker tasks start.
    OneShot(String),
}

/// Boot-time parameters not covered by [`Settings`] (credentials, CLI
/// flags).
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Hive account name publishing on behalf of clients.
    pub server_account: String,
    /// WIF-encoded posting key.
    pub posting_key: String,
    /// Whether to target the Hive testnet.
    pub use_test_node: bool,
    /// Whether to publish under the livetest operation id.
    pub livetest: bool,
    /// Fault-injection percentage (spec §4.5/§10.6).
    pub fault_injection_percent: u8,
    /// Ignore startup-probe authorization failures (only honored when
    /// combined with `use_test_node`, spec §4.6).
    pub ignore_errors: bool,
    /// Which ingest transport to run.
    pub ingest_mode: IngestMode,
}

/// Orchestrates the writer's cooperating workers.
pub struct WriterService {
    pool: Arc<NodePool>,
    signer: Arc<Signer>,
    params: RunParams,
}

impl WriterService {
    /// Construct the service: builds the node pool and signer, but does
    /// not yet run the startup probe or any worker task.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError`] if the node pool or posting key fail to
    /// construct.
    pub fn new(settings: &Settings, params: RunParams) -> Result<Self, WriterError> {
        let endpoints = settings.node.active_endpoints(params.use_test_node);
        let pool = NodePool::with_config(endpoints, settings.node.pool_config())
            .map_err(|e| WriterError::Config(crate::error::ConfigError::Validation(vec![e.to_string()])))?;

        let key = PostingKey::from_wif(&params.posting_key)
            .map_err(|e| WriterError::Authorization(format!("invalid posting key: {e}")))?;

        Ok(Self {
            pool: Arc::new(pool),
            signer: Arc::new(Signer::new(key)),
            params,
        })
    }

    fn operation_id(&self) -> &'static str {
        if self.params.livetest { OPERATION_ID_LIVETEST } else { OPERATION_ID_PRODUCTION }
    }

    /// Run the one-shot path: publish a single URL and return its
    /// outcome, without starting any long-lived worker.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError`] on publish failure.
    #[instrument(skip(self))]
    pub async fn run_one_shot(&self, url: &str) -> Result<String, WriterError> {
        let halt = HaltTheQueue::new();
        let mut batch = Batch::new();
        batch.push(url.to_string(), chrono::Utc::now());
        publisher::publish_with_retry(
            &batch,
            &self.pool,
            &self.signer,
            &self.params.server_account,
            self.operation_id(),
            self.params.fault_injection_percent,
            &halt,
        )
        .await
    }

    /// Run the long-lived writer: startup probe, then the
    /// ingest/batcher/publisher workers until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns [`WriterError`] if the startup probe fails, or if any
    /// worker task exits with an error.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), WriterError> {
        let halt = HaltTheQueue::new();
        let allow_list = AllowList::empty();

        prober::run(
            &self.pool,
            &self.signer,
            &self.params.server_account,
            &allow_list,
            false,
            self.params.ignore_errors && self.params.use_test_node,
            &halt,
        )
        .await?;

        let (url_tx, url_rx) = mpsc::channel::<String>(1024);
        let (batch_tx, batch_rx) = mpsc::channel::<Batch>(64);

        let clock = Arc::new(SystemClock::new());
        let batcher_halt = Arc::clone(&halt);
        let batcher_handle = tokio::spawn(batcher::run(url_rx, batch_tx, batcher_halt, clock));

        let publisher_pool = Arc::clone(&self.pool);
        let publisher_signer = Arc::clone(&self.signer);
        let server_account = self.params.server_account.clone();
        let operation_id = self.operation_id();
        let fault_injection_percent = self.params.fault_injection_percent;
        let publisher_halt = Arc::clone(&halt);
        let publisher_handle = tokio::spawn(async move {
            publisher::run(
                batch_rx,
                publisher_pool,
                publisher_signer,
                server_account,
                operation_id,
                fault_injection_percent,
                publisher_halt,
            )
            .await
        });

        let ingest_shutdown = shutdown.clone();
        let ingest_handle = match self.params.ingest_mode.clone() {
            IngestMode::LineSocket(port) => {
                let url_tx = url_tx.clone();
                Some(tokio::spawn(async move {
                    ingest::run_line_socket("0.0.0.0", port, url_tx, ingest_shutdown)
                        .await
                        .map_err(|e| WriterError::Ingest(e.to_string()))
                }))
            }
            IngestMode::ReqRepSocket(port) => {
                let url_tx = url_tx.clone();
                Some(tokio::spawn(async move {
                    ingest::run_reqrep_socket("0.0.0.0", port, url_tx, ingest_shutdown)
                        .await
                        .map_err(|e| WriterError::Ingest(e.to_string()))
                }))
            }
            IngestMode::OneShot(_) => None,
        };
        drop(url_tx);

        info!("writer service running");
        let _ = shutdown.changed().await;
        info!("shutdown requested, waiting for workers to drain");

        if let Some(handle) = ingest_handle {
            let _ = handle.await;
        }
        batcher_handle.await.map_err(|e| WriterError::Ingest(e.to_string()))??;
        publisher_handle.await.map_err(|e| WriterError::Ingest(e.to_string()))??;
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
            server_account: "alice".to_string(),
            posting_key: "5JNHfZYKGaomSFvd4NUdQ9qMcEAC43kujbfjueTHpVapX1Kzq2n".to_string(),
            use_test_node: true,
            livetest: false,
            fault_injection_percent: 0,
            ignore_errors: true,
            ingest_mode: IngestMode::OneShot("https://a.example/f.xml".to_string()),
        }
    }

    #[test]
    fn service_construction_accepts_valid_key() {
        let settings = test_settings();
        let service = WriterService::new(&settings, test_params());
        assert!(service.is_ok());
    }

    #[test]
    fn operation_id_selects_production_by_default() {
        let settings = test_settings();
        let service = WriterService::new(&settings, test_params()).expect("construction failed");
        assert_eq!(service.operation_id(), OPERATION_ID_PRODUCTION);
    }

    #[test]
    fn operation_id_selects_livetest_when_configured() {
        let settings = test_settings();
        let mut params = test_params();
        params.livetest = true;
        let service = WriterService::new(&settings, params).expect("construction failed");
        assert_eq!(service.operation_id(), OPERATION_ID_LIVETEST);
    }
}
