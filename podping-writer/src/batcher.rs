//! URL batcher (spec §4.4): accumulates URLs off the ingest channel into
//! a [`podping_core::Batch`], sealing on whichever of time/byte/count
//! budget is hit first, then hands sealed batches to the publisher.
//!
//! Single-threaded by construction: one `tokio` task owns the
//! accumulating [`Batch`] exclusively, matching spec §5's "the batcher is
//! single-threaded; no more than one batch is being accumulated at any
//! time."

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use podping_core::constants::HIVE_OPERATION_PERIOD;
use podping_core::{Batch, Clock};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

/// Shared flag the publisher sets on resource-credit exhaustion and the
/// batcher observes to pause sealing (spec §4.5, §9: avoid a hidden
/// module-level singleton — this is an explicit, passed-by-argument
/// `Arc`).
#[derive(Debug, Default)]
pub struct HaltTheQueue(AtomicBool);

impl HaltTheQueue {
    /// A fresh, un-halted flag.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(false)))
    }

    /// Whether sealing is currently paused.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Set the halt flag.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clear the halt flag.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Run the batcher loop until the ingest channel closes (graceful
/// shutdown: spec §5 "batcher seals its current accumulation, even if
/// under-threshold").
///
/// # Errors
///
/// Returns an error if the publish channel closes unexpectedly.
#[instrument(skip_all)]
pub async fn run(
    mut url_rx: mpsc::Receiver<String>,
    batch_tx: mpsc::Sender<Batch>,
    halt: Arc<HaltTheQueue>,
    clock: Arc<dyn Clock>,
) -> Result<(), mpsc::error::SendError<Batch>> {
    let mut current = Batch::new();

    loop {
        let recv_timeout = if current.is_empty() {
            None
        } else {
            Some(HIVE_OPERATION_PERIOD)
        };

        let received = match recv_timeout {
            None => url_rx.recv().await,
            Some(window) => match timeout(window, url_rx.recv()).await {
                Ok(value) => value,
                Err(_) => None,
            },
        };

        match received {
            Some(url) => {
                if halt.is_set() {
                    debug!(url = %url, "HALT_THE_QUEUE set, dropping incoming URL");
                    continue;
                }
                current.push(url, clock.now());
            }
            None if url_rx.is_closed() => {
                // Ingest has stopped accepting: seal whatever is
                // accumulated, even under-threshold, and exit (spec §5).
                seal_and_send(&mut current, &batch_tx).await?;
                return Ok(());
            }
            None => {
                // Window elapsed with the channel still open; fall
                // through to the seal check below.
            }
        }

        if let Some(reason) = current.should_seal(clock.now()) {
            debug!(?reason, len = current.len(), "sealing batch");
            seal_and_send(&mut current, &batch_tx).await?;
        }
    }
}

async fn seal_and_send(
    current: &mut Batch,
    batch_tx: &mpsc::Sender<Batch>,
) -> Result<(), mpsc::error::SendError<Batch>> {
    if current.is_empty() {
        return Ok(());
    }
    let sealed = std::mem::replace(current, Batch::new());
    info!(len = sealed.len(), bytes = sealed.byte_size(), "batch sealed");
    batch_tx.send(sealed).await
}
