//! Publisher (spec §4.5): signs and submits sealed batches, applying the
//! bounded `HALT_TIME` retry ladder on failure.
//!
//! Grounded on the retry-loop shape of `ghost-fleet/src/service.rs`'s
//! scheduler tick loop (a flat loop indexed by an attempt counter, no
//! recursion, per spec §9) and on spec §4.5's error classification.

use std::sync::Arc;

use chrono::Utc;
use hive_rpc::{NodePool, PoolError};
use hive_rpc::signing::Signer;
use hive_rpc::types::{CustomJsonOperation, UnsignedTransaction};
use podping_core::constants::{HALT_TIME, NotificationReason, OPERATION_ID_PRODUCTION};
use podping_core::{Batch, PodpingEnvelope};
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use crate::batcher::HaltTheQueue;
use crate::error::WriterError;

/// Outcome of a single publish attempt, classified per spec §4.5/§7.
#[derive(Debug)]
enum Outcome {
    Success { trx_id: String },
    Retryable(String),
    SetsHalt(String),
    Fatal(String),
}

/// Run the publisher loop: pull sealed batches off `batch_rx`, sign and
/// broadcast them through `pool`, retrying per the `HALT_TIME` ladder.
///
/// Terminates the process with [`WriterError::RetryLadderExhausted`]
/// after 18 consecutive failures, per spec §4.5.
///
/// # Errors
///
/// Returns [`WriterError::RetryLadderExhausted`] if the retry ladder is
/// exhausted. Individual signing/RPC errors are handled internally via
/// the retry loop and never propagate directly.
#[instrument(skip_all)]
pub async fn run(
    mut batch_rx: mpsc::Receiver<Batch>,
    pool: Arc<NodePool>,
    signer: Arc<Signer>,
    server_account: String,
    operation_id: &str,
    fault_injection_percent: u8,
    halt: Arc<HaltTheQueue>,
) -> Result<(), WriterError> {
    while let Some(batch) = batch_rx.recv().await {
        publish_with_retry(
            &batch,
            &pool,
            &signer,
            &server_account,
            operation_id,
            fault_injection_percent,
            &halt,
        )
        .await?;
    }
    Ok(())
}

/// Publish a single batch, retrying per the `HALT_TIME` ladder until
/// success or ladder exhaustion.
///
/// # Errors
///
/// Returns [`WriterError::RetryLadderExhausted`] after 18 consecutive
/// failures.
pub async fn publish_with_retry(
    batch: &Batch,
    pool: &NodePool,
    signer: &Signer,
    server_account: &str,
    operation_id: &str,
    fault_injection_percent: u8,
    halt: &HaltTheQueue,
) -> Result<String, WriterError> {
    let mut failure_count = 0usize;

    loop {
        match attempt_publish(batch, pool, signer, server_account, operation_id, fault_injection_percent).await {
            Outcome::Success { trx_id } => {
                halt.clear();
                info!(
                    trx_id = %trx_id,
                    num_urls = batch.len(),
                    bytes = batch.byte_size(),
                    "batch published"
                );
                return Ok(trx_id);
            }
            Outcome::Fatal(reason) => {
                error!(reason = %reason, "fatal publish error, aborting batch");
                return Err(WriterError::Authorization(reason));
            }
            Outcome::SetsHalt(reason) => {
                warn!(reason = %reason, "resource-credit exhaustion suspected, setting HALT_THE_QUEUE");
                halt.set();
            }
            Outcome::Retryable(reason) => {
                warn!(reason = %reason, failure_count, "publish attempt failed, will retry");
            }
        }

        if failure_count >= HALT_TIME.len() {
            error!(failure_count, "retry ladder exhausted");
            return Err(WriterError::RetryLadderExhausted { attempts: failure_count });
        }

        let delay = HALT_TIME[failure_count];
        failure_count += 1;
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
        }
    }
}

async fn attempt_publish(
    batch: &Batch,
    pool: &NodePool,
    signer: &Signer,
    server_account: &str,
    operation_id: &str,
    fault_injection_percent: u8,
) -> Outcome {
    if operation_id == OPERATION_ID_PRODUCTION && fault_injection_percent > 0 {
        let roll: u8 = rand::thread_rng().gen_range(1..=100);
        if roll <= fault_injection_percent {
            return Outcome::Retryable("synthetic fault injection".to_string());
        }
    }

    let envelope = match PodpingEnvelope::from_batch(batch, NotificationReason::FeedUpdate) {
        Ok(envelope) => envelope,
        Err(e) => return Outcome::Fatal(format!("envelope construction failed (programmer error): {e}")),
    };

    let json = match serde_json::to_string(&envelope) {
        Ok(json) => json,
        Err(e) => return Outcome::Fatal(format!("envelope serialization failed: {e}")),
    };

    let op = CustomJsonOperation {
        required_auths: vec![],
        required_posting_auths: vec![server_account.to_string()],
        id: operation_id.to_string(),
        json,
    };

    let (head_block_number, head_block_id) = match head_reference(pool).await {
        Ok(pair) => pair,
        Err(e) => return classify_pool_error(&e),
    };

    let unsigned = UnsignedTransaction::custom_json(head_block_number, &head_block_id, Utc::now(), &op);
    let signed = match signer.sign(&unsigned) {
        Ok(signed) => signed,
        Err(e) => return Outcome::Fatal(format!("signing failed: {e}")),
    };

    match pool.broadcast_transaction_synchronous(&signed).await {
        Ok(result) => Outcome::Success { trx_id: result.id },
        Err(e) => classify_pool_error(&e),
    }
}

async fn head_reference(pool: &NodePool) -> Result<(u64, String), PoolError> {
    let head_num = pool.head_block_number().await?;
    let head_block = pool.get_block(head_num).await?;
    Ok((head_num, head_block.block_id))
}

fn classify_pool_error(err: &PoolError) -> Outcome {
    match err {
        PoolError::Rpc(hive_rpc::RpcError::Rpc { message, .. }) if message.contains("does not exist") => {
            Outcome::Fatal(format!("account does not exist: {message}"))
        }
        PoolError::Rpc(hive_rpc::RpcError::Rpc { message, .. })
            if message.to_lowercase().contains("resource credit") || message.to_lowercase().contains("rc_") =>
        {
            Outcome::SetsHalt(message.clone())
        }
        other => Outcome::Retryable(other.to_string()),
    }
}
