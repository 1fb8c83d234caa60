//! Startup prober (spec §4.6): verifies the signer account before the
//! worker tasks start, and publishes two `podping-startup` diagnostic
//! pings to estimate publishing capacity from resource-credit cost.
//!
//! No direct teacher analogue exists for this step; it is grounded on
//! the general shape `ghost-fleet`'s `FleetService::new` uses for
//! pre-flight checks that must complete before `run()` starts its
//! worker tasks.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use hive_rpc::signing::Signer;
use hive_rpc::NodePool;
use podping_core::constants::{NotificationReason, OPERATION_ID_STARTUP};
use podping_core::{AllowList, PodpingEnvelope, Batch};
use tracing::{debug, info, instrument, warn};

use crate::error::WriterError;
use crate::publisher::publish_with_retry;
use crate::batcher::HaltTheQueue;

/// Result of the startup probe: the estimated per-operation resource
/// cost and derived capacity, surfaced for the "Podping startup
/// complete" diagnostic ping.
#[derive(Debug, Clone, Copy)]
pub struct ProbeResult {
    /// Estimated resource-credit cost per publish, if it could be
    /// measured.
    pub cost_estimate: Option<i64>,
    /// Derived capacity (ops the account could still publish), if
    /// `cost_estimate` and a known mana balance were both available.
    pub capacity: Option<i64>,
}

/// Run the startup probe.
///
/// # Errors
///
/// Returns [`WriterError::Authorization`] if the account does not exist
/// or is not in the allow-list (and `ignore_errors` is not set), or if a
/// diagnostic publish fails.
#[instrument(skip(pool, signer, allow_list))]
pub async fn run(
    pool: &NodePool,
    signer: &Signer,
    server_account: &str,
    allow_list: &AllowList,
    enforce_allowlist: bool,
    ignore_errors: bool,
    halt: &HaltTheQueue,
) -> Result<ProbeResult, WriterError> {
    let accounts = pool
        .get_accounts(&[server_account.to_string()])
        .await
        .map_err(|e| WriterError::Authorization(format!("account lookup failed: {e}")))?;

    let account_exists = accounts.iter().any(|a| a.name == server_account);
    if !account_exists && !ignore_errors {
        return Err(WriterError::Authorization(format!(
            "signer account '{server_account}' does not exist"
        )));
    }

    if enforce_allowlist && !allow_list.contains(server_account) && !ignore_errors {
        return Err(WriterError::Authorization(format!(
            "signer account '{server_account}' is not in the allow-list"
        )));
    }

    let before = probe_mana(pool, server_account).await;
    publish_diagnostic(pool, signer, server_account, "podping-startup diagnostic (pre)", halt, ignore_errors).await?;

    tokio::time::sleep(Duration::from_secs(2)).await;

    let after = probe_mana(pool, server_account).await;
    let (cost_estimate, capacity) = estimate_capacity(before, after);

    publish_diagnostic(
        pool,
        signer,
        server_account,
        &format!("Podping startup complete (capacity={capacity:?})"),
        halt,
        ignore_errors,
    )
    .await?;

    info!(?cost_estimate, ?capacity, "startup probe complete");
    Ok(ProbeResult { cost_estimate, capacity })
}

/// Sample `account`'s current resource-credit mana via `rc_api.find_rcs`.
/// Returns `None` rather than failing the probe outright if the RC API
/// is unreachable or the account has no RC entry yet (new accounts can
/// take a block to appear) - a missing sample degrades the capacity
/// estimate to `None` rather than aborting boot.
async fn probe_mana(pool: &NodePool, account: &str) -> Option<i64> {
    match pool.find_rcs(account).await {
        Ok(mana) => Some(mana),
        Err(e) => {
            debug!(error = %e, "resource-credit sample failed, capacity estimate will be unavailable");
            None
        }
    }
}

/// Derive a per-op resource-credit cost estimate and remaining capacity
/// from a before/after mana sample (spec §4.6 step 3). Either sample can
/// be missing (RC API unreachable); the estimate degrades to `None`
/// rather than reporting a fabricated number.
fn estimate_capacity(before: Option<i64>, after: Option<i64>) -> (Option<i64>, Option<i64>) {
    let cost_estimate = match (before, after) {
        (Some(before), Some(after)) => Some((before - after).max(0)),
        _ => None,
    };
    let capacity = match (cost_estimate, after) {
        (Some(cost), Some(remaining)) if cost > 0 => Some(remaining / cost),
        _ => None,
    };
    (cost_estimate, capacity)
}

async fn publish_diagnostic(
    pool: &NodePool,
    signer: &Signer,
    server_account: &str,
    message: &str,
    halt: &HaltTheQueue,
    ignore_errors: bool,
) -> Result<(), WriterError> {
    let mut batch = Batch::new();
    batch.push(message.to_string(), Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());
    let envelope = PodpingEnvelope::from_batch(&batch, NotificationReason::FeedUpdate);
    if envelope.is_err() {
        warn!("startup diagnostic envelope too large, skipping");
        return Ok(());
    }

    match publish_with_retry(&batch, pool, signer, server_account, OPERATION_ID_STARTUP, 0, halt).await {
        Ok(_) => Ok(()),
        Err(e) if ignore_errors => {
            warn!(error = %e, "ignoring startup diagnostic failure per USE_TEST_NODE+ignore_errors");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_result_capacity_is_none_without_cost() {
        let result = ProbeResult { cost_estimate: None, capacity: None };
        assert!(result.capacity.is_none());
    }

    #[test]
    fn estimate_capacity_divides_remaining_by_cost() {
        let (cost, capacity) = estimate_capacity(Some(100_000), Some(99_000));
        assert_eq!(cost, Some(1_000));
        assert_eq!(capacity, Some(99));
    }

    #[test]
    fn estimate_capacity_none_when_either_sample_missing() {
        assert_eq!(estimate_capacity(None, Some(99_000)), (None, None));
        assert_eq!(estimate_capacity(Some(100_000), None), (None, None));
        assert_eq!(estimate_capacity(None, None), (None, None));
    }

    #[test]
    fn estimate_capacity_none_when_cost_is_zero() {
        assert_eq!(estimate_capacity(Some(100_000), Some(100_000)), (Some(0), None));
    }
}
