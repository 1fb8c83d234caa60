//! The Hive node pool: round-robin endpoint rotation, fibonacci backoff, and
//! per-endpoint circuit breaking over a plain JSON-RPC HTTP transport.
//!
//! This is the concrete capability behind spec §4.1 ("Node pool"): callers
//! see `head_block_number`/`get_block`/`get_accounts`/`get_following`/
//! `broadcast_transaction_synchronous` and no RPC vocabulary.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{instrument, warn};

use crate::circuit::CircuitBreaker;
use crate::config::PoolConfig;
use crate::error::{PoolError, RpcError};
use crate::types::{
    Account, Block, BroadcastResult, DynamicGlobalProperties, FindRcsParams, FindRcsResult,
    FollowEntry, JsonRpcRequest, JsonRpcResponse, SignedTransaction,
};
use crate::backoff::fibonacci_delay;

/// Round-robin, circuit-breaking JSON-RPC client for a pool of Hive nodes.
#[derive(Debug)]
pub struct NodePool {
    http: reqwest::Client,
    endpoints: Vec<String>,
    next: AtomicUsize,
    breaker: Mutex<CircuitBreaker>,
    config: PoolConfig,
    request_id: AtomicU64,
}

impl NodePool {
    /// Create a new pool over the given endpoints with default
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidConfig`] if `endpoints` is empty or the
    /// configuration fails validation.
    pub fn new(endpoints: Vec<String>) -> Result<Self, RpcError> {
        Self::with_config(endpoints, PoolConfig::default())
    }

    /// Create a new pool with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidConfig`] if `endpoints` is empty or the
    /// configuration fails validation.
    pub fn with_config(endpoints: Vec<String>, config: PoolConfig) -> Result<Self, RpcError> {
        config.validate()?;
        if endpoints.is_empty() {
            return Err(RpcError::InvalidConfig(
                "at least one endpoint is required".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .map_err(|e| RpcError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            http,
            endpoints,
            next: AtomicUsize::new(0),
            breaker: Mutex::new(CircuitBreaker::new(
                config.breaker_threshold,
                config.breaker_cooldown,
            )),
            config,
            request_id: AtomicU64::new(1),
        })
    }

    /// Number of endpoints configured in this pool.
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Returns the next endpoint whose breaker is closed, advancing the
    /// round-robin cursor, or `None` if every endpoint is currently open.
    fn pick_endpoint(&self) -> Option<String> {
        let breaker = self.breaker.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let len = self.endpoints.len();
        for _ in 0..len {
            let idx = self.next.fetch_add(1, Ordering::Relaxed) % len;
            let endpoint = &self.endpoints[idx];
            if !breaker.is_open(endpoint) {
                return Some(endpoint.clone());
            }
        }
        None
    }

    #[instrument(skip(self, params), fields(method = %method))]
    async fn call<P, R>(&self, method: &str, params: P) -> Result<R, PoolError>
    where
        P: Serialize + Clone,
        R: DeserializeOwned,
    {
        {
            let mut breaker = self.breaker.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            breaker.auto_reset();
        }

        let mut last_err: Option<RpcError> = None;

        for attempt in 0..self.config.max_retries_per_call {
            let Some(endpoint) = self.pick_endpoint() else {
                return Err(PoolError::PoolExhausted {
                    endpoint_count: self.endpoints.len(),
                });
            };

            let id = self.request_id.fetch_add(1, Ordering::Relaxed);
            let request = JsonRpcRequest::new(method, params.clone(), id);

            let outcome = self.send(&endpoint, &request).await;

            let mut breaker = self.breaker.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match outcome {
                Ok(value) => {
                    breaker.record_success(&endpoint);
                    return Ok(value);
                }
                Err(err) => {
                    breaker.record_failure(&endpoint);
                    drop(breaker);
                    warn!(endpoint = %endpoint, attempt, error = %err, "RPC call failed");
                    let retryable = err.is_retryable();
                    last_err = Some(err);
                    if !retryable {
                        break;
                    }
                    if attempt + 1 < self.config.max_retries_per_call {
                        tokio::time::sleep(fibonacci_delay(attempt)).await;
                    }
                }
            }
        }

        Err(last_err
            .map(PoolError::Rpc)
            .unwrap_or(PoolError::PoolExhausted {
                endpoint_count: self.endpoints.len(),
            }))
    }

    async fn send<P, R>(
        &self,
        endpoint: &str,
        request: &JsonRpcRequest<P>,
    ) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let response = self.http.post(endpoint).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status(status.as_u16()));
        }
        let body: JsonRpcResponse<R> = response.json().await?;

        if let Some(error) = body.error {
            return Err(RpcError::rpc(error.code, error.message));
        }
        body.result
            .ok_or_else(|| RpcError::InvalidResponse("missing result and error".into()))
    }

    /// Fetch the current head block number.
    pub async fn head_block_number(&self) -> Result<u64, PoolError> {
        let props: DynamicGlobalProperties = self
            .call("condenser_api.get_dynamic_global_properties", ())
            .await?;
        Ok(props.head_block_number)
    }

    /// Fetch a single block by number.
    pub async fn get_block(&self, number: u64) -> Result<Block, PoolError> {
        self.call("condenser_api.get_block", [number]).await
    }

    /// Fetch a bounded batch of blocks, one RPC call per block number
    /// dispatched concurrently (spec §4.1: `get_ops_in_block_batch`).
    ///
    /// Each call independently rotates endpoints and retries on failure, so a
    /// single bad block number in the batch does not poison the others. The
    /// result vector preserves the input order; a failing entry carries its
    /// own [`PoolError`] rather than failing the whole batch.
    #[instrument(skip(self), fields(batch_size = numbers.len()))]
    pub async fn get_blocks_batch(&self, numbers: &[u64]) -> Vec<(u64, Result<Block, PoolError>)> {
        let futures = numbers.iter().map(|&n| async move { (n, self.get_block(n).await) });
        futures::future::join_all(futures).await
    }

    /// Fetch account records (used by the startup prober to verify the
    /// signer account exists).
    pub async fn get_accounts(&self, names: &[String]) -> Result<Vec<Account>, PoolError> {
        self.call("condenser_api.get_accounts", (names.to_vec(),)).await
    }

    /// Fetch the accounts a given account follows (used as the allow-list
    /// source, spec §4.2).
    pub async fn get_following(
        &self,
        account: &str,
        start: Option<&str>,
        follow_type: &str,
        limit: u32,
    ) -> Result<Vec<FollowEntry>, PoolError> {
        self.call(
            "condenser_api.get_following",
            (
                account.to_string(),
                start.map(str::to_string),
                follow_type.to_string(),
                limit,
            ),
        )
        .await
    }

    /// Sample an account's current resource-credit mana (spec §4.6: the
    /// startup prober's before/after measurement used to estimate
    /// publishing capacity).
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`] if the RPC call fails, or
    /// [`RpcError::InvalidResponse`] (wrapped in [`PoolError::Rpc`]) if
    /// the account has no RC entry or its mana does not parse as an
    /// integer.
    pub async fn find_rcs(&self, account: &str) -> Result<i64, PoolError> {
        let result: FindRcsResult = self
            .call(
                "rc_api.find_rcs",
                FindRcsParams {
                    accounts: vec![account.to_string()],
                },
            )
            .await?;

        let entry = result
            .rc_accounts
            .first()
            .ok_or_else(|| PoolError::Rpc(RpcError::InvalidResponse(format!("no RC entry for account '{account}'"))))?;

        entry
            .rc_manabar
            .current_mana
            .parse::<i64>()
            .map_err(|e| PoolError::Rpc(RpcError::InvalidResponse(format!("malformed current_mana: {e}"))))
    }

    /// Broadcast a signed transaction and wait for it to be included.
    pub async fn broadcast_transaction_synchronous(
        &self,
        tx: &SignedTransaction,
    ) -> Result<BroadcastResult, PoolError> {
        self.call(
            "network_broadcast_api.broadcast_transaction_synchronous",
            (tx.clone(),),
        )
        .await
    }
}

/// How long to wait between live-mode head polls given how much of the
/// block interval has already elapsed (spec §4.7: "poll `head_block_number`
/// every `BLOCK_INTERVAL - elapsed` seconds").
#[must_use]
pub fn poll_delay(block_interval: Duration, elapsed: Duration) -> Duration {
    block_interval.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_pool(server: &MockServer) -> NodePool {
        NodePool::new(vec![server.uri()]).expect("pool construction failed")
    }

    #[tokio::test]
    async fn head_block_number_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {"head_block_number": 12345}
            })))
            .mount(&server)
            .await;

        let pool = mock_pool(&server).await;
        let head = pool.head_block_number().await.expect("call failed");
        assert_eq!(head, 12345);
    }

    #[tokio::test]
    async fn rotates_to_second_endpoint_on_failure() {
        let bad = MockServer::start().await;
        let good = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&bad)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {"head_block_number": 999}
            })))
            .mount(&good)
            .await;

        let pool = NodePool::new(vec![bad.uri(), good.uri()]).expect("pool construction failed");
        let head = pool.head_block_number().await.expect("call failed");
        assert_eq!(head, 999);
    }

    #[tokio::test]
    async fn pool_exhausted_when_all_endpoints_failing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = PoolConfig::default().with_breaker_threshold(1);
        let pool = NodePool::with_config(vec![server.uri()], config).expect("pool construction failed");

        let first = pool.head_block_number().await;
        assert!(first.is_err());

        let second = pool.head_block_number().await;
        assert!(matches!(second, Err(PoolError::PoolExhausted { .. })));
    }

    #[tokio::test]
    async fn rpc_error_body_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": {"code": -32003, "message": "account does not exist"}
            })))
            .mount(&server)
            .await;

        let pool = mock_pool(&server).await;
        let err = pool.head_block_number().await.expect_err("expected failure");
        match err {
            PoolError::Rpc(RpcError::Rpc { code, message }) => {
                assert_eq!(code, -32003);
                assert!(message.contains("does not exist"));
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_blocks_batch_preserves_order_and_isolates_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {"block_id": "abc", "timestamp": "2024-01-01T00:00:00", "transactions": []}
            })))
            .mount(&server)
            .await;

        let pool = mock_pool(&server).await;
        let results = pool.get_blocks_batch(&[10, 11, 12]).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().map(|(n, _)| *n).collect::<Vec<_>>(), vec![10, 11, 12]);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
    }

    #[tokio::test]
    async fn find_rcs_parses_current_mana() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {"rc_accounts": [{"rc_manabar": {"current_mana": "987654"}}]}
            })))
            .mount(&server)
            .await;

        let pool = mock_pool(&server).await;
        let mana = pool.find_rcs("podping").await.expect("call failed");
        assert_eq!(mana, 987_654);
    }

    #[tokio::test]
    async fn find_rcs_errors_on_missing_account() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {"rc_accounts": []}
            })))
            .mount(&server)
            .await;

        let pool = mock_pool(&server).await;
        assert!(pool.find_rcs("podping").await.is_err());
    }

    #[test]
    fn poll_delay_never_negative() {
        let interval = Duration::from_secs(3);
        assert_eq!(poll_delay(interval, Duration::from_secs(5)), Duration::ZERO);
        assert_eq!(poll_delay(interval, Duration::from_secs(1)), Duration::from_secs(2));
    }
}
