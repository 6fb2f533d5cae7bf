//! HTTP Chain Data Gateway - JSON-RPC + price feed
//!
//! 1. Per-chain endpoint list with failover after N consecutive failures
//! 2. Exponential backoff with ±20% jitter on transient errors
//! 3. Token-bucket rate limiting per endpoint
//! 4. Per-attempt timeout; exhausted retries degrade to `Unavailable`
//! 5. User-Agent header, gzip, API keys masked in every log line
//!
//! Bundle simulation goes through `eth_simulateV1`. Providers that do not
//! implement it answer -32601 and the request comes back `Unavailable`.

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::dexscreener::{select_price, token_url, DexScreenerResponse};
use super::gateway::{CallOutcome, CallRequest, ChainGateway, GatewayRequest, GatewayResponse};
use super::rate_limit::RateLimiter;
use crate::models::{AppError, AppResult, ChainGatewayConfig, ErrorCode, GatewayConfig};
use crate::utils::constants::{
    get_chain_name, mask_url, RETRY_JITTER_PERCENT, USER_AGENT as USER_AGENT_CONST,
};

/// JSON-RPC code for "method not found"
const RPC_METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC code some providers use for throttling
const RPC_LIMIT_EXCEEDED: i64 = -32005;
/// JSON-RPC code for an execution revert
const RPC_EXECUTION_REVERTED: i64 = 3;

// ============================================
// ENDPOINT ROTATION
// ============================================

/// Ordered endpoint list with a sticky active index.
///
/// The active endpoint moves forward after `failover_threshold` consecutive
/// retryable failures and wraps around at the end of the list.
#[derive(Debug)]
pub struct EndpointRotation {
    endpoints: Vec<String>,
    active: AtomicUsize,
    consecutive_failures: AtomicU32,
}

impl EndpointRotation {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            active: AtomicUsize::new(0),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Active endpoint index and URL
    pub fn current(&self) -> Option<(usize, &str)> {
        if self.endpoints.is_empty() {
            return None;
        }
        let idx = self.active.load(Ordering::SeqCst) % self.endpoints.len();
        Some((idx, self.endpoints[idx].as_str()))
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Count a failure against endpoint `used`. Returns the new active index
    /// when this failure triggered a rotation.
    pub fn record_failure(&self, used: usize, threshold: u32) -> Option<usize> {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures < threshold || self.endpoints.len() < 2 {
            return None;
        }
        let next = (used + 1) % self.endpoints.len();
        // Concurrent callers that failed on the same endpoint rotate once
        match self
            .active
            .compare_exchange(used, next, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                Some(next)
            }
            Err(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Backoff before retry `attempt` (0-based): base·2^attempt, capped, ±20% jitter
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let capped_delay = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_range = (capped_delay * RETRY_JITTER_PERCENT) / 100;
    let jitter: i64 = if jitter_range > 0 {
        rand::thread_rng().gen_range(-(jitter_range as i64)..=(jitter_range as i64))
    } else {
        0
    };
    Duration::from_millis((capped_delay as i64 + jitter).max(0) as u64)
}

// ============================================
// JSON-RPC WIRE TYPES
// ============================================

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// Rate limit (code -32005 or a "rate limit" message)
    pub fn is_rate_limit(&self) -> bool {
        self.code == RPC_LIMIT_EXCEEDED || self.message.to_lowercase().contains("rate limit")
    }

    /// Provider does not implement the method
    pub fn is_method_not_found(&self) -> bool {
        let msg = self.message.to_lowercase();
        self.code == RPC_METHOD_NOT_FOUND
            || msg.contains("method not found")
            || msg.contains("does not exist")
            || msg.contains("not supported")
    }

    pub fn is_revert(&self) -> bool {
        self.code == RPC_EXECUTION_REVERTED || self.message.contains("execution reverted")
    }

    fn into_app_error(self) -> AppError {
        if self.is_rate_limit() {
            AppError::rate_limited()
        } else if self.is_method_not_found() {
            AppError::unsupported(format!("{} (code: {})", self.message, self.code))
        } else {
            AppError::new(
                ErrorCode::GatewayRpcError,
                format!("RPC error: {} (code: {})", self.message, self.code),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
struct SimulatedBlock {
    calls: Vec<SimulatedCall>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatedCall {
    status: String,
    #[serde(default)]
    return_data: Option<String>,
    #[serde(default)]
    error: Option<RpcError>,
}

impl SimulatedCall {
    fn into_outcome(self) -> AppResult<CallOutcome> {
        let data = match self.return_data.as_deref() {
            Some(raw) => decode_hex(raw)?,
            None => Bytes::new(),
        };
        if self.status == "0x1" {
            return Ok(CallOutcome::Success(data));
        }
        let reason = if !data.is_empty() {
            decode_revert_reason(&data)
        } else if let Some(err) = self.error {
            err.message
        } else {
            "execution reverted".to_string()
        };
        Ok(CallOutcome::Reverted(reason))
    }
}

fn decode_hex(raw: &str) -> AppResult<Bytes> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(stripped)
        .map(Bytes::from)
        .map_err(|e| AppError::with_source(ErrorCode::GatewayInvalidResponse, "invalid hex", e))
}

fn hex_quantity(value: U256) -> String {
    format!("0x{:x}", value)
}

/// `eth_simulateV1` parameters: one block, caller balances overridden
pub fn simulate_params(calls: &[CallRequest], caller_balance: U256) -> serde_json::Value {
    let mut overrides = serde_json::Map::new();
    for call in calls {
        overrides
            .entry(call.from.to_string())
            .or_insert_with(|| serde_json::json!({ "balance": hex_quantity(caller_balance) }));
    }

    let calls: Vec<serde_json::Value> = calls
        .iter()
        .map(|c| {
            serde_json::json!({
                "from": c.from.to_string(),
                "to": c.to.to_string(),
                "value": hex_quantity(c.value),
                "input": format!("0x{}", hex::encode(&c.data)),
            })
        })
        .collect();

    serde_json::json!([
        {
            "blockStateCalls": [{ "stateOverrides": overrides, "calls": calls }],
            "validation": false
        },
        "latest"
    ])
}

/// Parse an `eth_simulateV1` result into per-call outcomes
pub fn parse_simulation(result: serde_json::Value, expected: usize) -> AppResult<Vec<CallOutcome>> {
    let blocks: Vec<SimulatedBlock> = serde_json::from_value(result)?;
    let outcomes = blocks
        .into_iter()
        .flat_map(|b| b.calls)
        .map(SimulatedCall::into_outcome)
        .collect::<AppResult<Vec<_>>>()?;

    if outcomes.len() != expected {
        return Err(AppError::invalid_response(format!(
            "simulation returned {} results for {} calls",
            outcomes.len(),
            expected
        )));
    }
    Ok(outcomes)
}

/// Decode revert reason from output bytes
pub fn decode_revert_reason(output: &[u8]) -> String {
    // Error(string): 0x08c379a0
    if output.len() >= 68 && output[0..4] == [0x08, 0xc3, 0x79, 0xa0] {
        let len_start = 36;
        let len = U256::from_be_slice(&output[len_start..len_start + 32]);
        let len_usize: usize = len.try_into().unwrap_or(usize::MAX);
        let str_start = len_start + 32;
        if let Some(raw) = output.get(str_start..str_start.saturating_add(len_usize)) {
            if let Ok(s) = std::str::from_utf8(raw) {
                return s.to_string();
            }
        }
    }

    // Panic(uint256): 0x4e487b71
    if output.len() >= 36 && output[0..4] == [0x4e, 0x48, 0x7b, 0x71] {
        let code = U256::from_be_slice(&output[4..36]);
        return format!("Panic(0x{:x})", code);
    }

    // Common revert markers in honeypots
    let hex_output = hex::encode(output);
    if hex_output.contains("626f74") {
        // "bot"
        return "Bot detected / Blacklisted".to_string();
    }
    if hex_output.contains("74726164696e67") {
        // "trading"
        return "Trading not enabled".to_string();
    }
    if hex_output.contains("7472616e73666572") {
        // "transfer"
        return "Transfer blocked".to_string();
    }

    format!("Revert: 0x{}", hex::encode(&output[..output.len().min(64)]))
}

// ============================================
// HTTP GATEWAY
// ============================================

struct ChainRoute {
    config: ChainGatewayConfig,
    rpc: EndpointRotation,
    price_feed: EndpointRotation,
}

/// Chain Data Gateway over HTTP JSON-RPC endpoints and a DexScreener-style feed
pub struct HttpGateway {
    routes: HashMap<u64, ChainRoute>,
    limiter: Arc<RateLimiter>,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> AppResult<Self> {
        config.validate()?;
        let client = Self::build_client()?;

        let routes = config
            .chains
            .into_iter()
            .map(|(chain_id, chain)| {
                info!(
                    "🌐 Gateway {}: {} endpoint(s), primary {}",
                    get_chain_name(chain_id),
                    chain.endpoints.len(),
                    chain.endpoints.first().map(|u| mask_url(u)).unwrap_or_default()
                );
                let route = ChainRoute {
                    rpc: EndpointRotation::new(chain.endpoints.clone()),
                    price_feed: EndpointRotation::new(vec![chain.price_feed.clone()]),
                    config: chain,
                };
                (chain_id, route)
            })
            .collect();

        Ok(Self {
            routes,
            limiter: Arc::new(RateLimiter::new()),
            client,
        })
    }

    /// Share one rate limiter across gateways hitting the same providers
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Build HTTP client with custom headers and gzip
    fn build_client() -> AppResult<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        reqwest::Client::builder()
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| {
                AppError::with_source(
                    ErrorCode::ConfigInvalidValue,
                    "Failed to build HTTP client",
                    e,
                )
            })
    }

    /// Currently active RPC endpoint for a chain (masked)
    pub fn active_endpoint(&self, chain_id: u64) -> Option<String> {
        self.routes
            .get(&chain_id)
            .and_then(|r| r.rpc.current())
            .map(|(_, url)| mask_url(url))
    }

    /// Run `op` against the rotation with rate limiting, timeout, backoff, failover
    async fn with_retry<T, F, Fut>(
        &self,
        config: &ChainGatewayConfig,
        rotation: &EndpointRotation,
        label: &str,
        op: F,
    ) -> AppResult<T>
    where
        F: Fn(String) -> Fut + Send + Sync,
        Fut: Future<Output = AppResult<T>> + Send,
        T: Send,
    {
        let attempts = config.max_retries + 1;
        let mut last_error = None;

        for attempt in 0..attempts {
            let (idx, url) = match rotation.current() {
                Some(current) => current,
                None => return Err(AppError::invalid_config("empty endpoint list")),
            };

            self.limiter.acquire(url, config.requests_per_second).await;

            let result = match tokio::time::timeout(config.timeout(), op(url.to_string())).await {
                Ok(result) => result,
                Err(_) => Err(AppError::gateway_timeout(format!(
                    "{} timed out after {}ms",
                    label, config.timeout_ms
                ))),
            };

            match result {
                Ok(value) => {
                    rotation.record_success();
                    return Ok(value);
                }
                Err(e) if e.code.is_retryable() => {
                    warn!(
                        "⚠️ [{}] {} failed on {} (attempt {}/{}): {}",
                        e.code_str(),
                        label,
                        mask_url(url),
                        attempt + 1,
                        attempts,
                        e.message
                    );
                    if let Some(next) = rotation.record_failure(idx, config.failover_threshold) {
                        info!("🔄 Failing over to endpoint #{} for {}", next, label);
                    }
                    last_error = Some(e);

                    if attempt + 1 < attempts {
                        let delay =
                            backoff_delay(attempt, config.backoff_base_ms, config.backoff_max_ms);
                        debug!("⏳ Retry {}/{} after {}ms", attempt + 2, attempts, delay.as_millis());
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::internal(format!("{}: no attempts made", label))
        }))
    }

    /// Execute single JSON-RPC call
    async fn post_rpc(&self, url: &str, payload: &serde_json::Value) -> AppResult<serde_json::Value> {
        let response = self.client.post(url).json(payload).send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::rate_limited());
        }
        if status.is_server_error() {
            return Err(AppError::new(
                ErrorCode::GatewayServerError,
                format!("HTTP error: {}", status),
            ));
        }
        if !status.is_success() {
            return Err(AppError::new(
                ErrorCode::GatewayHttpError,
                format!("HTTP error: {}", status),
            ));
        }

        let body: RpcResponse<serde_json::Value> = response.json().await?;
        if let Some(error) = body.error {
            return Err(error.into_app_error());
        }
        body.result
            .ok_or_else(|| AppError::invalid_response("No result in response"))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> AppResult<T> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::rate_limited());
        }
        if status.is_server_error() {
            return Err(AppError::new(
                ErrorCode::GatewayServerError,
                format!("HTTP error: {}", status),
            ));
        }
        if !status.is_success() {
            return Err(AppError::new(
                ErrorCode::GatewayHttpError,
                format!("HTTP error: {}", status),
            ));
        }
        Ok(response.json().await?)
    }

    async fn rpc(
        &self,
        route: &ChainRoute,
        method: &str,
        params: serde_json::Value,
    ) -> AppResult<serde_json::Value> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });
        let payload = &payload;
        self.with_retry(&route.config, &route.rpc, method, |url| async move {
            self.post_rpc(&url, payload).await
        })
        .await
    }

    async fn simulate(
        &self,
        route: &ChainRoute,
        calls: &[CallRequest],
        caller_balance: U256,
    ) -> AppResult<Vec<CallOutcome>> {
        let result = self
            .rpc(route, "eth_simulateV1", simulate_params(calls, caller_balance))
            .await?;
        parse_simulation(result, calls.len())
    }

    async fn bytecode(&self, route: &ChainRoute, address: Address) -> AppResult<Bytes> {
        let result = self
            .rpc(route, "eth_getCode", serde_json::json!([address.to_string(), "latest"]))
            .await?;
        let raw = result
            .as_str()
            .ok_or_else(|| AppError::invalid_response("eth_getCode result is not a string"))?;
        decode_hex(raw)
    }

    async fn price(&self, route: &ChainRoute, chain_id: u64, address: Address) -> AppResult<f64> {
        let token = address.to_string();
        let token_ref = token.as_str();
        let response: DexScreenerResponse = self
            .with_retry(&route.config, &route.price_feed, "getPrice", |base| async move {
                self.get_json(&token_url(&base, token_ref)).await
            })
            .await?;

        select_price(&response, chain_id, &token).ok_or_else(|| {
            AppError::new(
                ErrorCode::GatewayUnsupported,
                format!("no priced pair for {} on {}", token, get_chain_name(chain_id)),
            )
        })
    }

    async fn dispatch(&self, request: &GatewayRequest) -> AppResult<GatewayResponse> {
        let chain_id = request.chain_id();
        let route = self
            .routes
            .get(&chain_id)
            .ok_or_else(|| AppError::no_endpoints(chain_id))?;

        match request {
            GatewayRequest::SimulateCall {
                calls,
                caller_balance,
                ..
            } => Ok(GatewayResponse::Simulation(
                self.simulate(route, calls, *caller_balance).await?,
            )),
            GatewayRequest::GetBytecode { address, .. } => {
                Ok(GatewayResponse::Bytecode(self.bytecode(route, *address).await?))
            }
            GatewayRequest::GetPrice { address, .. } => {
                Ok(GatewayResponse::Price(self.price(route, chain_id, *address).await?))
            }
        }
    }
}

#[async_trait]
impl ChainGateway for HttpGateway {
    async fn fetch(&self, request: GatewayRequest) -> GatewayResponse {
        match self.dispatch(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "❌ {} on {} unavailable: {}",
                    request.label(),
                    get_chain_name(request.chain_id()),
                    e
                );
                GatewayResponse::Unavailable(e.to_string())
            }
        }
    }
}
