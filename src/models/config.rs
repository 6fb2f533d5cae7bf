//! Configuration module for the risk engine
//!
//! Two independent pieces:
//! - `GatewayConfig`: per-chain endpoints, timeouts, retries, rate limits
//! - `RiskConfig`: weights, thresholds, cache TTL, deadline, concurrency bound
//!
//! Addresses and chain ids come from utils/constants.rs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use super::errors::{AppError, AppResult, ErrorCode};
use super::types::CheckKind;
use crate::utils::constants::{
    build_alchemy_url, get_public_rpc_fallback, DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_MS,
    DEFAULT_CACHE_TTL_SECS, DEFAULT_FAILOVER_THRESHOLD, DEFAULT_PEG_STATE_RETENTION_SECS, DEFAULT_MAX_RETRIES,
    DEFAULT_PRICE_FEED_URL, DEFAULT_REQUESTS_PER_SECOND, DEFAULT_RPC_TIMEOUT_MS,
    CHAIN_ID_ARBITRUM, CHAIN_ID_AVALANCHE, CHAIN_ID_BASE, CHAIN_ID_BSC, CHAIN_ID_ETHEREUM,
    CHAIN_ID_OPTIMISM, CHAIN_ID_POLYGON, SUPPORTED_CHAIN_IDS,
};

// ============================================
// GATEWAY CONFIGURATION
// ============================================

/// Per-chain gateway settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainGatewayConfig {
    /// RPC endpoints in failover order
    pub endpoints: Vec<String>,
    /// Price feed base URL (DexScreener-compatible)
    #[serde(default = "default_price_feed")]
    pub price_feed: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
    /// Consecutive failures before routing to the next endpoint
    #[serde(default = "default_failover_threshold")]
    pub failover_threshold: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_price_feed() -> String {
    DEFAULT_PRICE_FEED_URL.to_string()
}
fn default_timeout_ms() -> u64 {
    DEFAULT_RPC_TIMEOUT_MS
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_requests_per_second() -> f64 {
    DEFAULT_REQUESTS_PER_SECOND
}
fn default_failover_threshold() -> u32 {
    DEFAULT_FAILOVER_THRESHOLD
}
fn default_backoff_base_ms() -> u64 {
    DEFAULT_BACKOFF_BASE_MS
}
fn default_backoff_max_ms() -> u64 {
    DEFAULT_BACKOFF_MAX_MS
}

impl ChainGatewayConfig {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            price_feed: default_price_feed(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            requests_per_second: default_requests_per_second(),
            failover_threshold: default_failover_threshold(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self, chain_id: u64) -> AppResult<()> {
        if self.endpoints.is_empty() {
            return Err(AppError::invalid_config(format!(
                "chain {}: at least one endpoint is required",
                chain_id
            )));
        }
        if self.timeout_ms == 0 {
            return Err(AppError::invalid_config(format!("chain {}: timeoutMs must be > 0", chain_id)));
        }
        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return Err(AppError::invalid_config(format!(
                "chain {}: requestsPerSecond must be > 0",
                chain_id
            )));
        }
        if self.failover_threshold == 0 {
            return Err(AppError::invalid_config(format!(
                "chain {}: failoverThreshold must be > 0",
                chain_id
            )));
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(AppError::invalid_config(format!(
                "chain {}: backoffBaseMs exceeds backoffMaxMs",
                chain_id
            )));
        }
        Ok(())
    }
}

/// Injectable gateway configuration keyed by chain id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub chains: HashMap<u64, ChainGatewayConfig>,
}

impl GatewayConfig {
    pub fn with_chain(mut self, chain_id: u64, config: ChainGatewayConfig) -> Self {
        self.chains.insert(chain_id, config);
        self
    }

    pub fn chain(&self, chain_id: u64) -> Option<&ChainGatewayConfig> {
        self.chains.get(&chain_id)
    }

    /// Parse from JSON: `{"chains": {"1": {"endpoints": [...], "timeoutMs": 5000, ...}}}`
    pub fn from_json(raw: &str) -> AppResult<Self> {
        let config: Self = serde_json::from_str(raw).map_err(|e| {
            AppError::with_source(ErrorCode::ConfigParseError, "invalid gateway config JSON", e)
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        for (chain_id, chain) in &self.chains {
            chain.validate(*chain_id)?;
        }
        Ok(())
    }

    /// Build from environment.
    ///
    /// For each supported chain: `<CHAIN>_HTTP_URL` (comma-separated list), then
    /// an Alchemy URL if `ALCHEMY_API_KEY` is set, then the public fallback RPC.
    /// The key itself is never logged.
    pub fn from_env() -> Self {
        let alchemy_key = std::env::var("ALCHEMY_API_KEY")
            .ok()
            .filter(|k| !k.is_empty() && k != "YOUR_API_KEY");
        if alchemy_key.is_some() {
            info!("🔑 ALCHEMY_API_KEY configured (key hidden for security)");
        }
        let price_feed =
            std::env::var("PRICE_FEED_URL").unwrap_or_else(|_| DEFAULT_PRICE_FEED_URL.to_string());

        let mut chains = HashMap::new();
        for &chain_id in &SUPPORTED_CHAIN_IDS {
            let mut endpoints: Vec<String> = std::env::var(chain_env_key(chain_id))
                .ok()
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default();

            if let Some(url) = alchemy_key.as_ref().and_then(|k| build_alchemy_url(chain_id, k)) {
                if !endpoints.contains(&url) {
                    endpoints.push(url);
                }
            }
            if let Some(fallback) = get_public_rpc_fallback(chain_id) {
                if !endpoints.iter().any(|e| e == fallback) {
                    endpoints.push(fallback.to_string());
                }
            }
            if endpoints.is_empty() {
                continue;
            }

            let mut chain = ChainGatewayConfig::new(endpoints);
            chain.price_feed = price_feed.clone();
            if let Some(ms) = env_parse::<u64>("GATEWAY_TIMEOUT_MS") {
                chain.timeout_ms = ms;
            }
            if let Some(retries) = env_parse::<u32>("GATEWAY_MAX_RETRIES") {
                chain.max_retries = retries;
            }
            if let Some(rps) = env_parse::<f64>("GATEWAY_REQUESTS_PER_SECOND") {
                chain.requests_per_second = rps;
            }
            chains.insert(chain_id, chain);
        }

        Self { chains }
    }
}

fn chain_env_key(chain_id: u64) -> &'static str {
    match chain_id {
        CHAIN_ID_ETHEREUM => "ETH_HTTP_URL",
        CHAIN_ID_BSC => "BSC_HTTP_URL",
        CHAIN_ID_POLYGON => "POLYGON_HTTP_URL",
        CHAIN_ID_ARBITRUM => "ARBITRUM_HTTP_URL",
        CHAIN_ID_OPTIMISM => "OPTIMISM_HTTP_URL",
        CHAIN_ID_AVALANCHE => "AVALANCHE_HTTP_URL",
        CHAIN_ID_BASE => "BASE_HTTP_URL",
        _ => "",
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

// ============================================
// RISK CONFIGURATION
// ============================================

/// Fixed per-kind weights of the composite score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckWeights {
    pub honeypot: f64,
    pub peg: f64,
    pub hygiene: f64,
}

impl Default for CheckWeights {
    fn default() -> Self {
        Self {
            honeypot: 0.6,
            peg: 0.3,
            hygiene: 0.1,
        }
    }
}

impl CheckWeights {
    pub fn weight(&self, kind: CheckKind) -> f64 {
        match kind {
            CheckKind::Honeypot => self.honeypot,
            CheckKind::Peg => self.peg,
            CheckKind::Hygiene => self.hygiene,
        }
    }
}

/// Lower bounds (inclusive) of each tier; below `high_risk` is Critical
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub safe: f64,
    pub caution: f64,
    pub high_risk: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            safe: 80.0,
            caution: 50.0,
            high_risk: 25.0,
        }
    }
}

/// Peg deviation classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PegConfig {
    /// Deviation at or above which the asset is (minor) depegged
    pub minor_threshold: f64,
    /// Deviation above which the depeg is major
    pub major_threshold: f64,
    /// Fraction of a threshold the deviation must fall below to leave that state
    pub hysteresis_factor: f64,
    /// How long a subject's last classification is remembered without a new observation
    pub state_retention_secs: u64,
}

impl PegConfig {
    pub fn state_retention(&self) -> Duration {
        Duration::from_secs(self.state_retention_secs)
    }
}

impl Default for PegConfig {
    fn default() -> Self {
        Self {
            minor_threshold: 0.005,
            major_threshold: 0.02,
            hysteresis_factor: 0.5,
            state_retention_secs: DEFAULT_PEG_STATE_RETENTION_SECS,
        }
    }
}

/// Buy/sell simulation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoneypotConfig {
    /// Notional spent on the simulated buy, in native units (e.g. 0.01 ETH)
    pub notional_native: f64,
    /// Per-leg shortfall against the quote above which the token fails
    pub max_leg_tax: f64,
}

impl Default for HoneypotConfig {
    fn default() -> Self {
        Self {
            notional_native: 0.01,
            max_leg_tax: 0.10,
        }
    }
}

/// Symbol hygiene parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HygieneConfig {
    /// Max edit distance to a known symbol that counts as impersonation
    pub impersonation_distance: usize,
}

impl Default for HygieneConfig {
    fn default() -> Self {
        Self {
            impersonation_distance: 1,
        }
    }
}

/// Aggregator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub weights: CheckWeights,
    pub tiers: TierThresholds,
    /// Reports below this overall confidence are at least `Caution`
    pub confidence_floor: f64,
    /// Overall evaluation deadline
    pub deadline_ms: u64,
    pub cache_ttl_secs: u64,
    /// Global bound on concurrently computing evaluations
    pub max_in_flight: usize,
    pub peg: PegConfig,
    pub honeypot: HoneypotConfig,
    pub hygiene: HygieneConfig,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            weights: CheckWeights::default(),
            tiers: TierThresholds::default(),
            confidence_floor: 0.5,
            deadline_ms: 8_000,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_in_flight: 32,
            peg: PegConfig::default(),
            honeypot: HoneypotConfig::default(),
            hygiene: HygieneConfig::default(),
        }
    }
}

impl RiskConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Defaults overridden by `RISK_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ttl) = env_parse::<u64>("RISK_CACHE_TTL_SECS") {
            config.cache_ttl_secs = ttl;
        }
        if let Some(ms) = env_parse::<u64>("RISK_DEADLINE_MS") {
            config.deadline_ms = ms;
        }
        if let Some(n) = env_parse::<usize>("RISK_MAX_IN_FLIGHT") {
            config.max_in_flight = n;
        }
        if let Some(floor) = env_parse::<f64>("RISK_CONFIDENCE_FLOOR") {
            config.confidence_floor = floor;
        }
        if let Some(secs) = env_parse::<u64>("RISK_PEG_STATE_RETENTION_SECS") {
            config.peg.state_retention_secs = secs;
        }
        config
    }

    pub fn validate(&self) -> AppResult<()> {
        let w = &self.weights;
        for (name, value) in [("honeypot", w.honeypot), ("peg", w.peg), ("hygiene", w.hygiene)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(AppError::invalid_config(format!("weight {} must be > 0", name)));
            }
        }
        let t = &self.tiers;
        if !(t.safe > t.caution && t.caution > t.high_risk && t.high_risk > 0.0 && t.safe <= 100.0) {
            return Err(AppError::invalid_config(
                "tier thresholds must satisfy 100 >= safe > caution > high_risk > 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(AppError::invalid_config("confidence_floor must be within 0..=1"));
        }
        if self.deadline_ms == 0 {
            return Err(AppError::invalid_config("deadline_ms must be > 0"));
        }
        if self.max_in_flight == 0 {
            return Err(AppError::invalid_config("max_in_flight must be > 0"));
        }
        let p = &self.peg;
        if !(p.minor_threshold > 0.0 && p.major_threshold > p.minor_threshold) {
            return Err(AppError::invalid_config("peg thresholds must satisfy 0 < minor < major"));
        }
        if !(p.hysteresis_factor > 0.0 && p.hysteresis_factor <= 1.0) {
            return Err(AppError::invalid_config("peg hysteresis_factor must be within (0, 1]"));
        }
        if p.state_retention_secs == 0 {
            return Err(AppError::invalid_config("peg state_retention_secs must be > 0"));
        }
        if !(self.honeypot.notional_native > 0.0) {
            return Err(AppError::invalid_config("honeypot notional must be > 0"));
        }
        if !(self.honeypot.max_leg_tax > 0.0 && self.honeypot.max_leg_tax < 1.0) {
            return Err(AppError::invalid_config("honeypot max_leg_tax must be within (0, 1)"));
        }
        Ok(())
    }
}
