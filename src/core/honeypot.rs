//! Honeypot Detector - simulated Buy → Approve → Sell cycle
//!
//! PERS algorithm over the Chain Data Gateway:
//! 1. RANDOM caller address (prevents whitelist bypass)
//! 2. Bundle 1: quote, buy, read token balance → buy tax
//! 3. Bundle 2: buy, approve, quote sell, sell, read WETH balance → sell tax
//! 4. Sell revert ⇒ confirmed honeypot
//!
//! If the simulation cannot run (no venue, no pair, provider without
//! `eth_simulateV1`, gateway unavailable) the verdict comes from bytecode
//! heuristics instead. A failed simulation never triggers the fallback.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::heuristics::{scan_bytecode, HeuristicResult};
use crate::models::{AppError, AppResult, CheckKind, CheckResult, HoneypotConfig, TokenRef};
use crate::providers::{CallOutcome, CallRequest, ChainGateway, GatewayRequest, GatewayResponse};
use crate::utils::constants::{eth_to_wei, get_chain_name, get_primary_router, get_weth_address};

/// Router and ERC20 ABI used by the simulation legs
pub mod abi {
    use alloy_sol_types::sol;

    sol! {
        // ERC20 functions
        function balanceOf(address account) external view returns (uint256 balance);
        function approve(address spender, uint256 amount) external returns (bool);

        // Uniswap V2 Router
        function getAmountsOut(
            uint256 amountIn,
            address[] calldata path
        ) external view returns (uint256[] memory amounts);

        function swapExactETHForTokensSupportingFeeOnTransferTokens(
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external payable;

        function swapExactTokensForTokensSupportingFeeOnTransferTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external;
    }
}

/// Native balance given to the simulated caller (100 ETH)
const SIM_CALLER_BALANCE_ETH: f64 = 100.0;

const BUY_REVERT_SCORE: f64 = 20.0;
const BUY_REVERT_CONFIDENCE: f64 = 0.7;
const APPROVE_REVERT_SCORE: f64 = 10.0;
const APPROVE_REVERT_CONFIDENCE: f64 = 0.9;
const SELL_REVERT_CONFIDENCE: f64 = 0.95;
const HIGH_TAX_MAX_SCORE: f64 = 30.0;
const HIGH_TAX_CONFIDENCE: f64 = 0.85;
const PASS_MIN_SCORE: f64 = 60.0;
const PASS_CONFIDENCE: f64 = 0.9;

/// Verdict of a simulation that ran to completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub is_honeypot: bool,
    pub reason: String,
    pub buy_success: bool,
    pub sell_success: bool,
    /// Sell reverted (critical honeypot indicator)
    pub sell_reverted: bool,
    /// Buy-side shortfall against the router quote, 0-1
    pub buy_tax: f64,
    /// Sell-side shortfall against the router quote, 0-1
    pub sell_tax: f64,
    pub score: f64,
    pub confidence: f64,
    pub findings: Vec<String>,
}

impl SimulationResult {
    fn honeypot(
        reason: String,
        buy_success: bool,
        sell_reverted: bool,
        score: f64,
        confidence: f64,
        findings: Vec<String>,
    ) -> Self {
        Self {
            is_honeypot: true,
            reason,
            buy_success,
            sell_success: false,
            sell_reverted,
            buy_tax: if buy_success { 0.0 } else { 1.0 },
            sell_tax: 1.0,
            score,
            confidence,
            findings,
        }
    }

    /// Summary for display
    pub fn summary(&self) -> String {
        if self.is_honeypot {
            format!(
                "🚨 HONEYPOT DETECTED | Reason: {} | Buy: {} | Sell: {} | Reverted: {}",
                self.reason,
                if self.buy_success { "✅" } else { "❌" },
                if self.sell_success { "✅" } else { "❌" },
                if self.sell_reverted { "⛔" } else { "✅" },
            )
        } else {
            format!(
                "✅ SAFE | Buy Tax: {:.2}% | Sell Tax: {:.2}%",
                self.buy_tax * 100.0,
                self.sell_tax * 100.0
            )
        }
    }
}

/// Simulation verdict, or static verdict when simulation was unavailable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum HoneypotVerdict {
    Simulation(SimulationResult),
    Heuristic(HeuristicResult),
}

impl HoneypotVerdict {
    pub fn is_simulation(&self) -> bool {
        matches!(self, HoneypotVerdict::Simulation(_))
    }

    pub fn to_check_result(&self) -> CheckResult {
        match self {
            HoneypotVerdict::Simulation(sim) => {
                let mut evidence = vec![sim.summary()];
                evidence.extend(sim.findings.iter().cloned());
                if sim.is_honeypot {
                    CheckResult::fail(CheckKind::Honeypot, sim.score, sim.confidence, evidence)
                } else {
                    CheckResult::pass(CheckKind::Honeypot, sim.score, sim.confidence, evidence)
                }
            }
            HoneypotVerdict::Heuristic(static_result) => static_result.to_check_result(),
        }
    }
}

/// Lossy U256 → f64 for ratios
fn to_f64(value: U256) -> f64 {
    let shift = value.bit_len().saturating_sub(128);
    let mantissa = u128::try_from(value >> shift).unwrap_or(u128::MAX) as f64;
    mantissa * 2f64.powi(shift as i32)
}

/// Shortfall of `actual` against `expected`, clamped to 0-1
fn shortfall(expected: U256, actual: U256) -> f64 {
    if expected.is_zero() {
        return 0.0;
    }
    (1.0 - to_f64(actual) / to_f64(expected)).clamp(0.0, 1.0)
}

fn revert_reason(outcome: &CallOutcome) -> Option<&str> {
    match outcome {
        CallOutcome::Reverted(reason) => Some(reason.as_str()),
        CallOutcome::Success(_) => None,
    }
}

fn return_data(outcome: &CallOutcome) -> &[u8] {
    match outcome {
        CallOutcome::Success(data) => data.as_ref(),
        CallOutcome::Reverted(_) => &[],
    }
}

fn decode_last_amount(outcome: &CallOutcome) -> AppResult<U256> {
    let decoded = abi::getAmountsOutCall::abi_decode_returns(return_data(outcome), true)
        .map_err(|e| AppError::invalid_response(format!("getAmountsOut decode: {}", e)))?;
    decoded
        .amounts
        .last()
        .copied()
        .ok_or_else(|| AppError::invalid_response("getAmountsOut returned no amounts"))
}

fn decode_balance(outcome: &CallOutcome) -> AppResult<U256> {
    abi::balanceOfCall::abi_decode_returns(return_data(outcome), true)
        .map(|r| r.balance)
        .map_err(|e| AppError::invalid_response(format!("balanceOf decode: {}", e)))
}

/// Generate a random address for simulation
fn generate_random_address() -> Address {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill(&mut bytes);
    Address::from(bytes)
}

/// Trading venue for the simulation
#[derive(Debug, Clone, Copy)]
struct Venue {
    router_name: &'static str,
    router: Address,
    weth: Address,
}

/// Honeypot detector over the Chain Data Gateway
pub struct HoneypotDetector {
    gateway: Arc<dyn ChainGateway>,
    config: HoneypotConfig,
}

impl HoneypotDetector {
    pub fn new(gateway: Arc<dyn ChainGateway>, config: HoneypotConfig) -> Self {
        Self { gateway, config }
    }

    /// Honeypot check result for a token
    pub async fn check(&self, token: &TokenRef) -> CheckResult {
        match self.detect(token).await {
            Ok(verdict) => verdict.to_check_result(),
            Err(e) => {
                warn!("⚠️ Honeypot check unavailable for {}: {}", token.key(), e);
                CheckResult::unavailable(CheckKind::Honeypot, e.message)
            }
        }
    }

    /// Simulate, falling back to bytecode heuristics only when the
    /// simulation is unavailable. `Err` means neither path could run.
    pub async fn detect(&self, token: &TokenRef) -> AppResult<HoneypotVerdict> {
        let address = token.parsed_address()?;

        match self.simulate(token.chain_id, address).await {
            Ok(result) => {
                if result.is_honeypot {
                    warn!("🚨 {} on {}: {}", token.symbol, get_chain_name(token.chain_id), result.summary());
                } else {
                    info!("🍯 {} on {}: {}", token.symbol, get_chain_name(token.chain_id), result.summary());
                }
                Ok(HoneypotVerdict::Simulation(result))
            }
            Err(e) => {
                info!("🔄 Simulation unavailable for {} ({}), using bytecode heuristics", token.key(), e.message);
                let code = self.bytecode(token.chain_id, address).await.map_err(|fallback| {
                    AppError::unsupported(format!(
                        "simulation unavailable ({}); bytecode unavailable ({})",
                        e.message, fallback.message
                    ))
                })?;
                Ok(HoneypotVerdict::Heuristic(scan_bytecode(&code)))
            }
        }
    }

    async fn bytecode(&self, chain_id: u64, address: Address) -> AppResult<Bytes> {
        match self.gateway.fetch(GatewayRequest::GetBytecode { chain_id, address }).await {
            GatewayResponse::Bytecode(code) => Ok(code),
            GatewayResponse::Unavailable(reason) => Err(AppError::unsupported(reason)),
            other => Err(AppError::invalid_response(format!("unexpected response: {:?}", other))),
        }
    }

    async fn run_bundle(&self, chain_id: u64, calls: Vec<CallRequest>) -> AppResult<Vec<CallOutcome>> {
        let expected = calls.len();
        let request = GatewayRequest::SimulateCall {
            chain_id,
            calls,
            caller_balance: eth_to_wei(SIM_CALLER_BALANCE_ETH),
        };
        match self.gateway.fetch(request).await {
            GatewayResponse::Simulation(outcomes) if outcomes.len() == expected => Ok(outcomes),
            GatewayResponse::Simulation(outcomes) => Err(AppError::invalid_response(format!(
                "simulation returned {} outcomes for {} calls",
                outcomes.len(),
                expected
            ))),
            GatewayResponse::Unavailable(reason) => Err(AppError::unsupported(reason)),
            other => Err(AppError::invalid_response(format!("unexpected response: {:?}", other))),
        }
    }

    fn buy_call(&self, venue: &Venue, caller: Address, token: Address, notional: U256) -> CallRequest {
        let data = abi::swapExactETHForTokensSupportingFeeOnTransferTokensCall {
            amountOutMin: U256::ZERO,
            path: vec![venue.weth, token],
            to: caller,
            deadline: U256::MAX,
        }
        .abi_encode();
        CallRequest::new(caller, venue.router, data).with_value(notional)
    }

    /// `Err` means the simulation could not run and the fallback applies
    async fn simulate(&self, chain_id: u64, token: Address) -> AppResult<SimulationResult> {
        let venue = match (get_primary_router(chain_id), get_weth_address(chain_id)) {
            (Some((router_name, router)), Some(weth)) => Venue { router_name, router, weth },
            _ => {
                return Err(AppError::unsupported(format!(
                    "no trading venue on {}",
                    get_chain_name(chain_id)
                )))
            }
        };
        let caller = generate_random_address();
        let notional = eth_to_wei(self.config.notional_native);
        let max_tax = self.config.max_leg_tax;
        let mut findings = vec![format!("venue: {}", venue.router_name)];
        debug!("🧪 Simulating {} on {} from {}", token, venue.router_name, caller);

        // ============================================
        // BUNDLE 1: quote → buy → balance
        // ============================================
        let quote = abi::getAmountsOutCall { amountIn: notional, path: vec![venue.weth, token] }.abi_encode();
        let balance = abi::balanceOfCall { account: caller }.abi_encode();
        let buy_leg = self
            .run_bundle(
                chain_id,
                vec![
                    CallRequest::new(caller, venue.router, quote),
                    self.buy_call(&venue, caller, token, notional),
                    CallRequest::new(caller, token, balance),
                ],
            )
            .await?;

        if let Some(reason) = revert_reason(&buy_leg[0]) {
            // No pair or no liquidity: the venue cannot price the token
            return Err(AppError::unsupported(format!("buy quote reverted: {}", reason)));
        }
        let expected_tokens = decode_last_amount(&buy_leg[0])?;

        if let Some(reason) = revert_reason(&buy_leg[1]) {
            return Ok(SimulationResult::honeypot(
                format!("Buy reverted: {}", reason),
                false,
                false,
                BUY_REVERT_SCORE,
                BUY_REVERT_CONFIDENCE,
                findings,
            ));
        }
        let received = decode_balance(&buy_leg[2])?;
        if received.is_zero() {
            return Ok(SimulationResult::honeypot(
                "Buy returned 0 tokens".to_string(),
                false,
                false,
                BUY_REVERT_SCORE,
                BUY_REVERT_CONFIDENCE,
                findings,
            ));
        }
        let buy_tax = shortfall(expected_tokens, received);
        findings.push(format!("buy tax {:.2}%", buy_tax * 100.0));

        // ============================================
        // BUNDLE 2: buy → approve → quote → sell → WETH balance
        // ============================================
        let approve = abi::approveCall { spender: venue.router, amount: U256::MAX }.abi_encode();
        let sell_quote = abi::getAmountsOutCall { amountIn: received, path: vec![token, venue.weth] }.abi_encode();
        let sell = abi::swapExactTokensForTokensSupportingFeeOnTransferTokensCall {
            amountIn: received,
            amountOutMin: U256::ZERO,
            path: vec![token, venue.weth],
            to: caller,
            deadline: U256::MAX,
        }
        .abi_encode();
        let weth_balance = abi::balanceOfCall { account: caller }.abi_encode();

        let sell_leg = self
            .run_bundle(
                chain_id,
                vec![
                    self.buy_call(&venue, caller, token, notional),
                    CallRequest::new(caller, token, approve),
                    CallRequest::new(caller, venue.router, sell_quote),
                    CallRequest::new(caller, venue.router, sell),
                    CallRequest::new(caller, venue.weth, weth_balance),
                ],
            )
            .await?;

        if let Some(reason) = revert_reason(&sell_leg[0]) {
            return Ok(SimulationResult::honeypot(
                format!("Buy reverted: {}", reason),
                false,
                false,
                BUY_REVERT_SCORE,
                BUY_REVERT_CONFIDENCE,
                findings,
            ));
        }
        if let Some(reason) = revert_reason(&sell_leg[1]) {
            return Ok(SimulationResult::honeypot(
                format!("Approve reverted: {}", reason),
                true,
                false,
                APPROVE_REVERT_SCORE,
                APPROVE_REVERT_CONFIDENCE,
                findings,
            ));
        }
        if let Some(reason) = revert_reason(&sell_leg[2]).or_else(|| revert_reason(&sell_leg[3])) {
            // ⛔ SELL REVERTED = HONEYPOT
            findings.push(format!("SELL REVERTED: {}", reason));
            return Ok(SimulationResult::honeypot(
                format!("⛔ SELL REVERTED: {}", reason),
                true,
                true,
                0.0,
                SELL_REVERT_CONFIDENCE,
                findings,
            ));
        }

        let expected_native = decode_last_amount(&sell_leg[2])?;
        let returned = decode_balance(&sell_leg[4])?;
        if returned.is_zero() {
            return Ok(SimulationResult::honeypot(
                "Sell returned 0 WETH - cannot sell tokens".to_string(),
                true,
                false,
                0.0,
                SELL_REVERT_CONFIDENCE,
                findings,
            ));
        }
        let sell_tax = shortfall(expected_native, returned);
        findings.push(format!("sell tax {:.2}%", sell_tax * 100.0));

        let worst = buy_tax.max(sell_tax);
        if worst > max_tax {
            return Ok(SimulationResult {
                is_honeypot: true,
                reason: format!("Extreme tax: {:.2}% per leg", worst * 100.0),
                buy_success: true,
                sell_success: true,
                sell_reverted: false,
                buy_tax,
                sell_tax,
                score: HIGH_TAX_MAX_SCORE * (1.0 - worst),
                confidence: HIGH_TAX_CONFIDENCE,
                findings,
            });
        }

        Ok(SimulationResult {
            is_honeypot: false,
            reason: "Token passed buy/sell simulation".to_string(),
            buy_success: true,
            sell_success: true,
            sell_reverted: false,
            buy_tax,
            sell_tax,
            score: (100.0 - (buy_tax + sell_tax) * 200.0).clamp(PASS_MIN_SCORE, 100.0),
            confidence: PASS_CONFIDENCE,
            findings,
        })
    }
}
