//! Chain Data Gateway contract
//!
//! `fetch(request) -> response`. Exhausted retries, timeouts, and unsupported
//! methods all come back as `GatewayResponse::Unavailable`: callers treat it as
//! a first-class outcome, never as an error to propagate.

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;

/// One call inside a simulated bundle
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl CallRequest {
    pub fn new(from: Address, to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            from,
            to,
            value: U256::ZERO,
            data: data.into(),
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// 4-byte function selector, if present
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.data.get(..4).and_then(|s| s.try_into().ok())
    }
}

/// Requests understood by the gateway
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayRequest {
    /// Execute `calls` sequentially against latest state, each seeing the
    /// effects of the previous ones. `caller_balance` funds every distinct
    /// sender via state override.
    SimulateCall {
        chain_id: u64,
        calls: Vec<CallRequest>,
        caller_balance: U256,
    },
    /// Deployed bytecode at `address`
    GetBytecode { chain_id: u64, address: Address },
    /// Quoted price of `address` in its pegged unit (USD)
    GetPrice { chain_id: u64, address: Address },
}

impl GatewayRequest {
    pub fn chain_id(&self) -> u64 {
        match self {
            GatewayRequest::SimulateCall { chain_id, .. }
            | GatewayRequest::GetBytecode { chain_id, .. }
            | GatewayRequest::GetPrice { chain_id, .. } => *chain_id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GatewayRequest::SimulateCall { .. } => "simulateCall",
            GatewayRequest::GetBytecode { .. } => "getBytecode",
            GatewayRequest::GetPrice { .. } => "getPrice",
        }
    }
}

/// Per-call result inside a simulated bundle
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Success(Bytes),
    Reverted(String),
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }
}

/// Gateway answers
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayResponse {
    Simulation(Vec<CallOutcome>),
    Bytecode(Bytes),
    Price(f64),
    /// Network/timeout/provider exhaustion or unsupported request
    Unavailable(String),
}

impl GatewayResponse {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GatewayResponse::Unavailable(_))
    }
}

/// Abstraction over chain data providers.
///
/// Implementations must be cancel-safe: dropping the returned future cancels
/// any in-flight network call.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    async fn fetch(&self, request: GatewayRequest) -> GatewayResponse;
}
