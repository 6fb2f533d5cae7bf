//! Shared fixtures: a scripted in-memory gateway

#![allow(dead_code)]

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use ruster_risk::core::abi;
use ruster_risk::providers::CallOutcome;
use ruster_risk::utils::get_weth_address;
use ruster_risk::{ChainGateway, GatewayRequest, GatewayResponse, TokenRef};

pub const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
pub const SCAM: &str = "0x1111111111111111111111111111111111111111";

/// How the simulated venue behaves
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Market {
    /// 1% buy tax, 2% sell tax
    Healthy,
    /// The sell swap reverts
    SellReverts,
    /// Every request is unavailable
    Down,
}

pub struct ScriptedGateway {
    pub market: Market,
    pub price: Mutex<Option<f64>>,
    pub delay: Duration,
    pub calls: AtomicUsize,
    /// Requests that ran to the end (not cancelled mid-delay)
    pub completed: AtomicUsize,
    pub simulations: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(market: Market) -> Self {
        Self {
            market,
            price: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            simulations: AtomicUsize::new(0),
        }
    }

    pub fn with_price(self, price: f64) -> Self {
        self.set_price(price);
        self
    }

    /// Change the quoted price for subsequent requests
    pub fn set_price(&self, price: f64) {
        *self.price.lock().unwrap() = Some(price);
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn outcome(&self, call: &ruster_risk::providers::CallRequest, weth: Address) -> CallOutcome {
        let selector = call.selector().unwrap_or_default();
        if self.market == Market::SellReverts
            && selector == abi::swapExactTokensForTokensSupportingFeeOnTransferTokensCall::SELECTOR
        {
            return CallOutcome::Reverted("TRANSFER_FAILED".into());
        }
        if selector == abi::getAmountsOutCall::SELECTOR {
            let buy_quote = abi::getAmountsOutCall::abi_decode(&call.data, true)
                .map(|decoded| decoded.path[0] == weth)
                .unwrap_or(false);
            return if buy_quote { amounts(10, 1_000) } else { amounts(990, 1_000_000) };
        }
        if selector == abi::balanceOfCall::SELECTOR {
            return if call.to == weth { balance(980_000) } else { balance(990) };
        }
        CallOutcome::Success(Bytes::new())
    }
}

fn amounts(first: u64, last: u64) -> CallOutcome {
    CallOutcome::Success(
        abi::getAmountsOutCall::abi_encode_returns(&(vec![U256::from(first), U256::from(last)],)).into(),
    )
}

fn balance(value: u64) -> CallOutcome {
    CallOutcome::Success(abi::balanceOfCall::abi_encode_returns(&(U256::from(value),)).into())
}

#[async_trait]
impl ChainGateway for ScriptedGateway {
    async fn fetch(&self, request: GatewayRequest) -> GatewayResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.market == Market::Down {
            return GatewayResponse::Unavailable("all endpoints exhausted".into());
        }

        match request {
            GatewayRequest::SimulateCall { chain_id, calls, .. } => {
                self.simulations.fetch_add(1, Ordering::SeqCst);
                let Some(weth) = get_weth_address(chain_id) else {
                    return GatewayResponse::Unavailable("unknown chain".into());
                };
                GatewayResponse::Simulation(calls.iter().map(|c| self.outcome(c, weth)).collect())
            }
            GatewayRequest::GetBytecode { .. } => GatewayResponse::Bytecode(Bytes::from(vec![0x60, 0x00, 0x00])),
            GatewayRequest::GetPrice { .. } => match *self.price.lock().unwrap() {
                Some(price) => GatewayResponse::Price(price),
                None => GatewayResponse::Unavailable("no price".into()),
            },
        }
    }
}

pub fn usdc() -> TokenRef {
    TokenRef::new(1, USDC, "USDC", "USD Coin", 6).pegged(1.0)
}

pub fn scam_token() -> TokenRef {
    TokenRef::new(1, SCAM, "MOON", "Moon Rocket", 18)
}
