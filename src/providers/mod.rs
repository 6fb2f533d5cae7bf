//! Providers Module - External Data Sources
//!
//! The `ChainGateway` seam and its HTTP implementation: JSON-RPC simulation,
//! bytecode, and DexScreener-style price quotes.

pub mod dexscreener;
pub mod gateway;
pub mod rate_limit;
pub mod rpc;

pub use dexscreener::*;
pub use gateway::*;
pub use rate_limit::*;
pub use rpc::*;
