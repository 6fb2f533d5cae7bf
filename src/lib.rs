//! Ruster Risk Library
//!
//! Token and liquidity pool risk engine producing one explainable score per
//! subject from:
//! - Honeypot detection via simulated buy/approve/sell bundles, with a
//!   static bytecode fallback
//! - Symbol hygiene (invisible characters, homoglyphs, impersonation)
//! - Peg deviation with hysteresis for pegged assets
//!
//! Evaluations are deduplicated per subject, cached with a TTL, and bounded
//! by a deadline: provider outages degrade confidence, never the call.

pub mod core;
pub mod models;
pub mod providers;
pub mod utils;

pub use crate::core::{RiskAggregator, ReportSink, SymbolSanitizer, HoneypotDetector, PegChecker};
pub use models::{
    AppError, AppResult, CheckKind, CheckOutcome, CheckResult, ErrorCode, GatewayConfig, PoolRef,
    RiskConfig, RiskReport, RiskTier, Subject, SubjectKey, TokenRef,
};
pub use providers::{ChainGateway, GatewayRequest, GatewayResponse, HttpGateway};
pub use utils::{CacheStats, ReportCache, StatsSnapshot};
