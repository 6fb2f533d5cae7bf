//! Type definitions for the risk engine
//! Subjects, per-check results, and the composite report

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::errors::{AppError, AppResult};

// ============================================
// SUBJECTS
// ============================================

/// Peg target for assets tagged as pegged (e.g. stablecoins)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PegTarget {
    /// Target price in the pegged unit (1.00 for USD stables)
    pub target: f64,
}

impl Default for PegTarget {
    fn default() -> Self {
        Self { target: 1.0 }
    }
}

/// A token as supplied by the caller. Identity is (chain_id, address).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRef {
    pub chain_id: u64,
    /// Contract address, 0x-prefixed hex
    pub address: String,
    /// Raw symbol exactly as reported by the contract
    pub symbol: String,
    /// Raw name exactly as reported by the contract
    pub name: String,
    pub decimals: u8,
    /// Set when the token is a pegged asset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peg: Option<PegTarget>,
}

impl TokenRef {
    pub fn new(
        chain_id: u64,
        address: impl Into<String>,
        symbol: impl Into<String>,
        name: impl Into<String>,
        decimals: u8,
    ) -> Self {
        Self {
            chain_id,
            address: address.into(),
            symbol: symbol.into(),
            name: name.into(),
            decimals,
            peg: None,
        }
    }

    /// Tag this token as pegged to `target`
    pub fn pegged(mut self, target: f64) -> Self {
        self.peg = Some(PegTarget { target });
        self
    }

    /// Parse the contract address, rejecting anything that is not 0x + 40 hex chars
    pub fn parsed_address(&self) -> AppResult<Address> {
        parse_address(&self.address)
    }

    /// Structural validation (chain id, address format)
    pub fn validate(&self) -> AppResult<()> {
        if self.chain_id == 0 {
            return Err(AppError::invalid_subject("chain_id must be non-zero"));
        }
        self.parsed_address()?;
        if let Some(peg) = self.peg {
            if !peg.target.is_finite() || peg.target <= 0.0 {
                return Err(AppError::invalid_subject(format!(
                    "peg target must be positive, got {}",
                    peg.target
                )));
            }
        }
        Ok(())
    }

    pub fn key(&self) -> SubjectKey {
        SubjectKey::Token {
            chain_id: self.chain_id,
            address: self.address.trim().to_lowercase(),
        }
    }
}

/// A liquidity pool. A pool without a traded token is not honeypot-checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRef {
    pub chain_id: u64,
    /// Protocol identifier, e.g. "uniswap-v2"
    pub protocol: String,
    pub pool_id: String,
    /// Display label, e.g. "USDC/WETH"
    pub label: String,
    /// The traded (non-base) token of the pool, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenRef>,
}

impl PoolRef {
    pub fn new(
        chain_id: u64,
        protocol: impl Into<String>,
        pool_id: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            chain_id,
            protocol: protocol.into(),
            pool_id: pool_id.into(),
            label: label.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: TokenRef) -> Self {
        self.token = Some(token);
        self
    }
}

/// What is being evaluated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Subject {
    Token(TokenRef),
    Pool(PoolRef),
}

impl Subject {
    /// Cache identity
    pub fn key(&self) -> SubjectKey {
        match self {
            Subject::Token(token) => token.key(),
            Subject::Pool(pool) => SubjectKey::Pool {
                protocol: pool.protocol.trim().to_lowercase(),
                pool_id: pool.pool_id.trim().to_lowercase(),
            },
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Subject::Token(token) => token.chain_id,
            Subject::Pool(pool) => pool.chain_id,
        }
    }

    /// The token whose trading behavior is checked, if any
    pub fn traded_token(&self) -> Option<&TokenRef> {
        match self {
            Subject::Token(token) => Some(token),
            Subject::Pool(pool) => pool.token.as_ref(),
        }
    }

    /// Peg target if the subject is tagged as a pegged asset
    pub fn peg(&self) -> Option<PegTarget> {
        self.traded_token().and_then(|t| t.peg)
    }

    /// Checks that apply to this subject, in report order
    pub fn profile(&self) -> CheckProfile {
        let mut kinds = Vec::with_capacity(3);
        if self.traded_token().is_some() {
            kinds.push(CheckKind::Honeypot);
        }
        if self.peg().is_some() {
            kinds.push(CheckKind::Peg);
        }
        kinds.push(CheckKind::Hygiene);
        CheckProfile { kinds, peg: self.peg() }
    }

    /// Structural validation, surfaced to the caller before any check runs
    pub fn validate(&self) -> AppResult<()> {
        match self {
            Subject::Token(token) => token.validate(),
            Subject::Pool(pool) => {
                if pool.chain_id == 0 {
                    return Err(AppError::invalid_subject("chain_id must be non-zero"));
                }
                if pool.protocol.trim().is_empty() {
                    return Err(AppError::invalid_subject("pool protocol is empty"));
                }
                if pool.pool_id.trim().is_empty() {
                    return Err(AppError::invalid_subject("pool id is empty"));
                }
                if let Some(token) = &pool.token {
                    if token.chain_id != pool.chain_id {
                        return Err(AppError::invalid_subject(format!(
                            "pool token is on chain {} but pool is on chain {}",
                            token.chain_id, pool.chain_id
                        )));
                    }
                    token.validate()?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Token(token) => write!(f, "{} ({})", token.symbol, token.key()),
            Subject::Pool(pool) => write!(f, "{} ({})", pool.label, self.key()),
        }
    }
}

/// Cache key: (chain, address) for tokens, (protocol, pool id) for pools
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectKey {
    Token { chain_id: u64, address: String },
    Pool { protocol: String, pool_id: String },
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKey::Token { chain_id, address } => write!(f, "{}:{}", chain_id, address),
            SubjectKey::Pool { protocol, pool_id } => write!(f, "{}/{}", protocol, pool_id),
        }
    }
}

/// The check set a subject is evaluated with. Two requests for the same
/// key share a report only when their profiles match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckProfile {
    pub kinds: Vec<CheckKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peg: Option<PegTarget>,
}

/// Parse a 0x-prefixed, 40-hex-char address
pub fn parse_address(raw: &str) -> AppResult<Address> {
    let trimmed = raw.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| AppError::invalid_address(format!("address must start with 0x: {}", raw)))?;
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::invalid_address(format!(
            "address must be 40 hex characters: {}",
            raw
        )));
    }
    Address::from_str(trimmed).map_err(|e| AppError::invalid_address(format!("{}: {}", raw, e)))
}

// ============================================
// CHECK RESULTS
// ============================================

/// Kind of check contributing to a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Honeypot,
    Peg,
    Hygiene,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Honeypot => "honeypot",
            CheckKind::Peg => "peg",
            CheckKind::Hygiene => "hygiene",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Pass,
    Fail,
    Unavailable,
}

/// Outcome of one check in one evaluation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub outcome: CheckOutcome,
    /// Sub-score 0-100, higher is safer
    pub score: f64,
    /// Confidence 0-1; always 0 for `Unavailable`
    pub confidence: f64,
    /// Ordered short findings
    pub evidence: Vec<String>,
    pub latency_ms: u64,
}

impl CheckResult {
    pub fn pass(kind: CheckKind, score: f64, confidence: f64, evidence: Vec<String>) -> Self {
        Self::build(kind, CheckOutcome::Pass, score, confidence, evidence)
    }

    pub fn fail(kind: CheckKind, score: f64, confidence: f64, evidence: Vec<String>) -> Self {
        Self::build(kind, CheckOutcome::Fail, score, confidence, evidence)
    }

    pub fn unavailable(kind: CheckKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            outcome: CheckOutcome::Unavailable,
            score: 0.0,
            confidence: 0.0,
            evidence: vec![reason.into()],
            latency_ms: 0,
        }
    }

    fn build(
        kind: CheckKind,
        outcome: CheckOutcome,
        score: f64,
        confidence: f64,
        evidence: Vec<String>,
    ) -> Self {
        Self {
            kind,
            outcome,
            score: score.clamp(0.0, 100.0),
            confidence: confidence.clamp(0.0, 1.0),
            evidence,
            latency_ms: 0,
        }
    }

    pub fn with_latency(mut self, elapsed: Duration) -> Self {
        self.latency_ms = elapsed.as_millis() as u64;
        self
    }

    pub fn is_available(&self) -> bool {
        self.outcome != CheckOutcome::Unavailable
    }
}

// ============================================
// REPORT
// ============================================

/// Coarse risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Safe,
    Caution,
    HighRisk,
    Critical,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Safe => "SAFE",
            RiskTier::Caution => "CAUTION",
            RiskTier::HighRisk => "HIGH_RISK",
            RiskTier::Critical => "CRITICAL",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            RiskTier::Safe => "✅",
            RiskTier::Caution => "🟡",
            RiskTier::HighRisk => "🔴",
            RiskTier::Critical => "💀",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite, explainable risk report. Read-only to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    /// Unique per computation; shared by every caller served from it
    pub id: Uuid,
    pub subject: Subject,
    /// Composite score 0-100, higher is safer
    pub composite_score: f64,
    pub tier: RiskTier,
    /// Overall confidence 0-1
    pub confidence: f64,
    /// True when the tier was raised by the confidence floor
    pub confidence_floor_applied: bool,
    pub checks: Vec<CheckResult>,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RiskReport {
    pub fn check(&self, kind: CheckKind) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.kind == kind)
    }

    /// At least one applicable check was unavailable
    pub fn is_degraded(&self) -> bool {
        self.checks.iter().any(|c| !c.is_available())
    }

    /// Pretty print the report
    pub fn summary(&self) -> String {
        let mut output = format!(
            "\n{} Tier: {} | Score: {:.1} | Confidence: {:.2} | {}\n",
            self.tier.emoji(),
            self.tier.as_str(),
            self.composite_score,
            self.confidence,
            self.subject
        );
        if self.confidence_floor_applied {
            output.push_str("   (tier raised: confidence below floor)\n");
        }
        for check in &self.checks {
            output.push_str(&format!(
                "   - {:<8} {:?} score={:.1} conf={:.2} {}ms\n",
                check.kind.as_str(),
                check.outcome,
                check.score,
                check.confidence,
                check.latency_ms
            ));
            for finding in &check.evidence {
                output.push_str(&format!("       • {}\n", finding));
            }
        }
        output
    }
}
