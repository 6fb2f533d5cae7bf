//! Risk Scoring Module
//! Weighted composite of per-check sub-scores, tier mapping, confidence floor
//!
//! - Composite: weighted average over *available* checks only
//! - Confidence: mean check confidence over all applicable checks, so every
//!   unavailable check drags it down proportionally
//! - Tier: Safe ≥ 80, Caution ≥ 50, High-Risk ≥ 25, else Critical; a report
//!   below the confidence floor is at least Caution

use serde::{Deserialize, Serialize};

use crate::models::{CheckKind, CheckResult, CheckWeights, RiskConfig, RiskTier, TierThresholds};

/// Composite score when no check produced evidence
pub const NEUTRAL_SCORE: f64 = 50.0;

/// One check's contribution to the composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactor {
    pub kind: CheckKind,
    pub score: f64,
    pub weight: f64,
    pub available: bool,
}

/// Scored, tiered outcome of a set of checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub score: f64,
    pub tier: RiskTier,
    pub confidence: f64,
    pub confidence_floor_applied: bool,
    pub breakdown: Vec<ScoreFactor>,
}

/// Σ w·s / Σ w over available checks
pub fn composite(checks: &[CheckResult], weights: &CheckWeights) -> f64 {
    let (weighted, total_weight) = checks
        .iter()
        .filter(|c| c.is_available())
        .fold((0.0, 0.0), |(num, den), c| {
            let w = weights.weight(c.kind);
            (num + w * c.score, den + w)
        });

    if total_weight > 0.0 {
        (weighted / total_weight).clamp(0.0, 100.0)
    } else {
        NEUTRAL_SCORE
    }
}

/// Mean confidence over applicable checks; unavailable checks count as 0
pub fn overall_confidence(checks: &[CheckResult]) -> f64 {
    if checks.is_empty() {
        return 0.0;
    }
    let sum: f64 = checks.iter().map(|c| c.confidence).sum();
    (sum / checks.len() as f64).clamp(0.0, 1.0)
}

pub fn tier_for(score: f64, thresholds: &TierThresholds) -> RiskTier {
    if score >= thresholds.safe {
        RiskTier::Safe
    } else if score >= thresholds.caution {
        RiskTier::Caution
    } else if score >= thresholds.high_risk {
        RiskTier::HighRisk
    } else {
        RiskTier::Critical
    }
}

/// Score a complete set of check results
pub fn score_checks(checks: &[CheckResult], config: &RiskConfig) -> CompositeScore {
    let score = composite(checks, &config.weights);
    let confidence = overall_confidence(checks);
    let raw_tier = tier_for(score, &config.tiers);

    // Absence of evidence is not evidence of safety
    let below_floor = confidence < config.confidence_floor;
    let tier = if below_floor { raw_tier.max(RiskTier::Caution) } else { raw_tier };

    let breakdown = checks
        .iter()
        .map(|c| ScoreFactor {
            kind: c.kind,
            score: c.score,
            weight: config.weights.weight(c.kind),
            available: c.is_available(),
        })
        .collect();

    CompositeScore {
        score,
        tier,
        confidence,
        confidence_floor_applied: tier != raw_tier,
        breakdown,
    }
}
