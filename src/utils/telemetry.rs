//! Evaluation statistics
//!
//! Lock-free counters updated on the evaluation hot path, with a
//! serializable snapshot for monitoring. No subject identifiers are kept.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::{RiskReport, RiskTier};

/// Counters shared by every evaluation of one aggregator
#[derive(Debug, Default)]
pub struct EvaluationStats {
    /// Reports computed (not served from cache)
    evaluations: AtomicU64,
    cache_hits: AtomicU64,
    single_flight_joins: AtomicU64,
    invalidations: AtomicU64,
    validation_errors: AtomicU64,
    /// Reports with at least one unavailable check
    degraded: AtomicU64,
    /// Checks whose task panicked or was lost
    contained_faults: AtomicU64,
    /// Checks cut off by the evaluation deadline
    deadline_misses: AtomicU64,
    total_latency_ms: AtomicU64,
    safe: AtomicU64,
    caution: AtomicU64,
    high_risk: AtomicU64,
    critical: AtomicU64,
}

/// Point-in-time copy of [`EvaluationStats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub evaluations: u64,
    pub cache_hits: u64,
    pub single_flight_joins: u64,
    pub invalidations: u64,
    pub validation_errors: u64,
    pub degraded: u64,
    pub contained_faults: u64,
    pub deadline_misses: u64,
    pub avg_latency_ms: f64,
    pub safe: u64,
    pub caution: u64,
    pub high_risk: u64,
    pub critical: u64,
}

impl EvaluationStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly computed report
    pub fn record_report(&self, report: &RiskReport, latency_ms: u64) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        if report.is_degraded() {
            self.degraded.fetch_add(1, Ordering::Relaxed);
        }
        let tier_counter = match report.tier {
            RiskTier::Safe => &self.safe,
            RiskTier::Caution => &self.caution,
            RiskTier::HighRisk => &self.high_risk,
            RiskTier::Critical => &self.critical,
        };
        tier_counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_join(&self) {
        self.single_flight_joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_error(&self) {
        self.validation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.contained_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deadline_miss(&self, checks: u64) {
        self.deadline_misses.fetch_add(checks, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let evaluations = self.evaluations.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);
        StatsSnapshot {
            evaluations,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            single_flight_joins: self.single_flight_joins.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            contained_faults: self.contained_faults.load(Ordering::Relaxed),
            deadline_misses: self.deadline_misses.load(Ordering::Relaxed),
            avg_latency_ms: if evaluations > 0 {
                total_latency as f64 / evaluations as f64
            } else {
                0.0
            },
            safe: self.safe.load(Ordering::Relaxed),
            caution: self.caution.load(Ordering::Relaxed),
            high_risk: self.high_risk.load(Ordering::Relaxed),
            critical: self.critical.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckKind, CheckResult, Subject, TokenRef};
    use chrono::Utc;
    use uuid::Uuid;

    fn report(tier: RiskTier, checks: Vec<CheckResult>) -> RiskReport {
        let now = Utc::now();
        RiskReport {
            id: Uuid::new_v4(),
            subject: Subject::Token(TokenRef::new(
                1,
                "0xdAC17F958D2ee523a2206206994597C13D831ec7",
                "USDT",
                "Tether USD",
                6,
            )),
            composite_score: 50.0,
            tier,
            confidence: 0.5,
            confidence_floor_applied: false,
            checks,
            generated_at: now,
            expires_at: now,
        }
    }

    #[test]
    fn test_collector_basic() {
        let stats = EvaluationStats::new();
        stats.record_report(&report(RiskTier::Safe, vec![]), 100);
        stats.record_report(
            &report(
                RiskTier::Caution,
                vec![CheckResult::unavailable(CheckKind::Honeypot, "timeout")],
            ),
            300,
        );
        stats.record_cache_hit();
        stats.record_join();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.evaluations, 2);
        assert_eq!(snapshot.degraded, 1);
        assert_eq!(snapshot.safe, 1);
        assert_eq!(snapshot.caution, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.single_flight_joins, 1);
        assert_eq!(snapshot.avg_latency_ms, 200.0);
    }

    #[test]
    fn test_snapshot_json() {
        let stats = EvaluationStats::new();
        stats.record_fault();
        let json = stats.snapshot().to_json();
        assert!(json.contains("\"contained_faults\": 1"));
    }
}
