//! Peg Deviation Checker
//!
//! Absolute deviation of the quoted price from the peg target, classified
//! with hysteresis so a noisy feed hovering around a threshold does not flip
//! the verdict on every evaluation. State is kept per subject and only
//! updated when a price was actually observed. History older than the
//! retention window is forgotten and swept out periodically.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::models::{CheckKind, CheckResult, PegConfig, PegTarget, SubjectKey, TokenRef};
use crate::providers::{ChainGateway, GatewayRequest, GatewayResponse};

const PEGGED_CONFIDENCE: f64 = 0.9;
const PEGGED_MIN_SCORE: f64 = 80.0;
const MINOR_DEPEG_SCORE: f64 = 40.0;
const MINOR_DEPEG_CONFIDENCE: f64 = 0.6;
const MAJOR_DEPEG_SCORE: f64 = 10.0;
const MAJOR_DEPEG_CONFIDENCE: f64 = 0.9;
/// Sweep stale states once per this many assessments
const PRUNE_EVERY: u64 = 256;

/// Last classification of a pegged subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PegState {
    Pegged,
    MinorDepeg,
    MajorDepeg,
}

#[derive(Debug, Clone, Copy)]
struct PegRecord {
    state: PegState,
    observed_at: Instant,
}

/// Absolute deviation of `price` from `target`, relative to the target
pub fn deviation(price: f64, target: f64) -> f64 {
    ((price - target) / target).abs()
}

/// Classify `deviation` given the previous state.
///
/// Entering a state uses the plain thresholds. Leaving a depegged state
/// requires the deviation to fall below `hysteresis_factor` times the
/// threshold that state was entered at.
pub fn classify(deviation: f64, previous: PegState, config: &PegConfig) -> PegState {
    let exit_minor = config.minor_threshold * config.hysteresis_factor;
    let exit_major = config.major_threshold * config.hysteresis_factor;

    match previous {
        PegState::Pegged => {
            if deviation > config.major_threshold {
                PegState::MajorDepeg
            } else if deviation >= config.minor_threshold {
                PegState::MinorDepeg
            } else {
                PegState::Pegged
            }
        }
        PegState::MinorDepeg => {
            if deviation > config.major_threshold {
                PegState::MajorDepeg
            } else if deviation < exit_minor {
                PegState::Pegged
            } else {
                PegState::MinorDepeg
            }
        }
        PegState::MajorDepeg => {
            if deviation < exit_minor {
                PegState::Pegged
            } else if deviation < exit_major {
                PegState::MinorDepeg
            } else {
                PegState::MajorDepeg
            }
        }
    }
}

/// Peg deviation checker with per-subject hysteresis state
pub struct PegChecker {
    gateway: Arc<dyn ChainGateway>,
    config: PegConfig,
    states: DashMap<SubjectKey, PegRecord>,
    assessments: AtomicU64,
}

impl PegChecker {
    pub fn new(gateway: Arc<dyn ChainGateway>, config: PegConfig) -> Self {
        Self {
            gateway,
            config,
            states: DashMap::new(),
            assessments: AtomicU64::new(0),
        }
    }

    /// Last recorded state for a subject, if still within retention
    pub fn state(&self, key: &SubjectKey) -> Option<PegState> {
        let retention = self.config.state_retention();
        self.states
            .get(key)
            .filter(|record| record.observed_at.elapsed() < retention)
            .map(|record| record.state)
    }

    /// Drop states not observed within the retention window
    pub fn prune(&self) -> usize {
        let retention = self.config.state_retention();
        let before = self.states.len();
        self.states.retain(|_, record| record.observed_at.elapsed() < retention);
        let removed = before.saturating_sub(self.states.len());
        if removed > 0 {
            debug!("🧹 Pruned {} stale peg states", removed);
        }
        removed
    }

    /// Subjects with remembered state
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub async fn check(&self, key: &SubjectKey, token: &TokenRef, peg: PegTarget) -> CheckResult {
        let address = match token.parsed_address() {
            Ok(address) => address,
            Err(e) => return CheckResult::unavailable(CheckKind::Peg, e.message),
        };

        let price = match self
            .gateway
            .fetch(GatewayRequest::GetPrice { chain_id: token.chain_id, address })
            .await
        {
            GatewayResponse::Price(price) if price.is_finite() && price > 0.0 => price,
            GatewayResponse::Price(price) => {
                return CheckResult::unavailable(CheckKind::Peg, format!("invalid price quote {}", price))
            }
            GatewayResponse::Unavailable(reason) => {
                return CheckResult::unavailable(CheckKind::Peg, format!("price unavailable: {}", reason))
            }
            other => {
                return CheckResult::unavailable(CheckKind::Peg, format!("unexpected response: {:?}", other))
            }
        };

        self.assess(key, price, peg)
    }

    /// Classify an observed price and record the new state
    pub fn assess(&self, key: &SubjectKey, price: f64, peg: PegTarget) -> CheckResult {
        let dev = deviation(price, peg.target);

        // Read-modify-write under the entry lock
        let now = Instant::now();
        let mut entry = self.states.entry(key.clone()).or_insert(PegRecord {
            state: PegState::Pegged,
            observed_at: now,
        });
        let previous = if entry.observed_at.elapsed() < self.config.state_retention() {
            entry.state
        } else {
            PegState::Pegged
        };
        let state = classify(dev, previous, &self.config);
        *entry = PegRecord { state, observed_at: now };
        drop(entry);

        if self.assessments.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune();
        }

        let mut evidence = vec![format!(
            "price {:.4} vs peg {:.4} (deviation {:.2}%)",
            price,
            peg.target,
            dev * 100.0
        )];
        if state != previous {
            debug!("💱 {} peg state {:?} → {:?}", key, previous, state);
        }

        match state {
            PegState::Pegged => {
                let score = (100.0 - 20.0 * dev / self.config.minor_threshold).clamp(PEGGED_MIN_SCORE, 100.0);
                CheckResult::pass(CheckKind::Peg, score, PEGGED_CONFIDENCE, evidence)
            }
            PegState::MinorDepeg => {
                if dev < self.config.minor_threshold {
                    evidence.push(format!(
                        "held as depegged until deviation < {:.2}%",
                        self.config.minor_threshold * self.config.hysteresis_factor * 100.0
                    ));
                }
                warn!("⚠️ Minor depeg on {}: {:.2}%", key, dev * 100.0);
                evidence.push("minor depeg".to_string());
                CheckResult::fail(CheckKind::Peg, MINOR_DEPEG_SCORE, MINOR_DEPEG_CONFIDENCE, evidence)
            }
            PegState::MajorDepeg => {
                if dev <= self.config.major_threshold {
                    evidence.push(format!(
                        "held as major depeg until deviation < {:.2}%",
                        self.config.major_threshold * self.config.hysteresis_factor * 100.0
                    ));
                }
                warn!("🚨 Major depeg on {}: {:.2}%", key, dev * 100.0);
                evidence.push("major depeg".to_string());
                CheckResult::fail(CheckKind::Peg, MAJOR_DEPEG_SCORE, MAJOR_DEPEG_CONFIDENCE, evidence)
            }
        }
    }
}
