//! Risk Aggregator
//!
//! Entry point of the engine. For each subject:
//! 1. Validate the identifier and raw metadata (errors go straight back)
//! 2. Serve a fresh cached report, or join the evaluation already running,
//!    when it was planned with the same check set
//! 3. Otherwise fan the applicable checks out as child tasks under one
//!    deadline; stragglers are aborted and recorded as unavailable
//! 4. Score, tier, cache, and hand the report to registered sinks
//!
//! A panic inside one check is contained to that check. Evaluations for
//! different subjects run concurrently, bounded by `max_in_flight`.

use chrono::Utc;
use futures_util::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout_at;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::honeypot::HoneypotDetector;
use super::peg::PegChecker;
use super::risk_score::score_checks;
use super::sanitizer::{validate_symbol_text, SymbolSanitizer, MAX_NAME_LEN};
use crate::models::{AppResult, CheckKind, CheckResult, RiskConfig, RiskReport, Subject};
use crate::providers::ChainGateway;
use crate::utils::cache::{CacheStats, Lookup, ReportCache};
use crate::utils::telemetry::{EvaluationStats, StatsSnapshot};

/// Receives every freshly computed report (audit/history collaborators).
/// Called once per computation, never for cache hits or joins.
pub trait ReportSink: Send + Sync {
    fn record(&self, report: &RiskReport);
}

struct AggregatorInner {
    config: RiskConfig,
    sanitizer: SymbolSanitizer,
    honeypot: HoneypotDetector,
    peg: PegChecker,
    cache: ReportCache,
    permits: Semaphore,
    stats: EvaluationStats,
    sinks: RwLock<Vec<Arc<dyn ReportSink>>>,
}

/// Risk evaluation engine. Cheap to clone; clones share cache and state.
#[derive(Clone)]
pub struct RiskAggregator {
    inner: Arc<AggregatorInner>,
}

impl RiskAggregator {
    pub fn new(gateway: Arc<dyn ChainGateway>, config: RiskConfig) -> AppResult<Self> {
        config.validate()?;

        info!(
            "🧠 Risk aggregator ready (deadline: {}ms, cache TTL: {}s, max in-flight: {})",
            config.deadline_ms, config.cache_ttl_secs, config.max_in_flight
        );

        let inner = AggregatorInner {
            sanitizer: SymbolSanitizer::new(config.hygiene),
            honeypot: HoneypotDetector::new(Arc::clone(&gateway), config.honeypot),
            peg: PegChecker::new(gateway, config.peg),
            cache: ReportCache::new(config.cache_ttl()),
            permits: Semaphore::new(config.max_in_flight),
            stats: EvaluationStats::new(),
            sinks: RwLock::new(Vec::new()),
            config,
        };
        Ok(Self { inner: Arc::new(inner) })
    }

    /// Register a sink for computed reports
    pub fn add_sink(&self, sink: Arc<dyn ReportSink>) {
        let mut sinks = self.inner.sinks.write().unwrap_or_else(|e| e.into_inner());
        sinks.push(sink);
    }

    pub fn with_sink(self, sink: Arc<dyn ReportSink>) -> Self {
        self.add_sink(sink);
        self
    }

    /// Evaluate a subject. Only validation errors are returned as `Err`;
    /// provider trouble degrades individual checks instead.
    pub async fn evaluate(&self, subject: &Subject) -> AppResult<RiskReport> {
        if let Err(e) = self.inner.validate(subject) {
            self.inner.stats.record_validation_error();
            debug!("❌ Rejected {}: {}", subject, e);
            return Err(e);
        }

        let key = subject.key();
        let profile = subject.profile();
        let inner = Arc::clone(&self.inner);
        let owned = subject.clone();
        let slot_key = key.clone();

        let lookup = self.inner.cache.lookup_or_start(&key, &profile, move |generation| {
            async move {
                let report = Arc::clone(&inner).compute(owned).await;
                inner.cache.complete(&slot_key, generation, report.clone());
                inner.publish(&report);
                report
            }
            .boxed()
        });

        let report = match lookup {
            Lookup::Hit(report) => {
                self.inner.stats.record_cache_hit();
                report
            }
            Lookup::Join(future) => {
                self.inner.stats.record_join();
                future.await
            }
            Lookup::Started { future, .. } => future.await,
        };
        Ok(report)
    }

    /// Force re-evaluation on the next call. Peg hysteresis state is kept.
    pub fn invalidate(&self, subject: &Subject) -> bool {
        self.inner.stats.record_invalidation();
        self.inner.cache.invalidate(&subject.key())
    }

    /// Cached, unexpired report without evaluating
    pub fn cached(&self, subject: &Subject) -> Option<RiskReport> {
        self.inner.cache.get(&subject.key(), &subject.profile())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn config(&self) -> &RiskConfig {
        &self.inner.config
    }
}

/// Checks that apply to a subject, in report order
fn plan(subject: &Subject) -> Vec<CheckKind> {
    subject.profile().kinds
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl AggregatorInner {
    fn validate(&self, subject: &Subject) -> AppResult<()> {
        subject.validate()?;
        match subject {
            Subject::Token(token) => self.sanitizer.validate(token),
            Subject::Pool(pool) => {
                validate_symbol_text(&pool.label, "label", MAX_NAME_LEN)?;
                match &pool.token {
                    Some(token) => self.sanitizer.validate(token),
                    None => Ok(()),
                }
            }
        }
    }

    async fn compute(self: Arc<Self>, subject: Subject) -> RiskReport {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.deadline();
        let kinds = plan(&subject);

        let checks = match timeout_at(deadline, self.permits.acquire()).await {
            Ok(Ok(permit)) => {
                let checks = Arc::clone(&self).run_checks(&subject, &kinds, deadline).await;
                drop(permit);
                checks
            }
            Ok(Err(_)) => kinds
                .iter()
                .map(|kind| CheckResult::unavailable(*kind, "evaluation capacity closed"))
                .collect(),
            Err(_) => {
                warn!("⏱️ No evaluation slot before deadline for {}", subject);
                self.stats.record_deadline_miss(kinds.len() as u64);
                kinds
                    .iter()
                    .map(|kind| {
                        CheckResult::unavailable(*kind, "deadline exceeded waiting for evaluation slot")
                    })
                    .collect()
            }
        };

        let scored = score_checks(&checks, &self.config);
        let generated_at = Utc::now();
        let ttl = chrono::Duration::from_std(self.cache.ttl()).unwrap_or_else(|_| chrono::Duration::zero());

        let report = RiskReport {
            id: Uuid::new_v4(),
            subject,
            composite_score: scored.score,
            tier: scored.tier,
            confidence: scored.confidence,
            confidence_floor_applied: scored.confidence_floor_applied,
            checks,
            generated_at,
            expires_at: generated_at + ttl,
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        self.stats.record_report(&report, latency_ms);
        info!(
            "{} {} → {} (score: {:.1}, confidence: {:.2}, {}ms)",
            report.tier.emoji(),
            report.subject,
            report.tier,
            report.composite_score,
            report.confidence,
            latency_ms
        );
        report
    }

    /// Run every check as a child task; collect what finishes by `deadline`
    async fn run_checks(
        self: Arc<Self>,
        subject: &Subject,
        kinds: &[CheckKind],
        deadline: tokio::time::Instant,
    ) -> Vec<CheckResult> {
        let mut set = JoinSet::new();
        for kind in kinds.iter().copied() {
            let inner = Arc::clone(&self);
            let subject = subject.clone();
            set.spawn(async move {
                let started = Instant::now();
                let outcome = AssertUnwindSafe(inner.run_check(kind, &subject)).catch_unwind().await;
                match outcome {
                    Ok(result) => result.with_latency(started.elapsed()),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!("💥 {} check faulted for {}: {}", kind, subject, message);
                        inner.stats.record_fault();
                        CheckResult::unavailable(kind, format!("internal fault: {}", message))
                            .with_latency(started.elapsed())
                    }
                }
            });
        }

        let mut results: HashMap<CheckKind, CheckResult> = HashMap::with_capacity(kinds.len());
        let mut timed_out = false;
        loop {
            match timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok(result))) => {
                    results.insert(result.kind, result);
                }
                Ok(Some(Err(e))) => {
                    warn!("💥 Check task lost for {}: {}", subject, e);
                    self.stats.record_fault();
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }
        // Cancel stragglers
        set.abort_all();

        let elapsed = self.config.deadline();
        let mut missed = 0u64;
        let checks: Vec<CheckResult> = kinds
            .iter()
            .map(|kind| {
                results.remove(kind).unwrap_or_else(|| {
                    if timed_out {
                        missed += 1;
                        CheckResult::unavailable(*kind, "deadline exceeded").with_latency(elapsed)
                    } else {
                        CheckResult::unavailable(*kind, "internal fault: check task lost")
                    }
                })
            })
            .collect();

        if missed > 0 {
            warn!("⏱️ Deadline hit for {}: {} check(s) unavailable", subject, missed);
            self.stats.record_deadline_miss(missed);
        }
        checks
    }

    async fn run_check(&self, kind: CheckKind, subject: &Subject) -> CheckResult {
        match kind {
            CheckKind::Hygiene => self.hygiene(subject),
            CheckKind::Honeypot => match subject.traded_token() {
                Some(token) => self.honeypot.check(token).await,
                None => CheckResult::unavailable(kind, "no traded token"),
            },
            CheckKind::Peg => match (subject.traded_token(), subject.peg()) {
                (Some(token), Some(peg)) => self.peg.check(&subject.key(), token, peg).await,
                _ => CheckResult::unavailable(kind, "subject is not pegged"),
            },
        }
    }

    fn hygiene(&self, subject: &Subject) -> CheckResult {
        let cleaned = match subject {
            Subject::Token(token) => self.sanitizer.clean(token),
            Subject::Pool(pool) => match &pool.token {
                Some(token) => self.sanitizer.clean(token),
                None => self.sanitizer.clean_label(pool.chain_id, &pool.label),
            },
        };
        match cleaned {
            Ok(cleaned) => self.sanitizer.assess(&cleaned),
            Err(e) => CheckResult::unavailable(CheckKind::Hygiene, e.message),
        }
    }

    fn publish(&self, report: &RiskReport) {
        let sinks = self.sinks.read().unwrap_or_else(|e| e.into_inner());
        for sink in sinks.iter() {
            if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| sink.record(report))) {
                warn!("💥 Report sink faulted: {}", panic_message(payload.as_ref()));
                self.stats.record_fault();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckOutcome, PoolRef, RiskTier, TokenRef};
    use crate::providers::{GatewayRequest, GatewayResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const TOKEN: &str = "0x1111111111111111111111111111111111111111";

    enum Behavior {
        Unavailable,
        Panic,
        Stall,
    }

    struct StubGateway {
        behavior: Behavior,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChainGateway for StubGateway {
        async fn fetch(&self, _request: GatewayRequest) -> GatewayResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Unavailable => GatewayResponse::Unavailable("all endpoints down".into()),
                Behavior::Panic => panic!("decoder blew up"),
                Behavior::Stall => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    GatewayResponse::Unavailable("too late".into())
                }
            }
        }
    }

    fn aggregator(behavior: Behavior, config: RiskConfig) -> (RiskAggregator, Arc<StubGateway>) {
        let gateway = Arc::new(StubGateway { behavior, calls: AtomicUsize::new(0) });
        let aggregator = RiskAggregator::new(gateway.clone(), config).unwrap();
        (aggregator, gateway)
    }

    fn token() -> Subject {
        Subject::Token(TokenRef::new(1, TOKEN, "MOON", "Moon Token", 18))
    }

    #[derive(Default)]
    struct CollectingSink {
        ids: Mutex<Vec<Uuid>>,
    }

    impl ReportSink for CollectingSink {
        fn record(&self, report: &RiskReport) {
            self.ids.lock().unwrap().push(report.id);
        }
    }

    #[test]
    fn test_plan_per_subject_type() {
        let pegged = Subject::Token(TokenRef::new(1, TOKEN, "USDX", "USD X", 6).pegged(1.0));
        assert_eq!(plan(&pegged), vec![CheckKind::Honeypot, CheckKind::Peg, CheckKind::Hygiene]);
        assert_eq!(plan(&token()), vec![CheckKind::Honeypot, CheckKind::Hygiene]);

        let bare_pool = Subject::Pool(PoolRef::new(1, "uniswap-v2", "0xpool", "USDC/WETH"));
        assert_eq!(plan(&bare_pool), vec![CheckKind::Hygiene]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let gateway = Arc::new(StubGateway { behavior: Behavior::Unavailable, calls: AtomicUsize::new(0) });
        let config = RiskConfig { max_in_flight: 0, ..RiskConfig::default() };
        assert!(RiskAggregator::new(gateway, config).is_err());
    }

    #[tokio::test]
    async fn test_gateway_down_forces_caution() {
        let (aggregator, _) = aggregator(Behavior::Unavailable, RiskConfig::default());
        let report = aggregator.evaluate(&token()).await.unwrap();

        assert_eq!(report.check(CheckKind::Honeypot).unwrap().outcome, CheckOutcome::Unavailable);
        assert!(report.confidence < 0.5);
        assert!(report.tier >= RiskTier::Caution);
        assert!(report.confidence_floor_applied);
    }

    #[tokio::test]
    async fn test_panicking_check_is_contained() {
        let (aggregator, _) = aggregator(Behavior::Panic, RiskConfig::default());
        let report = aggregator.evaluate(&token()).await.unwrap();

        let honeypot = report.check(CheckKind::Honeypot).unwrap();
        assert_eq!(honeypot.outcome, CheckOutcome::Unavailable);
        assert!(honeypot.evidence[0].contains("internal fault"));
        assert_eq!(report.check(CheckKind::Hygiene).unwrap().outcome, CheckOutcome::Pass);
        assert_eq!(aggregator.stats().contained_faults, 1);
    }

    #[tokio::test]
    async fn test_deadline_degrades_instead_of_failing() {
        let config = RiskConfig { deadline_ms: 100, ..RiskConfig::default() };
        let (aggregator, _) = aggregator(Behavior::Stall, config);

        let started = Instant::now();
        let report = aggregator.evaluate(&token()).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));

        let honeypot = report.check(CheckKind::Honeypot).unwrap();
        assert_eq!(honeypot.outcome, CheckOutcome::Unavailable);
        assert_eq!(honeypot.evidence, vec!["deadline exceeded".to_string()]);
        assert_eq!(report.check(CheckKind::Hygiene).unwrap().outcome, CheckOutcome::Pass);
        assert_eq!(aggregator.stats().deadline_misses, 1);
    }

    #[tokio::test]
    async fn test_validation_error_is_not_cached() {
        let (aggregator, gateway) = aggregator(Behavior::Unavailable, RiskConfig::default());
        let bad = Subject::Token(TokenRef::new(1, "0x123", "MOON", "Moon", 18));

        assert!(aggregator.evaluate(&bad).await.unwrap_err().is_validation());
        assert!(aggregator.evaluate(&bad).await.is_err());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
        assert!(aggregator.cache_stats().entries == 0);
        assert_eq!(aggregator.stats().validation_errors, 2);
    }

    #[tokio::test]
    async fn test_sink_sees_each_computation_once() {
        let sink = Arc::new(CollectingSink::default());
        let (aggregator, _) = aggregator(Behavior::Unavailable, RiskConfig::default());
        let aggregator = aggregator.with_sink(sink.clone());

        let first = aggregator.evaluate(&token()).await.unwrap();
        let second = aggregator.evaluate(&token()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(*sink.ids.lock().unwrap(), vec![first.id]);

        assert!(aggregator.invalidate(&token()));
        let third = aggregator.evaluate(&token()).await.unwrap();
        assert_ne!(third.id, first.id);
        assert_eq!(sink.ids.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_report_expiry_matches_ttl() {
        let (aggregator, _) = aggregator(Behavior::Unavailable, RiskConfig::default());
        let report = aggregator.evaluate(&token()).await.unwrap();
        let ttl = report.expires_at - report.generated_at;
        assert_eq!(ttl.num_seconds() as u64, aggregator.config().cache_ttl_secs);
    }
}
