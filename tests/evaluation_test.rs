//! End-to-end evaluation tests against a scripted gateway

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{scam_token, usdc, Market, ScriptedGateway, USDC};
use ruster_risk::{
    CheckKind, CheckOutcome, PoolRef, RiskAggregator, RiskConfig, RiskTier, Subject, TokenRef,
};

fn engine(gateway: ScriptedGateway, config: RiskConfig) -> (RiskAggregator, Arc<ScriptedGateway>) {
    let gateway = Arc::new(gateway);
    let aggregator = RiskAggregator::new(gateway.clone(), config).expect("valid config");
    (aggregator, gateway)
}

#[tokio::test]
async fn test_sell_revert_is_critical() {
    let (aggregator, _) = engine(ScriptedGateway::new(Market::SellReverts), RiskConfig::default());
    let report = aggregator.evaluate(&Subject::Token(scam_token())).await.unwrap();

    let honeypot = report.check(CheckKind::Honeypot).unwrap();
    assert_eq!(honeypot.outcome, CheckOutcome::Fail);
    assert!(honeypot.confidence >= 0.9);
    assert!(report.composite_score < 25.0, "score = {}", report.composite_score);
    assert_eq!(report.tier, RiskTier::Critical);
}

#[tokio::test]
async fn test_healthy_stablecoin_is_safe() {
    let gateway = ScriptedGateway::new(Market::Healthy).with_price(0.997);
    let (aggregator, _) = engine(gateway, RiskConfig::default());
    let report = aggregator.evaluate(&Subject::Token(usdc())).await.unwrap();

    for kind in [CheckKind::Honeypot, CheckKind::Peg, CheckKind::Hygiene] {
        assert_eq!(report.check(kind).unwrap().outcome, CheckOutcome::Pass, "{}", kind);
    }
    assert!(report.composite_score >= 80.0, "score = {}", report.composite_score);
    assert_eq!(report.tier, RiskTier::Safe);
    assert!(!report.confidence_floor_applied);
}

#[tokio::test]
async fn test_gateway_down_is_at_least_caution() {
    let (aggregator, _) = engine(ScriptedGateway::new(Market::Down), RiskConfig::default());
    let report = aggregator.evaluate(&Subject::Token(usdc())).await.unwrap();

    assert_eq!(report.check(CheckKind::Honeypot).unwrap().outcome, CheckOutcome::Unavailable);
    assert_eq!(report.check(CheckKind::Peg).unwrap().outcome, CheckOutcome::Unavailable);
    assert!(report.confidence < aggregator.config().confidence_floor);
    assert!(report.tier >= RiskTier::Caution);
    assert!(report.is_degraded());
}

#[tokio::test]
async fn test_concurrent_callers_share_one_computation() {
    let gateway = ScriptedGateway::new(Market::Healthy)
        .with_price(1.0)
        .with_delay(Duration::from_millis(50));
    let (aggregator, gateway) = engine(gateway, RiskConfig::default());
    let subject = Subject::Token(usdc());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let aggregator = aggregator.clone();
            let subject = subject.clone();
            tokio::spawn(async move { aggregator.evaluate(&subject).await.unwrap() })
        })
        .collect();

    let mut reports = Vec::new();
    for handle in handles {
        reports.push(handle.await.unwrap());
    }

    // Two simulation bundles plus one price quote
    assert_eq!(gateway.call_count(), 3);
    assert_eq!(gateway.simulations.load(Ordering::SeqCst), 2);
    assert!(reports.iter().all(|r| r == &reports[0]));
    assert_eq!(aggregator.stats().evaluations, 1);
}

#[tokio::test]
async fn test_expired_report_is_recomputed() {
    let config = RiskConfig { cache_ttl_secs: 1, ..RiskConfig::default() };
    let (aggregator, gateway) = engine(ScriptedGateway::new(Market::Healthy), config);
    let subject = Subject::Token(scam_token());

    let first = aggregator.evaluate(&subject).await.unwrap();
    let cached = aggregator.evaluate(&subject).await.unwrap();
    assert_eq!(first.id, cached.id);
    let calls_after_first = gateway.call_count();

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert!(aggregator.cached(&subject).is_none());

    let fresh = aggregator.evaluate(&subject).await.unwrap();
    assert_ne!(fresh.id, first.id);
    assert!(gateway.call_count() > calls_after_first);
}

#[tokio::test]
async fn test_invalidate_forces_reevaluation() {
    let (aggregator, gateway) = engine(ScriptedGateway::new(Market::Healthy), RiskConfig::default());
    let subject = Subject::Token(scam_token());

    let first = aggregator.evaluate(&subject).await.unwrap();
    let calls = gateway.call_count();
    assert!(aggregator.invalidate(&subject));
    assert!(!aggregator.invalidate(&subject));

    let second = aggregator.evaluate(&subject).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(gateway.call_count(), calls * 2);
}

#[tokio::test]
async fn test_slow_gateway_degrades_within_deadline() {
    let gateway = ScriptedGateway::new(Market::Healthy).with_delay(Duration::from_secs(5));
    let config = RiskConfig { deadline_ms: 150, ..RiskConfig::default() };
    let (aggregator, _) = engine(gateway, config);

    let started = std::time::Instant::now();
    let report = aggregator.evaluate(&Subject::Token(scam_token())).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(report.check(CheckKind::Honeypot).unwrap().outcome, CheckOutcome::Unavailable);
    assert_eq!(report.check(CheckKind::Hygiene).unwrap().outcome, CheckOutcome::Pass);
    assert!(report.tier >= RiskTier::Caution);
}

#[tokio::test]
async fn test_impersonation_is_flagged() {
    let (aggregator, _) = engine(ScriptedGateway::new(Market::Healthy), RiskConfig::default());
    // Cyrillic С at a non-canonical address
    let fake = TokenRef::new(1, common::SCAM, "USD\u{0421}", "USD Coin", 6);
    let report = aggregator.evaluate(&Subject::Token(fake)).await.unwrap();

    let hygiene = report.check(CheckKind::Hygiene).unwrap();
    assert_eq!(hygiene.outcome, CheckOutcome::Fail);
    assert!(hygiene.evidence.iter().any(|e| e.contains("USDC")));
}

#[tokio::test]
async fn test_malformed_subjects_are_rejected() {
    let (aggregator, gateway) = engine(ScriptedGateway::new(Market::Healthy), RiskConfig::default());

    let bad_address = TokenRef::new(1, "0xdeadbeef", "MOON", "Moon", 18);
    let err = aggregator.evaluate(&Subject::Token(bad_address)).await.unwrap_err();
    assert_eq!(err.code_str(), "VAL_INVALID_ADDRESS");

    let empty_symbol = TokenRef::new(1, common::SCAM, "\u{200B}", "Moon", 18);
    let err = aggregator.evaluate(&Subject::Token(empty_symbol)).await.unwrap_err();
    assert_eq!(err.code_str(), "VAL_INVALID_SYMBOL");

    assert_eq!(gateway.call_count(), 0);
    assert_eq!(aggregator.cache_stats().entries, 0);
}

#[tokio::test]
async fn test_pool_without_token_runs_hygiene_only() {
    let (aggregator, gateway) = engine(ScriptedGateway::new(Market::Healthy), RiskConfig::default());
    let pool = Subject::Pool(PoolRef::new(1, "uniswap-v2", "0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc", "USDC/WETH"));

    let report = aggregator.evaluate(&pool).await.unwrap();
    assert_eq!(report.checks.len(), 1);
    assert_eq!(report.checks[0].kind, CheckKind::Hygiene);
    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn test_pool_with_token_is_honeypot_checked() {
    let (aggregator, _) = engine(ScriptedGateway::new(Market::SellReverts), RiskConfig::default());
    let pool = Subject::Pool(
        PoolRef::new(1, "uniswap-v2", "0xpool", "MOON/WETH").with_token(scam_token()),
    );

    let report = aggregator.evaluate(&pool).await.unwrap();
    assert_eq!(report.check(CheckKind::Honeypot).unwrap().outcome, CheckOutcome::Fail);
    assert_eq!(report.tier, RiskTier::Critical);
}

#[tokio::test]
async fn test_peg_hysteresis_survives_invalidation() {
    let gateway = ScriptedGateway::new(Market::Healthy).with_price(0.97);
    let (aggregator, gateway) = engine(gateway, RiskConfig::default());
    let subject = Subject::Token(usdc());

    let mut outcomes = Vec::new();
    for price in [0.97, 0.991, 0.994, 0.998] {
        gateway.set_price(price);
        aggregator.invalidate(&subject);
        let report = aggregator.evaluate(&subject).await.unwrap();
        outcomes.push(report.check(CheckKind::Peg).unwrap().outcome);
    }
    assert_eq!(
        outcomes,
        vec![CheckOutcome::Fail, CheckOutcome::Fail, CheckOutcome::Fail, CheckOutcome::Pass]
    );
}

#[tokio::test]
async fn test_peg_tag_is_not_served_from_untagged_report() {
    let gateway = ScriptedGateway::new(Market::Healthy).with_price(0.90);
    let (aggregator, _) = engine(gateway, RiskConfig::default());
    let plain = Subject::Token(TokenRef::new(1, USDC, "USDC", "USD Coin", 6));
    let pegged = Subject::Token(usdc());

    let untagged = aggregator.evaluate(&plain).await.unwrap();
    assert!(untagged.check(CheckKind::Peg).is_none());
    assert_eq!(untagged.tier, RiskTier::Safe);

    let tagged = aggregator.evaluate(&pegged).await.unwrap();
    assert_ne!(tagged.id, untagged.id);
    assert_eq!(tagged.check(CheckKind::Peg).unwrap().outcome, CheckOutcome::Fail);
    assert!(tagged.tier > RiskTier::Safe, "tier = {}", tagged.tier);
    assert_eq!(aggregator.cached(&pegged).map(|r| r.id), Some(tagged.id));

    let again = aggregator.evaluate(&plain).await.unwrap();
    assert!(again.check(CheckKind::Peg).is_none());
    assert_eq!(aggregator.stats().evaluations, 3);
}

#[tokio::test]
async fn test_padded_address_shares_the_cache_entry() {
    let gateway = ScriptedGateway::new(Market::Healthy).with_price(1.0);
    let (aggregator, gateway) = engine(gateway, RiskConfig::default());

    let first = aggregator.evaluate(&Subject::Token(usdc())).await.unwrap();
    let calls = gateway.call_count();

    let padded = TokenRef::new(1, format!("  {} ", USDC), "USDC", "USD Coin", 6).pegged(1.0);
    let second = aggregator.evaluate(&Subject::Token(padded)).await.unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(gateway.call_count(), calls);
    assert_eq!(aggregator.stats().cache_hits, 1);
}

#[tokio::test]
async fn test_abandoned_caller_does_not_cancel_shared_evaluation() {
    let gateway = ScriptedGateway::new(Market::Healthy)
        .with_price(1.0)
        .with_delay(Duration::from_millis(100));
    let (aggregator, gateway) = engine(gateway, RiskConfig::default());
    let subject = Subject::Token(usdc());

    let first = {
        let (aggregator, subject) = (aggregator.clone(), subject.clone());
        tokio::spawn(async move { aggregator.evaluate(&subject).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = {
        let (aggregator, subject) = (aggregator.clone(), subject.clone());
        tokio::spawn(async move { aggregator.evaluate(&subject).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());

    let report = second.await.unwrap().unwrap();
    assert_eq!(report.check(CheckKind::Honeypot).unwrap().outcome, CheckOutcome::Pass);
    assert_eq!(gateway.simulations.load(Ordering::SeqCst), 2);
    assert_eq!(aggregator.stats().single_flight_joins, 1);
    assert_eq!(aggregator.stats().evaluations, 1);
}

#[tokio::test]
async fn test_sole_abandoned_caller_cancels_evaluation() {
    let gateway = ScriptedGateway::new(Market::Healthy)
        .with_price(1.0)
        .with_delay(Duration::from_millis(200));
    let (aggregator, gateway) = engine(gateway, RiskConfig::default());
    let subject = Subject::Token(usdc());

    let caller = {
        let (aggregator, subject) = (aggregator.clone(), subject.clone());
        tokio::spawn(async move { aggregator.evaluate(&subject).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let started = gateway.call_count();
    assert!(started >= 1);

    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    // Requests in flight at abort time never finish
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(gateway.completed_count(), 0);
    assert_eq!(gateway.call_count(), started);
    assert_eq!(aggregator.stats().evaluations, 0);

    let report = aggregator.evaluate(&subject).await.unwrap();
    assert!(!report.is_degraded());
    assert!(gateway.call_count() > started);
    assert_eq!(aggregator.stats().evaluations, 1);
    assert_eq!(aggregator.cache_stats().misses, 2);
}
