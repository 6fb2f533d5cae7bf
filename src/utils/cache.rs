//! Single-flight TTL report cache
//!
//! Thread-safe storage of risk reports keyed by subject. Each key holds
//! either a finished report or the in-flight computation producing it:
//! - TTL-based expiration, evicted lazily on lookup (no background sweep)
//! - At most one computation per key; concurrent callers share it
//! - A slot only answers requests with the same check profile; a request
//!   for a different check set replaces it
//! - Cache HIT/MISS/JOIN logging
//!
//! Every slot transition goes through the DashMap entry API, so
//! lookup-or-start, complete, and invalidate are each atomic per key.
//!
//! In-flight slots hold a *weak* handle to the shared computation: when every
//! caller awaiting it has gone away, the computation is dropped (cancelling
//! its network calls) and the next lookup starts a fresh one.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::models::{CheckProfile, RiskReport, SubjectKey};

/// Shared handle to an in-flight evaluation
pub type ReportFuture = Shared<BoxFuture<'static, RiskReport>>;

/// Finished report with its insertion time
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub report: RiskReport,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(report: RiskReport, ttl: Duration) -> Self {
        Self {
            report,
            created_at: Instant::now(),
            ttl,
        }
    }

    /// Older than its TTL
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }

    /// Remaining lifetime
    pub fn remaining_ttl(&self) -> Duration {
        self.ttl.saturating_sub(self.created_at.elapsed())
    }
}

enum Slot {
    Ready(CacheEntry),
    InFlight {
        generation: u64,
        profile: CheckProfile,
        future: WeakShared<BoxFuture<'static, RiskReport>>,
    },
}

impl Slot {
    fn serves(&self, profile: &CheckProfile) -> bool {
        match self {
            Slot::Ready(entry) => entry.report.subject.profile() == *profile,
            Slot::InFlight { profile: running, .. } => running == profile,
        }
    }
}

/// Result of `lookup_or_start`
pub enum Lookup {
    /// Unexpired report
    Hit(RiskReport),
    /// Another caller's computation, already running
    Join(ReportFuture),
    /// A computation started by this call
    Started { generation: u64, future: ReportFuture },
}

/// Cache counters for monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Slots held (finished or in flight)
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub joins: u64,
    /// Percentage of lookups answered without new work
    pub hit_rate: f64,
    pub ttl_secs: u64,
}

/// Explicitly owned report cache with single-flight deduplication
pub struct ReportCache {
    store: DashMap<SubjectKey, Slot>,
    ttl: Duration,
    next_generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    joins: AtomicU64,
}

impl ReportCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            store: DashMap::new(),
            ttl,
            next_generation: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            joins: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a fresh report, join the running computation, or start one.
    /// Only a slot planned for the same `profile` is reused.
    ///
    /// `start` receives the new generation and must only build the future;
    /// it runs while the key's shard is locked. The computation is expected
    /// to call [`ReportCache::complete`] with that generation when done.
    pub fn lookup_or_start<F>(&self, key: &SubjectKey, profile: &CheckProfile, start: F) -> Lookup
    where
        F: FnOnce(u64) -> BoxFuture<'static, RiskReport>,
    {
        match self.store.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                match occupied.get() {
                    slot if !slot.serves(profile) => {
                        debug!("📭 CACHE MISS (check set changed): {}", key);
                    }
                    Slot::Ready(entry) if !entry.is_expired() => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        info!(
                            "✅ CACHE HIT: {} (TTL: {}s remaining)",
                            key,
                            entry.remaining_ttl().as_secs()
                        );
                        return Lookup::Hit(entry.report.clone());
                    }
                    Slot::Ready(_) => {
                        debug!("📭 CACHE MISS (expired): {}", key);
                    }
                    Slot::InFlight { future, .. } => {
                        if let Some(shared) = future.upgrade() {
                            self.joins.fetch_add(1, Ordering::Relaxed);
                            info!("🔗 SINGLE-FLIGHT JOIN: {}", key);
                            return Lookup::Join(shared);
                        }
                        debug!("📭 CACHE MISS (abandoned computation): {}", key);
                    }
                }
                let (generation, shared, slot) = self.begin(profile, start);
                match slot {
                    Some(slot) => {
                        occupied.insert(slot);
                    }
                    None => {
                        occupied.remove();
                    }
                }
                Lookup::Started { generation, future: shared }
            }
            Entry::Vacant(vacant) => {
                debug!("📭 CACHE MISS: {}", key);
                let (generation, shared, slot) = self.begin(profile, start);
                if let Some(slot) = slot {
                    vacant.insert(slot);
                }
                Lookup::Started { generation, future: shared }
            }
        }
    }

    fn begin<F>(&self, profile: &CheckProfile, start: F) -> (u64, ReportFuture, Option<Slot>)
    where
        F: FnOnce(u64) -> BoxFuture<'static, RiskReport>,
    {
        self.misses.fetch_add(1, Ordering::Relaxed);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let shared = start(generation).shared();
        // A never-polled Shared always downgrades
        let slot = shared.downgrade().map(|future| Slot::InFlight {
            generation,
            profile: profile.clone(),
            future,
        });
        (generation, shared, slot)
    }

    /// Store the finished report of `generation`. Ignored if the slot was
    /// invalidated or taken over by a newer computation meanwhile.
    pub fn complete(&self, key: &SubjectKey, generation: u64, report: RiskReport) -> bool {
        match self.store.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let current = matches!(
                    occupied.get(),
                    Slot::InFlight { generation: g, .. } if *g == generation
                );
                if current {
                    info!("💾 CACHE SET: {} (TTL: {}s)", key, self.ttl.as_secs());
                    occupied.insert(Slot::Ready(CacheEntry::new(report, self.ttl)));
                }
                current
            }
            Entry::Vacant(_) => {
                debug!("🗑️ CACHE SKIP (invalidated while computing): {}", key);
                false
            }
        }
    }

    /// Unexpired report for `key` planned with `profile`, without starting
    /// anything. Expired entries are evicted.
    pub fn get(&self, key: &SubjectKey, profile: &CheckProfile) -> Option<RiskReport> {
        if let Entry::Occupied(occupied) = self.store.entry(key.clone()) {
            let expired = match occupied.get() {
                Slot::Ready(entry) if !entry.is_expired() => {
                    return entry.report.subject.profile().eq(profile).then(|| entry.report.clone());
                }
                Slot::Ready(_) => true,
                Slot::InFlight { .. } => false,
            };
            if expired {
                occupied.remove();
                debug!("📭 CACHE EVICT (expired): {}", key);
            }
        }
        None
    }

    /// Drop the slot for `key`; the next lookup recomputes
    pub fn invalidate(&self, key: &SubjectKey) -> bool {
        let removed = self.store.remove(key).is_some();
        debug!("🗑️ CACHE INVALIDATE: {} (present: {})", key, removed);
        removed
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Snapshot of cache counters
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let joins = self.joins.load(Ordering::Relaxed);
        let total = hits + misses + joins;
        let hit_rate = if total > 0 {
            ((hits + joins) as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let in_flight = self
            .store
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::InFlight { .. }))
            .count();

        CacheStats {
            entries: self.store.len(),
            in_flight,
            hits,
            misses,
            joins,
            hit_rate,
            ttl_secs: self.ttl.as_secs(),
        }
    }

    /// Drop every slot, including in-flight markers
    pub fn clear(&self) {
        self.store.clear();
        info!("🗑️ CACHE CLEARED");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RiskTier, Subject, TokenRef};
    use chrono::Utc;
    use uuid::Uuid;

    const TOKEN: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";

    fn report() -> RiskReport {
        let now = Utc::now();
        RiskReport {
            id: Uuid::new_v4(),
            subject: Subject::Token(TokenRef::new(1, TOKEN, "USDT", "Tether USD", 6)),
            composite_score: 90.0,
            tier: RiskTier::Safe,
            confidence: 0.9,
            confidence_floor_applied: false,
            checks: vec![],
            generated_at: now,
            expires_at: now,
        }
    }

    fn key() -> SubjectKey {
        SubjectKey::Token { chain_id: 1, address: TOKEN.to_lowercase() }
    }

    fn profile() -> CheckProfile {
        report().subject.profile()
    }

    fn ready(report: RiskReport) -> impl FnOnce(u64) -> BoxFuture<'static, RiskReport> {
        move |_| async move { report }.boxed()
    }

    #[tokio::test]
    async fn test_start_complete_hit() {
        let cache = ReportCache::new(Duration::from_secs(60));
        let expected = report();

        let Lookup::Started { generation, future } = cache.lookup_or_start(&key(), &profile(), ready(expected.clone())) else {
            panic!("first lookup must start");
        };
        let produced = future.await;
        assert!(cache.complete(&key(), generation, produced));

        match cache.lookup_or_start(&key(), &profile(), |_| unreachable!()) {
            Lookup::Hit(hit) => assert_eq!(hit.id, expected.id),
            _ => panic!("expected hit"),
        }
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_concurrent_lookup_joins() {
        let cache = ReportCache::new(Duration::from_secs(60));
        let Lookup::Started { future: first, .. } = cache.lookup_or_start(&key(), &profile(), ready(report())) else {
            panic!("first lookup must start");
        };
        let Lookup::Join(second) = cache.lookup_or_start(&key(), &profile(), |_| unreachable!()) else {
            panic!("second lookup must join");
        };
        let (a, b) = tokio::join!(first, second);
        assert_eq!(a.id, b.id);
        assert_eq!(cache.stats().joins, 1);
    }

    #[tokio::test]
    async fn test_abandoned_computation_restarts() {
        let cache = ReportCache::new(Duration::from_secs(60));
        let started = cache.lookup_or_start(&key(), &profile(), |_| futures_util::future::pending().boxed());
        drop(started);

        assert!(matches!(
            cache.lookup_or_start(&key(), &profile(), ready(report())),
            Lookup::Started { .. }
        ));
    }

    #[tokio::test]
    async fn test_expired_entry_is_never_returned() {
        let cache = ReportCache::new(Duration::from_millis(20));
        let Lookup::Started { generation, future } = cache.lookup_or_start(&key(), &profile(), ready(report())) else {
            panic!("first lookup must start");
        };
        cache.complete(&key(), generation, future.await);
        assert!(cache.get(&key(), &profile()).is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get(&key(), &profile()).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_stale_generation_is_discarded() {
        let cache = ReportCache::new(Duration::from_secs(60));
        let Lookup::Started { generation, future } = cache.lookup_or_start(&key(), &profile(), ready(report())) else {
            panic!("first lookup must start");
        };
        assert!(cache.invalidate(&key()));
        assert!(!cache.complete(&key(), generation, future.await));
        assert!(cache.get(&key(), &profile()).is_none());
    }

    #[tokio::test]
    async fn test_different_check_set_is_a_miss() {
        let cache = ReportCache::new(Duration::from_secs(60));
        let Lookup::Started { generation, future } = cache.lookup_or_start(&key(), &profile(), ready(report())) else {
            panic!("first lookup must start");
        };
        cache.complete(&key(), generation, future.await);

        let pegged = Subject::Token(TokenRef::new(1, TOKEN, "USDT", "Tether USD", 6).pegged(1.0)).profile();
        assert!(cache.get(&key(), &pegged).is_none());
        assert!(matches!(
            cache.lookup_or_start(&key(), &pegged, ready(report())),
            Lookup::Started { .. }
        ));
        // the slot now belongs to the pegged profile
        assert!(matches!(
            cache.lookup_or_start(&key(), &profile(), ready(report())),
            Lookup::Started { .. }
        ));
    }
}
