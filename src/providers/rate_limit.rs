//! Per-provider token bucket
//!
//! One bucket per provider key (endpoint URL). The bucket is the only shared
//! mutable state the gateway owns; it guards request rate, not data.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(requests_per_second: f64) -> Self {
        let capacity = requests_per_second.ceil().max(1.0);
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec: requests_per_second,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token, or report how long until one is available
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }
}

/// Token-bucket rate limiter keyed by provider
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Non-blocking attempt. `Err(wait)` tells how long until a token frees up.
    pub fn try_acquire(&self, provider: &str, requests_per_second: f64) -> Result<(), Duration> {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(provider.to_string())
            .or_insert_with(|| TokenBucket::new(requests_per_second));
        bucket.try_take(now)
    }

    /// Wait until a token is available for `provider`.
    /// The shard lock is released before sleeping.
    pub async fn acquire(&self, provider: &str, requests_per_second: f64) {
        loop {
            match self.try_acquire(provider, requests_per_second) {
                Ok(()) => return,
                Err(wait) => {
                    debug!("⏳ Rate limit: waiting {}ms for provider token", wait.as_millis());
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Number of providers tracked
    pub fn providers(&self) -> usize {
        self.buckets.len()
    }
}
