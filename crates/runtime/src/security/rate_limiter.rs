//! Per-key token-bucket rate limiting
//!
//! Buckets refill lazily in whole-window increments and never persist;
//! this is best-effort, in-process limiting. Keys are hostnames for the
//! fetch fan-out and API names for catalog limits. Each check is atomic
//! relative to the bucket it touches (per-entry lock via the map shard).

use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
    request_count: u64,
}

/// Process-global, non-blocking token-bucket limiter.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Take one token for `key` if available. Refills
    /// `floor(elapsed / window) * max_requests` tokens (capped at
    /// `max_requests`), advancing the refill mark by the consumed whole
    /// windows so partial elapsed time keeps accruing.
    pub fn can_make_request(&self, key: &str, max_requests: u32, window: Duration) -> bool {
        if max_requests == 0 || window.is_zero() {
            return false;
        }

        let now = Instant::now();
        let mut bucket = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: max_requests,
            last_refill: now,
            request_count: 0,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let windows = (elapsed.as_millis() / window.as_millis()) as u32;
        if windows > 0 {
            bucket.tokens = bucket
                .tokens
                .saturating_add(windows.saturating_mul(max_requests))
                .min(max_requests);
            bucket.last_refill += window * windows;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            bucket.request_count += 1;
            true
        } else {
            false
        }
    }

    /// Total permits ever issued for `key`.
    pub fn request_count(&self, key: &str) -> u64 {
        self.buckets.get(key).map_or(0, |b| b.request_count)
    }

    /// Drop all buckets (used between tests).
    pub fn reset(&self) {
        self.buckets.clear();
    }
}
