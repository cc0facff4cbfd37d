//! Token bucket rate limiter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use uiforge_core::error::AppError;

/// Simple in-memory token bucket rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Key → bucket state.
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
    /// Maximum tokens per bucket.
    max_tokens: u32,
    /// Token refill rate per second.
    refill_rate: f64,
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Creates a new rate limiter.
    pub fn new(max_tokens: u32, refill_rate: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            max_tokens: max_tokens.max(1),
            refill_rate: refill_rate.max(0.0),
        }
    }

    /// Consumes a token for `key`, or returns a `RATE_LIMITED` error
    /// carrying the seconds until one is available.
    pub async fn check(&self, key: &str) -> Result<(), AppError> {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        let capacity = f64::from(self.max_tokens);

        let bucket = buckets.entry(key.to_string()).or_insert(TokenBucket {
            tokens: capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let retry_after = if self.refill_rate > 0.0 {
            ((1.0 - bucket.tokens) / self.refill_rate).ceil().max(1.0) as u64
        } else {
            60
        };
        tracing::warn!(key = %key, retry_after, "Rate limit exceeded");
        Err(AppError::rate_limited(retry_after))
    }

    /// Drops buckets that have refilled completely.
    ///
    /// Returns the number of buckets removed.
    pub async fn prune(&self) -> usize {
        let now = Instant::now();
        let capacity = f64::from(self.max_tokens);
        let rate = self.refill_rate;
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens + elapsed * rate < capacity
        });
        before - buckets.len()
    }

    /// Number of keys currently tracked.
    pub async fn tracked_keys(&self) -> usize {
        self.buckets.lock().await.len()
    }

    /// Spawns a task that prunes every `period` until aborted.
    pub fn spawn_pruner(&self, period: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = limiter.prune().await;
                if removed > 0 {
                    tracing::debug!(removed, "Pruned idle rate limit buckets");
                }
            }
        })
    }
}

/// Best-effort client key: first `X-Forwarded-For` hop, else `X-Real-IP`.
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
