use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use uuid::Uuid;

use siakad_shared::clients::redis::RedisClient;
use siakad_shared::errors::{AppError, AppResult};

/// Maps with more keys than this are swept for idle entries.
const SWEEP_THRESHOLD: usize = 10_000;

/// Outcome of one rate-limited attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// When the oldest attempt in the window expires (unix ms).
    pub reset_at_ms: i64,
}

impl RateDecision {
    /// Whole seconds until the next attempt can succeed, at least 1.
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let wait_ms = (self.reset_at_ms - now_ms).max(0) as u64;
        wait_ms.div_ceil(1000).max(1)
    }

    pub fn reset_at_secs(&self) -> i64 {
        self.reset_at_ms.div_euclid(1000) + i64::from(self.reset_at_ms.rem_euclid(1000) != 0)
    }
}

/// Sliding-window policy: at most `limit` attempts per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindow {
    pub limit: u32,
    pub window_ms: i64,
}

impl SlidingWindow {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self {
            limit: limit.max(1),
            window_ms: (window_secs.max(1) * 1000) as i64,
        }
    }
}

/// Records an attempt for `key` and decides whether it may proceed.
#[axum::async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn check(&self, key: &str, now_ms: i64) -> AppResult<RateDecision>;

    fn policy(&self) -> SlidingWindow;
}

/// Single-process store. Counters reset on restart.
pub struct MemoryRateLimiter {
    policy: SlidingWindow,
    hits: Mutex<HashMap<String, VecDeque<i64>>>,
}

impl MemoryRateLimiter {
    pub fn new(policy: SlidingWindow) -> Self {
        Self {
            policy,
            hits: Mutex::new(HashMap::new()),
        }
    }

    fn hit(&self, key: &str, now_ms: i64) -> AppResult<RateDecision> {
        let SlidingWindow { limit, window_ms } = self.policy;
        let cutoff = now_ms - window_ms;

        let mut hits = self
            .hits
            .lock()
            .map_err(|_| AppError::internal("rate limiter lock poisoned"))?;

        if hits.len() > SWEEP_THRESHOLD {
            hits.retain(|_, q| q.back().is_some_and(|&t| t > cutoff));
        }

        let window = hits.entry(key.to_string()).or_default();
        while window.front().is_some_and(|&t| t <= cutoff) {
            window.pop_front();
        }

        let allowed = window.len() < limit as usize;
        if allowed {
            window.push_back(now_ms);
        }
        let oldest = window.front().copied().unwrap_or(now_ms);

        Ok(RateDecision {
            allowed,
            limit,
            remaining: limit.saturating_sub(window.len() as u32),
            reset_at_ms: oldest + window_ms,
        })
    }
}

#[axum::async_trait]
impl RateLimitStore for MemoryRateLimiter {
    async fn check(&self, key: &str, now_ms: i64) -> AppResult<RateDecision> {
        self.hit(key, now_ms)
    }

    fn policy(&self) -> SlidingWindow {
        self.policy
    }
}

/// Store shared by every instance pointed at the same Redis.
pub struct RedisRateLimiter {
    redis: RedisClient,
    policy: SlidingWindow,
    prefix: String,
}

impl RedisRateLimiter {
    pub fn new(redis: RedisClient, policy: SlidingWindow, prefix: impl Into<String>) -> Self {
        Self {
            redis,
            policy,
            prefix: prefix.into(),
        }
    }
}

#[axum::async_trait]
impl RateLimitStore for RedisRateLimiter {
    async fn check(&self, key: &str, now_ms: i64) -> AppResult<RateDecision> {
        let SlidingWindow { limit, window_ms } = self.policy;
        let member = format!("{now_ms}-{}", Uuid::new_v4());

        let hit = self
            .redis
            .sliding_window_hit(&format!("{}:{key}", self.prefix), now_ms, window_ms, u64::from(limit), &member)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "redis rate limit check failed");
                AppError::internal(format!("pembatas login tidak tersedia: {e}"))
            })?;

        Ok(RateDecision {
            allowed: hit.allowed,
            limit,
            remaining: u64::from(limit).saturating_sub(hit.count) as u32,
            reset_at_ms: hit.oldest_ms + window_ms,
        })
    }

    fn policy(&self) -> SlidingWindow {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> MemoryRateLimiter {
        MemoryRateLimiter::new(SlidingWindow::new(5, 60))
    }

    #[tokio::test]
    async fn five_attempts_then_rejected() {
        let store = limiter();
        for (i, t) in [0i64, 1_000, 2_000, 3_000, 4_000].into_iter().enumerate() {
            let d = store.check("10.0.0.1", t).await.unwrap();
            assert!(d.allowed, "attempt {} should pass", i + 1);
            assert_eq!(d.remaining, 4 - i as u32);
            assert_eq!(d.reset_at_ms, 60_000);
        }

        let sixth = store.check("10.0.0.1", 5_000).await.unwrap();
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        assert_eq!(sixth.retry_after_secs(5_000), 55);
    }

    #[tokio::test]
    async fn window_slides_open_again() {
        let store = limiter();
        for t in 0..5 {
            store.check("ip", t * 1_000).await.unwrap();
        }
        assert!(!store.check("ip", 59_999).await.unwrap().allowed);

        // The attempt at t=0 has left the window.
        let d = store.check("ip", 60_000).await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.reset_at_ms, 61_000);

        assert!(!store.check("ip", 60_500).await.unwrap().allowed);
        assert!(store.check("ip", 61_000).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn rejected_attempts_do_not_extend_window() {
        let store = limiter();
        for t in 0..5 {
            store.check("ip", t).await.unwrap();
        }
        for t in 10..20 {
            assert!(!store.check("ip", t * 1_000).await.unwrap().allowed);
        }
        assert!(store.check("ip", 60_000).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let store = limiter();
        for t in 0..5 {
            store.check("a", t).await.unwrap();
        }
        assert!(!store.check("a", 10).await.unwrap().allowed);
        assert!(store.check("b", 10).await.unwrap().allowed);
    }

    #[test]
    fn retry_after_is_at_least_one_second() {
        let d = RateDecision { allowed: false, limit: 5, remaining: 0, reset_at_ms: 1_000 };
        assert_eq!(d.retry_after_secs(999), 1);
        assert_eq!(d.retry_after_secs(5_000), 1);
        assert_eq!(d.retry_after_secs(0), 1);
        assert_eq!(RateDecision { reset_at_ms: 2_500, ..d }.retry_after_secs(0), 3);
    }

    #[test]
    fn reset_rounds_up_to_whole_seconds() {
        let d = RateDecision { allowed: true, limit: 5, remaining: 4, reset_at_ms: 60_001 };
        assert_eq!(d.reset_at_secs(), 61);
        assert_eq!(RateDecision { reset_at_ms: 60_000, ..d }.reset_at_secs(), 60);
    }
}
