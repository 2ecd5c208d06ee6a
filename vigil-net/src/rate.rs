//! Adaptive per-source rate limiting
//!
//! Each source carries a sliding 60-second request history plus whatever
//! the server last told us about our quota. Admission is serialized per
//! source: one `wait_for_slot` evaluation at a time, FIFO, so concurrent
//! callers for the same source never race on the history while callers for
//! different sources never block each other.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::header::HeaderMap;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::debug;

use crate::NetConfig;

/// Sliding window for request history
const WINDOW: Duration = Duration::from_secs(60);

/// Base backoff delay in seconds
const BACKOFF_BASE_SECS: f64 = 1.0;

/// Extra scale applied when dynamic backoff is enabled
const DYNAMIC_SCALE: f64 = 1.5;

/// Live rate state for a single source
#[derive(Debug)]
pub struct RateLimit {
    /// Admission ceiling, adjustable by server feedback
    pub max_per_minute: u32,
    /// Daily ceiling, informational
    pub max_per_day: Option<u32>,
    /// Remaining-quota counter from the last response
    pub remaining: Option<i64>,
    /// Server-mandated wait deadline (Retry-After)
    pub reset_at: Option<Instant>,
    /// Timestamps of admitted requests within the trailing window
    history: VecDeque<Instant>,
}

impl RateLimit {
    pub fn new(max_per_minute: u32, max_per_day: Option<u32>) -> Self {
        Self {
            max_per_minute,
            max_per_day,
            remaining: None,
            reset_at: None,
            history: VecDeque::new(),
        }
    }

    /// Minimum interval between requests
    pub fn allowance(&self) -> Duration {
        if self.max_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(60.0 / self.max_per_minute as f64)
        }
    }
}

/// Read-only view of a source's rate state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub max_per_minute: u32,
    pub max_per_day: Option<u32>,
    pub remaining: Option<i64>,
    pub has_reset_deadline: bool,
    pub recent_requests: usize,
}

/// Coordinates admission and backoff for all sources
pub struct RateLimiter {
    limits: DashMap<String, Arc<Mutex<RateLimit>>>,
    default_per_minute: u32,
    dynamic: bool,
}

impl RateLimiter {
    pub fn new(default_per_minute: u32, dynamic: bool) -> Self {
        Self {
            limits: DashMap::new(),
            default_per_minute,
            dynamic,
        }
    }

    pub fn from_config(config: &NetConfig) -> Self {
        Self::new(config.default_per_minute, config.dynamic_backoff)
    }

    /// Install or overwrite static limits for a source
    ///
    /// Callers already suspended in `wait_for_slot` keep the entry they
    /// locked; only subsequent admissions see the new configuration.
    pub fn register(&self, source: &str, max_per_minute: u32, max_per_day: Option<u32>) {
        self.limits.insert(
            source.to_string(),
            Arc::new(Mutex::new(RateLimit::new(max_per_minute, max_per_day))),
        );
        debug!(source, max_per_minute, "registered rate limit");
    }

    fn entry(&self, source: &str) -> Arc<Mutex<RateLimit>> {
        self.limits
            .entry(source.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(RateLimit::new(self.default_per_minute, None)))
            })
            .clone()
    }

    /// Adjust a source's limits from server response headers
    ///
    /// Honors `X-RateLimit-Limit`, `X-RateLimit-Remaining` and
    /// `Retry-After` (seconds). Unknown sources and unparseable values are
    /// ignored, leaving the existing state untouched.
    pub async fn update_from_headers(&self, source: &str, headers: &HeaderMap) {
        let Some(entry) = self.limits.get(source).map(|e| e.value().clone()) else {
            return;
        };
        let mut limit = entry.lock().await;

        if let Some(raw) = header_str(headers, "x-ratelimit-limit") {
            match raw.parse::<u32>() {
                Ok(ceiling) if ceiling > 0 => limit.max_per_minute = ceiling,
                _ => debug!(source, raw, "ignoring unparseable rate ceiling"),
            }
        }
        if let Some(raw) = header_str(headers, "x-ratelimit-remaining") {
            match raw.parse::<i64>() {
                Ok(remaining) => limit.remaining = Some(remaining),
                Err(_) => debug!(source, raw, "ignoring unparseable remaining quota"),
            }
        }
        if let Some(raw) = header_str(headers, "retry-after") {
            match raw.parse::<f64>() {
                Ok(delay) if delay >= 0.0 => {
                    limit.reset_at = Some(Instant::now() + Duration::from_secs_f64(delay));
                }
                _ => debug!(source, raw, "ignoring unparseable retry-after"),
            }
        }
    }

    /// Suspend until a request slot is available for the source
    ///
    /// Sources seen for the first time get the default per-minute
    /// allowance. Server-signaled deadlines and exhausted quota counters
    /// are honored before the smoothed per-minute spacing.
    pub async fn wait_for_slot(&self, source: &str) {
        let entry = self.entry(source);
        let mut limit = entry.lock().await;

        let now = Instant::now();
        if limit.reset_at.is_some_and(|deadline| deadline > now) {
            let deadline = limit.reset_at.take().unwrap_or(now);
            debug!(source, "respecting retry-after deadline");
            sleep_until(deadline).await;
        } else if limit.remaining.is_some_and(|remaining| remaining <= 0) {
            let delay = limit.allowance();
            debug!(source, "remaining quota exhausted");
            sleep(delay).await;
            limit.remaining = None;
        }

        let now = Instant::now();
        while limit
            .history
            .front()
            .is_some_and(|first| now.duration_since(*first) > WINDOW)
        {
            limit.history.pop_front();
        }

        let allowance = limit.allowance();
        if allowance > Duration::ZERO {
            if let Some(last) = limit.history.back().copied() {
                let elapsed = now.duration_since(last);
                if elapsed < allowance {
                    let wait = allowance - elapsed;
                    debug!(source, wait_ms = wait.as_millis() as u64, "waiting for slot");
                    sleep(wait).await;
                }
            }
        }
        limit.history.push_back(Instant::now());
    }

    /// Backoff delay for a failed request: `1s * 2^attempt`, scaled 1.5x
    /// when dynamic backoff is on. Pure calculation, no state change.
    pub fn record_failure(&self, source: &str, attempt: u32) -> Duration {
        let mut secs = BACKOFF_BASE_SECS * 2f64.powi(attempt as i32);
        if self.dynamic {
            secs *= DYNAMIC_SCALE;
        }
        debug!(source, attempt, delay_secs = secs, "calculated backoff");
        Duration::from_secs_f64(secs)
    }

    /// Current state for a source, if it has been seen
    pub async fn snapshot(&self, source: &str) -> Option<RateLimitSnapshot> {
        let entry = self.limits.get(source).map(|e| e.value().clone())?;
        let limit = entry.lock().await;
        Some(RateLimitSnapshot {
            max_per_minute: limit.max_per_minute,
            max_per_day: limit.max_per_day,
            remaining: limit.remaining,
            has_reset_deadline: limit.reset_at.is_some(),
            recent_requests: limit.history.len(),
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_slots_are_spaced() {
        let limiter = RateLimiter::new(60, false);
        limiter.register("otx", 60, None);

        let start = Instant::now();
        for _ in 0..3 {
            limiter.wait_for_slot("otx").await;
        }
        // 60/min means one-second spacing: three calls span at least two
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_slot_is_immediate() {
        let limiter = RateLimiter::new(60, false);
        limiter.register("otx", 60, None);

        let start = Instant::now();
        limiter.wait_for_slot("otx").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_source_gets_default_limit() {
        let limiter = RateLimiter::new(30, false);
        limiter.wait_for_slot("mystery").await;

        let snapshot = limiter.snapshot("mystery").await.unwrap();
        assert_eq!(snapshot.max_per_minute, 30);
        assert_eq!(snapshot.recent_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_delays_next_slot() {
        let limiter = RateLimiter::new(60, false);
        limiter.register("otx", 60, None);
        limiter
            .update_from_headers("otx", &headers(&[("retry-after", "5")]))
            .await;

        let start = Instant::now();
        limiter.wait_for_slot("otx").await;
        assert!(start.elapsed() >= Duration::from_secs(5));

        // Deadline is cleared once honored
        let snapshot = limiter.snapshot("otx").await.unwrap();
        assert!(!snapshot.has_reset_deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_quota_waits_one_interval() {
        let limiter = RateLimiter::new(60, false);
        limiter.register("otx", 60, None);
        limiter
            .update_from_headers("otx", &headers(&[("x-ratelimit-remaining", "0")]))
            .await;

        let start = Instant::now();
        limiter.wait_for_slot("otx").await;
        assert!(start.elapsed() >= Duration::from_secs(1));

        let snapshot = limiter.snapshot("otx").await.unwrap();
        assert_eq!(snapshot.remaining, None);
    }

    #[tokio::test]
    async fn test_ceiling_adjusts_from_headers() {
        let limiter = RateLimiter::new(60, false);
        limiter.register("otx", 60, None);
        limiter
            .update_from_headers("otx", &headers(&[("x-ratelimit-limit", "10")]))
            .await;

        let snapshot = limiter.snapshot("otx").await.unwrap();
        assert_eq!(snapshot.max_per_minute, 10);
    }

    #[tokio::test]
    async fn test_unparseable_headers_leave_state_unchanged() {
        let limiter = RateLimiter::new(60, false);
        limiter.register("otx", 30, Some(1000));
        limiter
            .update_from_headers(
                "otx",
                &headers(&[
                    ("x-ratelimit-limit", "plenty"),
                    ("x-ratelimit-remaining", "lots"),
                    ("retry-after", "soon"),
                ]),
            )
            .await;

        let snapshot = limiter.snapshot("otx").await.unwrap();
        assert_eq!(snapshot.max_per_minute, 30);
        assert_eq!(snapshot.max_per_day, Some(1000));
        assert_eq!(snapshot.remaining, None);
        assert!(!snapshot.has_reset_deadline);
    }

    #[tokio::test]
    async fn test_update_for_unregistered_source_is_noop() {
        let limiter = RateLimiter::new(60, false);
        limiter
            .update_from_headers("ghost", &headers(&[("x-ratelimit-limit", "5")]))
            .await;
        assert!(limiter.snapshot("ghost").await.is_none());
    }

    #[test]
    fn test_backoff_monotonic_in_attempt() {
        let limiter = RateLimiter::new(60, false);
        let mut previous = Duration::ZERO;
        for attempt in 1..=6 {
            let delay = limiter.record_failure("otx", attempt);
            assert!(delay > previous);
            previous = delay;
        }
    }

    #[test]
    fn test_dynamic_backoff_is_strictly_larger() {
        let steady = RateLimiter::new(60, false);
        let dynamic = RateLimiter::new(60, true);
        for attempt in 1..=4 {
            assert!(dynamic.record_failure("otx", attempt) > steady.record_failure("otx", attempt));
        }
    }

    #[test]
    fn test_allowance_zero_ceiling() {
        let limit = RateLimit::new(0, None);
        assert_eq!(limit.allowance(), Duration::ZERO);
    }
}
