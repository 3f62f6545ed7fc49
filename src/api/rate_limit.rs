//! Local rate limiting for outgoing requests.
//!
//! Shortcut answers with HTTP 429 once a client exceeds its per-minute
//! request limit. The limiter here keeps a sliding log of granted permits per
//! named bucket and blocks callers until a permit frees up, giving up once
//! the wait would exceed a maximum delay.
//!
//! Time is read through the [`Clock`] trait so tests can drive the limiter
//! with a [`ManualClock`] instead of sleeping for real.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::error::{ApiError, Result};

/// Requests allowed per window, one below Shortcut's published limit.
pub const DEFAULT_MAX_REQUESTS: u32 = 200;

/// Length of the rate limit window.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Longest a caller will wait for a permit, slightly over one window.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(70);

/// Source of monotonic time for the limiter.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Block the current thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// In-memory clock that only moves when told to.
///
/// Sleeping advances the clock by the requested duration and returns
/// immediately, which makes limiter behavior deterministic under test.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// A quota of permits per time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Permits granted per window.
    pub max_requests: u32,
    /// Window length.
    pub interval: Duration,
}

impl RateLimit {
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            max_requests,
            interval,
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_INTERVAL)
    }
}

/// Thread-safe sliding-window rate limiter with named buckets.
///
/// Permits are never credited back: a request that fails after acquiring
/// still counts against the window.
#[derive(Debug)]
pub struct RateLimiter {
    rate: RateLimit,
    max_delay: Duration,
    clock: Arc<dyn Clock>,
    /// Grant timestamps per bucket, oldest first.
    buckets: Mutex<HashMap<String, VecDeque<Duration>>>,
}

impl RateLimiter {
    /// Create a limiter backed by the system clock.
    pub fn new(rate: RateLimit, max_delay: Duration) -> Self {
        Self::with_clock(rate, max_delay, Arc::new(SystemClock::new()))
    }

    /// Create a limiter with an injected clock.
    pub fn with_clock(rate: RateLimit, max_delay: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            rate,
            max_delay,
            clock,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn rate(&self) -> RateLimit {
        self.rate
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Acquire `cost` permits from `bucket`, blocking until they are available.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::RateLimitExceeded`] if the permits cannot be granted
    /// within the limiter's maximum delay. Nothing is consumed in that case.
    pub fn acquire(&self, bucket: &str, cost: u32) -> Result<()> {
        if cost > self.rate.max_requests {
            warn!(
                bucket,
                cost,
                max_requests = self.rate.max_requests,
                "Permit cost exceeds the bucket quota"
            );
            return Err(ApiError::RateLimitExceeded {
                bucket: bucket.to_string(),
                wait: Duration::MAX,
            });
        }

        let mut waited = Duration::ZERO;
        loop {
            let wait = match self.try_acquire(bucket, cost) {
                None => {
                    trace!(bucket, cost, "Permit granted");
                    return Ok(());
                }
                Some(wait) => wait,
            };

            if waited + wait > self.max_delay {
                warn!(
                    bucket,
                    wait_ms = wait.as_millis() as u64,
                    waited_ms = waited.as_millis() as u64,
                    "Rate limit wait exceeds maximum delay"
                );
                return Err(ApiError::RateLimitExceeded {
                    bucket: bucket.to_string(),
                    wait: waited + wait,
                });
            }

            debug!(bucket, wait_ms = wait.as_millis() as u64, "Rate limited, waiting for permit");
            self.clock.sleep(wait);
            waited += wait;
        }
    }

    /// Grant the permits now if the window has room.
    ///
    /// Returns `None` on success, or how long until enough permits free up.
    fn try_acquire(&self, bucket: &str, cost: u32) -> Option<Duration> {
        let mut buckets = self.buckets.lock();
        let log = buckets.entry(bucket.to_string()).or_default();
        let now = self.clock.now();
        self.evict_expired(log, now);

        let limit = self.rate.max_requests as usize;
        let cost = cost as usize;
        if log.len() + cost <= limit {
            log.extend(std::iter::repeat(now).take(cost));
            return None;
        }

        // The grant at this index must expire before `cost` slots are free.
        let blocking = log[log.len() + cost - limit - 1];
        Some((blocking + self.rate.interval).saturating_sub(now))
    }

    fn evict_expired(&self, log: &mut VecDeque<Duration>, now: Duration) {
        while let Some(&granted) = log.front() {
            if now.saturating_sub(granted) >= self.rate.interval {
                log.pop_front();
            } else {
                break;
            }
        }
    }

    /// Permits left in the current window for `bucket`.
    pub fn available(&self, bucket: &str) -> u32 {
        let mut buckets = self.buckets.lock();
        let Some(log) = buckets.get_mut(bucket) else {
            return self.rate.max_requests;
        };
        let now = self.clock.now();
        self.evict_expired(log, now);
        self.rate.max_requests.saturating_sub(log.len() as u32)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimit::default(), DEFAULT_MAX_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUCKET: &str = "test-bucket";

    fn manual_limiter(rate: RateLimit, max_delay: Duration) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(rate, max_delay, clock.clone());
        (clock, limiter)
    }

    #[test]
    fn test_defaults() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.rate().max_requests, 200);
        assert_eq!(limiter.rate().interval, Duration::from_secs(60));
        assert_eq!(limiter.max_delay(), Duration::from_secs(70));
        assert_eq!(limiter.available(BUCKET), 200);
    }

    #[test]
    fn test_quota_granted_without_waiting() {
        let (clock, limiter) = manual_limiter(RateLimit::default(), DEFAULT_MAX_DELAY);

        for _ in 0..200 {
            limiter.acquire(BUCKET, 1).unwrap();
        }

        assert_eq!(clock.now(), Duration::ZERO);
        assert_eq!(limiter.available(BUCKET), 0);
    }

    #[test]
    fn test_201st_request_waits_for_window() {
        let (clock, limiter) = manual_limiter(RateLimit::default(), DEFAULT_MAX_DELAY);

        for _ in 0..200 {
            limiter.acquire(BUCKET, 1).unwrap();
        }
        limiter.acquire(BUCKET, 1).unwrap();

        // Blocked until the first grant left the window
        assert_eq!(clock.now(), Duration::from_secs(60));
    }

    #[test]
    fn test_wait_is_relative_to_oldest_grant() {
        let (clock, limiter) = manual_limiter(
            RateLimit::new(2, Duration::from_secs(60)),
            DEFAULT_MAX_DELAY,
        );

        limiter.acquire(BUCKET, 1).unwrap();
        clock.advance(Duration::from_secs(45));
        limiter.acquire(BUCKET, 1).unwrap();

        limiter.acquire(BUCKET, 1).unwrap();
        assert_eq!(clock.now(), Duration::from_secs(60));
    }

    #[test]
    fn test_fails_when_wait_exceeds_max_delay() {
        let (clock, limiter) = manual_limiter(RateLimit::default(), Duration::from_secs(30));

        for _ in 0..200 {
            limiter.acquire(BUCKET, 1).unwrap();
        }

        let err = limiter.acquire(BUCKET, 1).unwrap_err();
        match err {
            ApiError::RateLimitExceeded { bucket, wait } => {
                assert_eq!(bucket, BUCKET);
                assert_eq!(wait, Duration::from_secs(60));
            }
            other => panic!("Expected RateLimitExceeded, got {:?}", other),
        }
        // Failing fast: no time spent waiting
        assert_eq!(clock.now(), Duration::ZERO);
        assert_eq!(limiter.available(BUCKET), 0);
    }

    #[test]
    fn test_fails_for_long_window() {
        let (_clock, limiter) = manual_limiter(
            RateLimit::new(1, Duration::from_secs(100)),
            DEFAULT_MAX_DELAY,
        );

        limiter.acquire(BUCKET, 1).unwrap();
        assert!(matches!(
            limiter.acquire(BUCKET, 1),
            Err(ApiError::RateLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_cost_larger_than_quota_is_rejected() {
        let (_clock, limiter) = manual_limiter(
            RateLimit::new(5, Duration::from_secs(60)),
            DEFAULT_MAX_DELAY,
        );

        assert!(limiter.acquire(BUCKET, 6).is_err());
        assert_eq!(limiter.available(BUCKET), 5);
    }

    #[test]
    fn test_cost_consumes_multiple_permits() {
        let (clock, limiter) = manual_limiter(
            RateLimit::new(5, Duration::from_secs(60)),
            DEFAULT_MAX_DELAY,
        );

        limiter.acquire(BUCKET, 3).unwrap();
        assert_eq!(limiter.available(BUCKET), 2);

        clock.advance(Duration::from_secs(10));
        limiter.acquire(BUCKET, 2).unwrap();

        // Three slots open once the grants from t=0 leave the window
        limiter.acquire(BUCKET, 3).unwrap();
        assert_eq!(clock.now(), Duration::from_secs(60));
        assert_eq!(limiter.available(BUCKET), 0);
    }

    #[test]
    fn test_buckets_are_independent() {
        let (_clock, limiter) = manual_limiter(
            RateLimit::new(1, Duration::from_secs(60)),
            Duration::from_secs(1),
        );

        limiter.acquire("a", 1).unwrap();
        limiter.acquire("b", 1).unwrap();
        assert!(limiter.acquire("a", 1).is_err());
    }

    #[test]
    fn test_window_slides() {
        let (clock, limiter) = manual_limiter(
            RateLimit::new(2, Duration::from_secs(60)),
            DEFAULT_MAX_DELAY,
        );

        limiter.acquire(BUCKET, 1).unwrap();
        limiter.acquire(BUCKET, 1).unwrap();
        assert_eq!(limiter.available(BUCKET), 0);

        clock.advance(Duration::from_secs(60));
        assert_eq!(limiter.available(BUCKET), 2);
    }

    #[test]
    fn test_shared_across_threads() {
        let interval = Duration::from_millis(200);
        let limiter = Arc::new(RateLimiter::new(
            RateLimit::new(5, interval),
            Duration::from_secs(5),
        ));
        let start = Instant::now();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    for _ in 0..2 {
                        limiter.acquire(BUCKET, 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Ten permits at five per window cannot all land inside one window
        assert!(start.elapsed() >= interval);
    }
}
