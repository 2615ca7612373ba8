//! Built-in retry strategies: exponential/linear backoff, no-retry,
//! token-bucket throttling and Retry-After–driven delays.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{ErrorKind, UppError};
use crate::retry::RetryStrategy;

/// Exponential backoff: `min(base_delay * 2^(attempt-1), max_delay)`,
/// optionally jittered by a uniform factor in `[0.5, 1.0)`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum attempts.
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base delay for the first retry.
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the delay ceiling.
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub const fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn on_retry(&self, error: &UppError, attempt: u32) -> Option<Duration> {
        if !error.is_retryable() || attempt > self.max_attempts {
            return None;
        }
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        Some(if self.jitter {
            let factor = rand::thread_rng().gen_range(0.5..1.0);
            Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
        } else {
            delay
        })
    }

    fn fork(&self) -> Arc<dyn RetryStrategy> {
        Arc::new(self.clone())
    }
}

/// Linear backoff: `delay * attempt`.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    max_attempts: u32,
    delay: Duration,
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl LinearBackoff {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl RetryStrategy for LinearBackoff {
    fn on_retry(&self, error: &UppError, attempt: u32) -> Option<Duration> {
        if !error.is_retryable() || attempt > self.max_attempts {
            return None;
        }
        Some(self.delay.saturating_mul(attempt))
    }

    fn fork(&self) -> Arc<dyn RetryStrategy> {
        Arc::new(self.clone())
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn on_retry(&self, _error: &UppError, _attempt: u32) -> Option<Duration> {
        None
    }

    fn fork(&self) -> Arc<dyn RetryStrategy> {
        Arc::new(Self)
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket: proactive throttling with continuous refill.
///
/// All state mutation (refill + consume) is serialized behind a
/// `tokio::sync::Mutex` whose waiters form a FIFO queue, so two simultaneous
/// `before_request` calls can never both observe and consume the same token.
pub struct TokenBucket {
    max_tokens: f64,
    /// Tokens per second.
    refill_rate: f64,
    max_attempts: u32,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(max_tokens: u32, refill_rate: f64) -> Self {
        Self {
            max_tokens: f64::from(max_tokens),
            refill_rate: refill_rate.max(f64::MIN_POSITIVE),
            max_attempts: 3,
            state: Mutex::new(BucketState {
                tokens: f64::from(max_tokens),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Set maximum retry attempts for rate-limited errors.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// One token-refill interval in milliseconds, rounded up.
    fn refill_interval_ms(&self) -> u64 {
        (1000.0 / self.refill_rate).ceil() as u64
    }
}

#[async_trait]
impl RetryStrategy for TokenBucket {
    fn on_retry(&self, error: &UppError, attempt: u32) -> Option<Duration> {
        if error.kind() != ErrorKind::RateLimited || attempt > self.max_attempts {
            return None;
        }
        // Wait for two token-refill intervals.
        Some(Duration::from_millis(
            (1000.0 / self.refill_rate * 2.0).ceil() as u64,
        ))
    }

    async fn before_request(&self) -> Option<Duration> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        state.last_refill = now;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_millis(self.refill_interval_ms()))
        }
    }

    fn fork(&self) -> Arc<dyn RetryStrategy> {
        Arc::new(Self::new(self.max_tokens as u32, self.refill_rate).with_max_attempts(self.max_attempts))
    }
}

/// Retry-After–aware strategy: only rate-limited errors are retryable, and a
/// server-provided hint overrides the fixed fallback delay exactly once.
pub struct RetryAfterBackoff {
    max_attempts: u32,
    fallback_delay: Duration,
    hint: StdMutex<Option<Duration>>,
}

impl Default for RetryAfterBackoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            fallback_delay: Duration::from_millis(1000),
            hint: StdMutex::new(None),
        }
    }
}

impl RetryAfterBackoff {
    pub fn new(max_attempts: u32, fallback_delay: Duration) -> Self {
        Self {
            max_attempts,
            fallback_delay,
            hint: StdMutex::new(None),
        }
    }
}

impl RetryStrategy for RetryAfterBackoff {
    fn on_retry(&self, error: &UppError, attempt: u32) -> Option<Duration> {
        if error.kind() != ErrorKind::RateLimited || attempt > self.max_attempts {
            return None;
        }
        // One-shot override: consumed and cleared by this call.
        let hint = self.hint.lock().expect("retry-after hint poisoned").take();
        Some(hint.unwrap_or(self.fallback_delay))
    }

    fn set_retry_after(&self, delay: Duration) {
        *self.hint.lock().expect("retry-after hint poisoned") = Some(delay);
    }

    /// The copy starts with no cached server hint, so concurrent requests do
    /// not share mutable hint state.
    fn fork(&self) -> Arc<dyn RetryStrategy> {
        Arc::new(Self::new(self.max_attempts, self.fallback_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_limited() -> UppError {
        UppError::rate_limited("429")
    }

    #[test]
    fn exponential_backoff_doubles_then_stops() {
        let s = ExponentialBackoff::new()
            .with_max_attempts(3)
            .with_base_delay(Duration::from_millis(1000))
            .with_max_delay(Duration::from_secs(30))
            .with_jitter(false);

        assert_eq!(
            s.on_retry(&rate_limited(), 1),
            Some(Duration::from_millis(1000))
        );
        assert_eq!(
            s.on_retry(&rate_limited(), 2),
            Some(Duration::from_millis(2000))
        );
        assert_eq!(
            s.on_retry(&rate_limited(), 3),
            Some(Duration::from_millis(4000))
        );
        assert_eq!(s.on_retry(&rate_limited(), 4), None);
    }

    #[test]
    fn exponential_backoff_caps_at_max_delay() {
        let s = ExponentialBackoff::new()
            .with_max_attempts(10)
            .with_base_delay(Duration::from_millis(1000))
            .with_max_delay(Duration::from_millis(3000))
            .with_jitter(false);
        assert_eq!(
            s.on_retry(&rate_limited(), 7),
            Some(Duration::from_millis(3000))
        );
    }

    #[test]
    fn exponential_backoff_jitter_stays_in_half_open_range() {
        let s = ExponentialBackoff::new()
            .with_max_attempts(3)
            .with_base_delay(Duration::from_millis(1000))
            .with_jitter(true);
        for _ in 0..100 {
            let d = s.on_retry(&rate_limited(), 1).unwrap();
            assert!(d >= Duration::from_millis(500));
            assert!(d < Duration::from_millis(1000));
        }
    }

    #[test]
    fn exponential_backoff_ignores_fatal_kinds() {
        let s = ExponentialBackoff::new().with_jitter(false);
        assert_eq!(s.on_retry(&UppError::invalid_request("bad"), 1), None);
        assert_eq!(s.on_retry(&UppError::cancelled(), 1), None);
        assert!(s.on_retry(&UppError::timeout("slow"), 1).is_some());
        assert!(s.on_retry(&UppError::network("reset"), 1).is_some());
        assert!(s.on_retry(&UppError::provider_error("500"), 1).is_some());
    }

    #[test]
    fn linear_backoff_scales_with_attempt() {
        let s = LinearBackoff::new(3, Duration::from_millis(1000));
        assert_eq!(
            s.on_retry(&rate_limited(), 1),
            Some(Duration::from_millis(1000))
        );
        assert_eq!(
            s.on_retry(&rate_limited(), 2),
            Some(Duration::from_millis(2000))
        );
        assert_eq!(
            s.on_retry(&rate_limited(), 3),
            Some(Duration::from_millis(3000))
        );
        assert_eq!(s.on_retry(&rate_limited(), 4), None);
    }

    #[test]
    fn no_retry_always_declines() {
        let s = NoRetry;
        assert_eq!(s.on_retry(&rate_limited(), 1), None);
        assert_eq!(s.on_retry(&UppError::network("x"), 1), None);
    }

    #[tokio::test(start_paused = true)]
    async fn token_bucket_consumes_then_throttles_then_refills() {
        let s = TokenBucket::new(2, 1.0);
        assert_eq!(s.before_request().await, None);
        assert_eq!(s.before_request().await, None);
        // Bucket empty, no refill elapsed: wait one refill interval.
        assert_eq!(
            s.before_request().await,
            Some(Duration::from_millis(1000))
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(s.before_request().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn token_bucket_serializes_concurrent_callers() {
        let s = Arc::new(TokenBucket::new(1, 1.0));
        let a = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.before_request().await })
        };
        let b = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.before_request().await })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        // Exactly one caller gets the single token.
        assert!(a.is_none() ^ b.is_none(), "a={a:?} b={b:?}");
    }

    #[test]
    fn token_bucket_retries_rate_limited_only() {
        let s = TokenBucket::new(2, 1.0);
        assert_eq!(
            s.on_retry(&rate_limited(), 1),
            Some(Duration::from_millis(2000))
        );
        assert_eq!(s.on_retry(&UppError::network("x"), 1), None);
        assert_eq!(s.on_retry(&rate_limited(), 4), None);
    }

    #[test]
    fn retry_after_hint_is_one_shot() {
        let s = RetryAfterBackoff::new(3, Duration::from_millis(1000));
        s.set_retry_after(Duration::from_secs(7));
        assert_eq!(s.on_retry(&rate_limited(), 1), Some(Duration::from_secs(7)));
        // Hint consumed; falls back to the fixed delay.
        assert_eq!(
            s.on_retry(&rate_limited(), 2),
            Some(Duration::from_millis(1000))
        );
        assert_eq!(s.on_retry(&UppError::timeout("x"), 1), None);
    }

    #[test]
    fn retry_after_fork_does_not_share_hint() {
        let s = RetryAfterBackoff::new(3, Duration::from_millis(1000));
        s.set_retry_after(Duration::from_secs(9));
        let copy = s.fork();
        assert_eq!(
            copy.on_retry(&rate_limited(), 1),
            Some(Duration::from_millis(1000))
        );
        // Original still holds its hint.
        assert_eq!(s.on_retry(&rate_limited(), 1), Some(Duration::from_secs(9)));
    }
}
