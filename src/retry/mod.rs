//! Retry and rate-limit strategies.
//!
//! A [`RetryStrategy`] decides whether/when to retry a failed call
//! (`on_retry`) and may throttle a call before it starts (`before_request`).
//! Failure classification is owned by the error taxonomy; strategies only
//! consult [`UppError::kind`](crate::error::UppError::kind).
//!
//! Strategy instances may be shared across an application and mutated by
//! concurrent calls; stateful strategies either serialize internal mutation
//! (token bucket) or support [`fork`](RetryStrategy::fork) for per-request
//! isolation (retry-after cache).

mod executor;
mod strategies;

pub use executor::RetryExecutor;
pub use strategies::{ExponentialBackoff, LinearBackoff, NoRetry, RetryAfterBackoff, TokenBucket};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::UppError;

/// A pluggable retry/rate-limit policy.
#[async_trait]
pub trait RetryStrategy: Send + Sync {
    /// Called after a failed call. `attempt` is 1-indexed. Returns the delay
    /// to wait before the next attempt, or `None` to stop retrying (the last
    /// error is then surfaced to the caller).
    fn on_retry(&self, error: &UppError, attempt: u32) -> Option<Duration>;

    /// Called before every call for proactive throttling. `None` means
    /// proceed immediately; `Some(delay)` means wait and ask again.
    async fn before_request(&self) -> Option<Duration> {
        None
    }

    /// Reactive, server-driven hint (e.g. a `Retry-After` header), consumed
    /// by the next `on_retry` call. Default: ignored.
    fn set_retry_after(&self, _delay: Duration) {}

    /// Produce an independent copy with no shared mutable state, for
    /// per-request isolation of concurrent callers.
    fn fork(&self) -> Arc<dyn RetryStrategy>;
}
