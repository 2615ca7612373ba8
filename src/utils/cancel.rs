//! Cancellation utilities
//!
//! First-class cancellation handles for turns, retries and streams. Every
//! in-flight suspension (model call, tool task, retry sleep) is bound to a
//! [`CancelHandle`]; cancelling raises `CANCELLED` through every affected
//! layer and wakes pending delays immediately.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::UppError;
use crate::streaming::EventStream;

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Create a new cancel handle.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request cancellation. Pending sleeps wake immediately; wrapped
    /// streams yield a `CANCELLED` error on their next poll.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that resolves when cancellation is requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Sleep for `duration`, or fail with `CANCELLED` as soon as the handle
    /// fires, whichever comes first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), UppError> {
        tokio::select! {
            _ = self.token.cancelled() => Err(UppError::cancelled()),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Run a future to completion, or fail with `CANCELLED` if the handle
    /// fires first.
    pub async fn guard<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, UppError>>,
    ) -> Result<T, UppError> {
        tokio::select! {
            _ = self.token.cancelled() => Err(UppError::cancelled()),
            out = fut => out,
        }
    }
}

/// Wrap an event stream so cancellation surfaces as a single `CANCELLED`
/// error item followed by end-of-stream.
pub fn cancellable_events(stream: EventStream, handle: CancelHandle) -> EventStream {
    let mut inner = stream;
    Box::pin(async_stream::stream! {
        use futures::StreamExt;
        loop {
            tokio::select! {
                _ = handle.cancelled() => {
                    yield Err(UppError::cancelled());
                    break;
                }
                item = inner.next() => {
                    let Some(item) = item else { break };
                    // An item that raced with cancellation is dropped so the
                    // stream ends with exactly one CANCELLED error.
                    if handle.is_cancelled() {
                        yield Err(UppError::cancelled());
                        break;
                    }
                    yield item;
                }
            }
        }
    })
}
