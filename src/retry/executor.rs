//! Retry executor that drives an async operation through a strategy.

use std::sync::Arc;

use crate::error::{ErrorKind, UppError};
use crate::retry::RetryStrategy;
use crate::utils::cancel::CancelHandle;

/// Wraps every network call with a retry strategy and a cancel handle.
///
/// `before_request` throttling and `on_retry` sleeps are both raced against
/// the cancel handle, so cancellation wakes any pending delay immediately
/// with `CANCELLED` instead of completing the delay.
pub struct RetryExecutor {
    strategy: Arc<dyn RetryStrategy>,
}

impl RetryExecutor {
    pub fn new(strategy: Arc<dyn RetryStrategy>) -> Self {
        Self { strategy }
    }

    /// Execute `operation` until it succeeds, the strategy declines a
    /// further attempt, or the handle is cancelled.
    pub async fn execute<F, Fut, T>(
        &self,
        cancel: &CancelHandle,
        mut operation: F,
    ) -> Result<T, UppError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, UppError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            // Proactive throttling: keep asking until the strategy admits us.
            while let Some(delay) = self.strategy.before_request().await {
                tracing::debug!(delay_ms = delay.as_millis() as u64, "throttled before request");
                cancel.sleep(delay).await?;
            }

            match cancel.guard(operation()).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if error.kind() == ErrorKind::Cancelled {
                        return Err(error);
                    }
                    match self.strategy.on_retry(&error, attempt) {
                        Some(delay) => {
                            tracing::debug!(
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                kind = %error.kind(),
                                "retrying after failure"
                            );
                            cancel.sleep(delay).await?;
                            attempt += 1;
                        }
                        None => return Err(error),
                    }
                }
            }
        }
    }
}
