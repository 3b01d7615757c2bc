//! Bounded retry with linear backoff, per-call timeout and cancellation.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

/// How often and how patiently to retry an external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` means a single attempt.
    pub max_retries: u32,
    /// Base delay, multiplied by the retry number.
    pub base_delay: Duration,
    /// Upper bound for a single attempt. `None` disables the timeout.
    pub call_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            call_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `base_delay × retry`.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `policy.max_retries` retries are spent.
///
/// `op` receives the zero-based attempt number. Each attempt is bounded by
/// `policy.call_timeout`; both the attempt and the backoff sleep abort as
/// soon as `cancel` fires.
///
/// # Errors
///
/// Returns the last attempt's error once retries are exhausted,
/// `LlmError::Timeout` for an attempt that exceeded the timeout, or
/// `LlmError::Cancelled`.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, LlmError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        let outcome = tokio::select! {
            () = cancel.cancelled() => return Err(LlmError::Cancelled),
            res = bounded(policy.call_timeout, op(attempt)) => res,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_retryable() || attempt >= policy.max_retries {
            return Err(err);
        }

        attempt += 1;
        let delay = policy.backoff(attempt);
        tracing::warn!(
            "{label} failed ({err}), retrying in {}ms ({attempt}/{})",
            delay.as_millis(),
            policy.max_retries
        );

        tokio::select! {
            () = cancel.cancelled() => return Err(LlmError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

async fn bounded<T, Fut>(limit: Option<Duration>, fut: Fut) -> Result<T, LlmError>
where
    Fut: Future<Output = Result<T, LlmError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(LlmError::Timeout(limit))),
        None => fut.await,
    }
}
