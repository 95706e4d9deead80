//! Retry logic with exponential backoff.
//!
//! Provides a retry wrapper using the `backon` crate, applied on the
//! discovery fetch path. Switch attempts are never retried here — the next
//! discovery result is the retry.

use std::{future::Future, sync::atomic::AtomicU32, time::Duration};

use backon::{ExponentialBuilder, Retryable};

use crate::{
    config::RetryPolicy,
    error::{ClientError, Result},
};

/// Execute an async operation with retry using exponential backoff.
///
/// The operation is retried according to the provided [`RetryPolicy`] if it
/// fails with a retryable error (as determined by
/// [`ClientError::is_retryable`]).
///
/// # Retry Strategy
///
/// - **Exponential backoff**: `initial_backoff * multiplier^(attempt-1)`
/// - **Jitter**: randomized via backon to prevent thundering herd
/// - **Cap**: backoff capped at `max_backoff`
/// - **Termination**: after `max_attempts` failed attempts, wrapped in
///   [`ClientError::RetryExhausted`]
///
/// Non-retryable errors are returned immediately without retry.
///
/// # Example
///
/// ```ignore
/// use streamline_sdk::{with_retry, RetryPolicy, ClientError};
///
/// let policy = RetryPolicy::default();
/// let result = with_retry(&policy, || async {
///     Ok::<_, ClientError>("success")
/// }).await;
/// ```
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // backon's max_times is the number of retries, not total attempts.
    let max_retries = policy.max_attempts.saturating_sub(1) as usize;

    let backoff = ExponentialBuilder::new()
        .with_min_delay(policy.initial_backoff)
        .with_max_delay(policy.max_backoff)
        .with_factor(policy.multiplier as f32)
        .with_max_times(max_retries)
        .with_jitter();

    let attempt_count = AtomicU32::new(0);

    operation
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .when(|e: &ClientError| e.is_retryable())
        .notify(|err: &ClientError, dur: Duration| {
            let attempt =
                attempt_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            tracing::debug!(
                attempt = attempt,
                backoff_ms = dur.as_millis() as u64,
                error = %err,
                "retrying after backoff"
            );
        })
        .await
        .map_err(|e| {
            // Exhausted retries get wrapped; non-retryable errors pass through.
            if e.is_retryable() {
                let attempts =
                    attempt_count.load(std::sync::atomic::Ordering::SeqCst) + 1;
                ClientError::RetryExhausted { attempts, last_error: e.to_string() }
            } else {
                e
            }
        })
}
