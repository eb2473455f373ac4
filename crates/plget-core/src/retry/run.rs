//! Retry loop: run an attempt until success or the policy says stop.

use std::future::Future;

use super::error::{Attempt, FetchError};
use super::policy::{RetryDecision, RetryPolicy};
use crate::control::ShutdownCoordinator;

/// Runs `op` until it succeeds, fails fatally, or the attempt budget is spent.
///
/// `op` receives the 1-based attempt number. Retryable failures wait for the
/// policy's backoff; the wait ends early (and the job gives up with
/// `ShutdownRequested`) once shutdown is requested. The in-flight attempt itself
/// is never interrupted.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    shutdown: &ShutdownCoordinator,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut attempt = 1u32;
    loop {
        let err = match op(attempt).await {
            Attempt::Ok(value) => {
                tracing::debug!(attempt, "attempt succeeded");
                return Ok(value);
            }
            Attempt::Fatal(err) => {
                tracing::warn!(
                    kind = %err.kind,
                    attempt,
                    error = %err.message,
                    "non-retryable failure"
                );
                return Err(err);
            }
            Attempt::Retryable(err) => err,
        };

        let delay = match policy.decide(attempt, err.kind) {
            RetryDecision::NoRetry => {
                tracing::warn!(
                    kind = %err.kind,
                    attempt,
                    error = %err.message,
                    "giving up after final attempt"
                );
                return Err(err);
            }
            RetryDecision::RetryAfter(d) => d,
        };

        if shutdown.is_shutdown_requested() {
            tracing::info!(kind = %err.kind, attempt, "shutdown requested; skipping retry");
            return Err(FetchError::shutdown_requested());
        }
        tracing::info!(
            kind = %err.kind,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err.message,
            "retrying after backoff"
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.wait_for_shutdown() => {
                tracing::info!(attempt, "shutdown requested during backoff");
                return Err(FetchError::shutdown_requested());
            }
        }
        attempt += 1;
    }
}
