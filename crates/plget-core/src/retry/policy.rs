use rand::Rng;
use std::time::Duration;

use super::classify::ErrorKind;
use super::error::{Attempt, FetchError};

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff policy with caps and optional jitter.
///
/// Immutable once built; the `with_*` methods consume and return a new value.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    growth_factor: f64,
    jitter: bool,
    retryable: Vec<ErrorKind>,
}

/// Jitter perturbs a delay by up to this fraction in either direction.
const JITTER_FRACTION: f64 = 0.25;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            growth_factor: 2.0,
            jitter: true,
            retryable: vec![
                ErrorKind::Network,
                ErrorKind::QuotaExceeded,
                ErrorKind::Unknown,
            ],
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    pub fn with_growth_factor(mut self, growth_factor: f64) -> Self {
        self.growth_factor = growth_factor;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retryable(mut self, kinds: &[ErrorKind]) -> Self {
        self.retryable = kinds.to_vec();
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// `attempt` is 1-based. False once the attempt budget is spent or the kind is
    /// not in the retryable set.
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        attempt < self.max_attempts && self.is_retryable(kind)
    }

    /// Backoff before the attempt after `attempt`:
    /// `min(max, base * growth^(attempt-1))`, then ±25% jitter, never negative.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_delay.as_secs_f64() * self.growth_factor.powi(exp);
        let max = self.max_delay.as_secs_f64();
        let capped = if raw.is_finite() { raw.min(max) } else { max };

        let secs = if self.jitter && capped > 0.0 {
            let spread = capped * JITTER_FRACTION;
            capped + rand::rng().random_range(-spread..=spread)
        } else {
            capped
        };
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(self.max_delay)
    }

    /// Combine `should_retry` and `compute_delay`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if self.should_retry(kind, attempt) {
            RetryDecision::RetryAfter(self.compute_delay(attempt))
        } else {
            RetryDecision::NoRetry
        }
    }

    /// Turn a raw fetcher failure into a tagged attempt result.
    pub fn assess<T>(&self, message: &str, source_url: &str) -> Attempt<T> {
        let err = FetchError::classify(message, Some(source_url));
        if self.is_retryable(err.kind) {
            Attempt::Retryable(err)
        } else {
            Attempt::Fatal(err)
        }
    }
}
