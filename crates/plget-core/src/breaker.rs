//! Circuit breaker guarding the media fetcher.
//!
//! One breaker is shared by every worker of an orchestrator. Retries happen inside
//! a single job; the breaker counts failed *jobs* and, past the threshold, makes
//! further jobs fail fast until a cooldown has passed.
//!
//! ```text
//! Closed --[failures >= threshold]--> Open
//! Open --[open_timeout elapsed, can_execute()]--> HalfOpen
//! HalfOpen --[record_success()]--> Closed
//! HalfOpen --[record_failure()]--> Open
//! ```

use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Rejecting calls until the open timeout passes.
    Open,
    /// Cooldown passed; trial calls go through.
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_timeout: Duration,
    inner: Mutex<Inner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            open_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a call may go through. An open breaker whose timeout has elapsed
    /// moves to HalfOpen and allows the call.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = inner
                    .last_failure
                    .map_or(true, |t| t.elapsed() > self.open_timeout);
                if cooled {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!("circuit breaker half-open; probing upstream");
                }
                cooled
            }
        }
    }

    /// A trial call succeeded: close the breaker and forget past failures.
    /// Successes while Closed leave the failure count alone.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.failure_count = 0;
            inner.state = CircuitState::Closed;
            tracing::info!("circuit breaker closed");
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        if inner.failure_count >= self.failure_threshold && inner.state != CircuitState::Open {
            inner.state = CircuitState::Open;
            tracing::warn!(
                failures = inner.failure_count,
                cooldown_secs = self.open_timeout.as_secs(),
                "circuit breaker opened"
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }
}
