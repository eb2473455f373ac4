//! Job orchestration.
//!
//! Coordinates a playlist run: extraction → job records in the store → bounded
//! worker pool (circuit breaker, retry, progress) → session finalization.
//! Also prepares resume of interrupted or partially failed runs.

mod invoke;
mod orchestrator;
mod parallel;
mod report;
mod worker;

pub use orchestrator::Orchestrator;
pub use report::{JobOutcome, OutcomeStatus, SessionReport};

#[cfg(test)]
mod tests;
