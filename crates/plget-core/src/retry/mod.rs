//! Error classification, retry and backoff policy.
//!
//! Failures reported by the media fetcher arrive as free text. This module maps
//! them into a closed [`ErrorKind`] taxonomy and decides, through a shared
//! [`RetryPolicy`], whether a job gets another attempt and how long to wait first.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, ErrorKind};
pub use error::{Attempt, FetchError};
pub use policy::{RetryDecision, RetryPolicy};
pub use run::run_with_retry;
