//! Classified fetch error and the tagged attempt result.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::classify::{classify, ErrorKind};

/// A failure with its kind, the original message and the source it came from.
/// This is what ends up in a job's `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl FetchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source_url: None,
        }
    }

    /// Classify a raw fetcher message.
    pub fn classify(message: impl Into<String>, source_url: Option<&str>) -> Self {
        let message = message.into();
        Self {
            kind: classify(&message),
            message,
            source_url: source_url.map(str::to_string),
        }
    }

    pub fn circuit_open() -> Self {
        Self::new(
            ErrorKind::CircuitOpen,
            "circuit breaker is open; upstream calls are suspended",
        )
    }

    pub fn shutdown_requested() -> Self {
        Self::new(ErrorKind::ShutdownRequested, "shutdown requested")
    }

    pub fn with_source(mut self, source_url: impl Into<String>) -> Self {
        self.source_url = Some(source_url.into());
        self
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

/// Outcome of a single attempt, as inspected by the retry loop.
#[derive(Debug)]
pub enum Attempt<T> {
    Ok(T),
    /// Worth another attempt if the budget allows.
    Retryable(FetchError),
    /// Stop now; remaining attempts are skipped.
    Fatal(FetchError),
}

impl<T> Attempt<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Attempt::Ok(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_keeps_message_and_source() {
        let e = FetchError::classify("HTTP Error 429: Too Many Requests", Some("https://a/b"));
        assert_eq!(e.kind, ErrorKind::QuotaExceeded);
        assert_eq!(e.message, "HTTP Error 429: Too Many Requests");
        assert_eq!(e.source_url.as_deref(), Some("https://a/b"));
        assert_eq!(e.to_string(), "quota_exceeded: HTTP Error 429: Too Many Requests");
    }

    #[test]
    fn json_shape() {
        let e = FetchError::new(ErrorKind::Unavailable, "gone");
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["kind"], "unavailable");
        assert!(v.get("source_url").is_none());
        let back: FetchError = serde_json::from_value(v).unwrap();
        assert_eq!(back, e);
    }
}
