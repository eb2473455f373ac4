//! Map free-text fetcher failures into error kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed classification of a failure.
///
/// The first seven kinds come from the fetcher's error text; `CircuitOpen` and
/// `ShutdownRequested` are produced by the engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection, DNS, timeout or upstream 5xx trouble.
    Network,
    /// Rate limiting (429, "too many requests", quota).
    QuotaExceeded,
    /// Item is private, deleted, geo-blocked or otherwise gone.
    Unavailable,
    /// 403 / access denied.
    Permission,
    /// Local disk ran out of space.
    DiskFull,
    /// No downloadable format matched.
    Format,
    /// Nothing above matched.
    Unknown,
    /// The circuit breaker rejected the call.
    CircuitOpen,
    /// Shutdown was requested while the job was waiting to retry.
    ShutdownRequested,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Permission => "permission",
            ErrorKind::DiskFull => "disk_full",
            ErrorKind::Format => "format",
            ErrorKind::Unknown => "unknown",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::ShutdownRequested => "shutdown_requested",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "network" => Some(ErrorKind::Network),
            "quota_exceeded" => Some(ErrorKind::QuotaExceeded),
            "unavailable" => Some(ErrorKind::Unavailable),
            "permission" => Some(ErrorKind::Permission),
            "disk_full" => Some(ErrorKind::DiskFull),
            "format" => Some(ErrorKind::Format),
            "unknown" => Some(ErrorKind::Unknown),
            "circuit_open" => Some(ErrorKind::CircuitOpen),
            "shutdown_requested" => Some(ErrorKind::ShutdownRequested),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword groups, checked in order. The first group with a matching phrase wins,
/// so upstream 5xx phrases are claimed by Network before anything more generic.
const KEYWORD_GROUPS: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::Network,
        &[
            "http error 5",
            "500 internal server error",
            "502 bad gateway",
            "503 service unavailable",
            "504 gateway timeout",
            "connection refused",
            "connection reset",
            "connection aborted",
            "unable to connect",
            "temporary failure in name resolution",
            "name or service not known",
            "network is unreachable",
            "unreachable",
            "timed out",
            "timeout",
            "network",
            "connection",
        ],
    ),
    (
        ErrorKind::QuotaExceeded,
        &["quota exceeded", "quota", "rate limit", "rate-limit", "too many requests", "429"],
    ),
    (
        ErrorKind::Unavailable,
        &[
            "video unavailable",
            "private video",
            "this video is private",
            "has been removed",
            "deleted",
            "not available",
            "blocked in your country",
            "age-restricted",
            "unavailable",
            "404",
            "not found",
        ],
    ),
    (
        ErrorKind::Permission,
        &["permission denied", "access denied", "forbidden", "403", "sign in to confirm"],
    ),
    (
        ErrorKind::DiskFull,
        &["no space left", "disk full", "insufficient space", "not enough space"],
    ),
    (
        ErrorKind::Format,
        &[
            "no video formats found",
            "no formats",
            "unsupported format",
        ],
    ),
];

/// Classify a fetcher error message. Case-insensitive; pure.
pub fn classify(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    KEYWORD_GROUPS
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| lower.contains(p)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_phrases() {
        for msg in [
            "ERROR: [Errno 111] Connection refused",
            "Read timed out",
            "socket timeout after 30s",
            "HTTP Error 503: Service Unavailable",
            "HTTP Error 502: Bad Gateway",
            "Temporary failure in name resolution",
        ] {
            assert_eq!(classify(msg), ErrorKind::Network, "{msg}");
        }
    }

    #[test]
    fn quota_phrases() {
        assert_eq!(classify("HTTP Error 429"), ErrorKind::QuotaExceeded);
        assert_eq!(classify("Too Many Requests"), ErrorKind::QuotaExceeded);
        assert_eq!(classify("daily quota exceeded"), ErrorKind::QuotaExceeded);
    }

    #[test]
    fn unavailable_phrases() {
        assert_eq!(classify("ERROR: Video unavailable"), ErrorKind::Unavailable);
        assert_eq!(classify("Private video. Sign in"), ErrorKind::Unavailable);
        assert_eq!(classify("HTTP Error 404"), ErrorKind::Unavailable);
    }

    #[test]
    fn permission_phrases() {
        assert_eq!(classify("HTTP Error 403: Forbidden"), ErrorKind::Permission);
        assert_eq!(classify("access denied by origin"), ErrorKind::Permission);
    }

    #[test]
    fn disk_and_format_phrases() {
        assert_eq!(
            classify("OSError: [Errno 28] No space left on device"),
            ErrorKind::DiskFull
        );
        assert_eq!(
            classify("ERROR: No video formats found"),
            ErrorKind::Format
        );
        assert_eq!(classify("unsupported format: flv"), ErrorKind::Format);
    }

    #[test]
    fn unmatched_is_unknown() {
        assert_eq!(classify("something odd happened"), ErrorKind::Unknown);
        assert_eq!(classify(""), ErrorKind::Unknown);
    }

    #[test]
    fn kind_str_roundtrip() {
        for kind in [
            ErrorKind::Network,
            ErrorKind::QuotaExceeded,
            ErrorKind::Unavailable,
            ErrorKind::Permission,
            ErrorKind::DiskFull,
            ErrorKind::Format,
            ErrorKind::Unknown,
            ErrorKind::CircuitOpen,
            ErrorKind::ShutdownRequested,
        ] {
            assert_eq!(ErrorKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ErrorKind::from_str("bogus"), None);
    }
}
