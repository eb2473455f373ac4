//! Stable job identities and session tokens.

use sha2::{Digest, Sha256};

/// Hex characters kept from the digest.
const JOB_ID_LEN: usize = 16;

/// Deterministic job id for a (playlist, item) pair: the first 16 hex characters of
/// SHA-256 over `"{playlist_url}:{item_id}"`. Re-deriving the same pair always
/// yields the same id, so re-submitting a playlist never creates a second job.
pub fn job_id(playlist_url: &str, item_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(playlist_url.as_bytes());
    hasher.update(b":");
    hasher.update(item_id.as_bytes());
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(JOB_ID_LEN);
    hex
}

/// Fresh opaque session token (UUID v4).
pub fn session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
