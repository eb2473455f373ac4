//! Boundary to the external media fetcher.
//!
//! The orchestrator owns retries, circuit breaking and persistence; a
//! [`MediaFetcher`] only extracts playlist entries and transfers bytes. Both calls
//! are blocking and report failures as free text, which the retry layer classifies.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One entry of an extracted playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    /// Stable item identifier within the playlist (e.g. a video id).
    pub item_id: String,
    pub source_url: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub title: String,
    pub description: Option<String>,
    pub entries: Vec<PlaylistEntry>,
}

/// Everything the fetcher needs to download one item.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Echoed back through the progress callback.
    pub job_id: String,
    pub source_url: String,
    pub destination: PathBuf,
    /// Maximum video height, e.g. "1080".
    pub quality: String,
    pub format: String,
}

/// Progress report from an in-flight fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FetchProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Bytes per second, if the fetcher knows it.
    pub speed: Option<f64>,
    pub eta_secs: Option<u64>,
}

/// External collaborator performing metadata extraction and byte transfer.
///
/// Implementations block; the orchestrator calls them from `spawn_blocking`.
pub trait MediaFetcher: Send + Sync {
    /// List the entries of a playlist.
    fn extract_playlist(&self, url: &str) -> anyhow::Result<PlaylistInfo>;

    /// Download one item to `request.destination`. `on_progress` receives the
    /// request's `job_id` with every report.
    fn fetch(
        &self,
        request: &FetchRequest,
        on_progress: &mut dyn FnMut(&str, FetchProgress),
    ) -> anyhow::Result<()>;
}
