//! Types used by the job store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fetcher::PlaylistEntry;
use crate::identity;
use crate::retry::FetchError;

/// Job identifier: see [`identity::job_id`].
pub type JobId = String;

/// Free-form key/value map stored as JSON alongside jobs and playlists.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Job status stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }

    /// Unrecognised values read back as Pending so the job is fetched again.
    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => JobStatus::Pending,
            "downloading" => JobStatus::Downloading,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "skipped" => JobStatus::Skipped,
            _ => JobStatus::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Skipped
        )
    }
}

/// Session status stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "active" => SessionStatus::Active,
            "completed" => SessionStatus::Completed,
            "failed" => SessionStatus::Failed,
            "cancelled" => SessionStatus::Cancelled,
            _ => SessionStatus::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

/// One fetch unit: a single playlist item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub playlist_url: String,
    pub item_id: String,
    /// 1-based position in the playlist.
    pub playlist_index: u32,
    pub source_url: String,
    pub title: String,
    /// File name (no directory) the item is written to.
    pub target_name: String,
    pub quality: String,
    pub format: String,
    pub status: JobStatus,
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: u64,
    pub last_error: Option<FetchError>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Job {
    /// New Pending job for a playlist entry. The id is derived from
    /// `(playlist_url, entry.item_id)`.
    pub fn new(
        playlist_url: &str,
        playlist_index: u32,
        entry: &PlaylistEntry,
        target_name: String,
        quality: &str,
        format: &str,
    ) -> Self {
        Self {
            id: identity::job_id(playlist_url, &entry.item_id),
            playlist_url: playlist_url.to_string(),
            item_id: entry.item_id.clone(),
            playlist_index,
            source_url: entry.source_url.clone(),
            title: entry.title.clone(),
            target_name,
            quality: quality.to_string(),
            format: format.to_string(),
            status: JobStatus::Pending,
            total_bytes: None,
            downloaded_bytes: 0,
            last_error: None,
            created_at: super::db::unix_timestamp(),
            started_at: None,
            completed_at: None,
            metadata: Metadata::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub item_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One orchestration run over a playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub playlist_url: String,
    pub status: SessionStatus,
    pub total_jobs: u32,
    pub completed_jobs: u32,
    pub failed_jobs: u32,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    /// Configuration in effect when the session started.
    pub config_snapshot: serde_json::Value,
}

/// What a resume of one playlist would pick up.
#[derive(Debug, Clone, Serialize)]
pub struct ResumeInfo {
    pub playlist_url: String,
    pub incomplete_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub total_count: usize,
    pub can_resume: bool,
    pub incomplete: Vec<Job>,
}

/// Per-status slice of the store-wide statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusBreakdown {
    pub count: u64,
    pub total_bytes: u64,
}

/// Store-wide download statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadStatistics {
    pub by_status: BTreeMap<String, StatusBreakdown>,
    pub total_jobs: u64,
    pub total_playlists: u64,
    pub total_bytes: u64,
    /// Mean `completed_at - started_at` over finished jobs, in seconds.
    pub avg_download_secs: Option<f64>,
    pub generated_at: i64,
}
