//! Job CRUD, split into reads and writes.

mod read;
mod write;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::error::Result;
use super::types::{Job, JobStatus};
use crate::retry::{ErrorKind, FetchError};

pub(super) const JOB_COLUMNS: &str = "id, playlist_url, item_id, playlist_index, source_url, \
     title, target_name, quality, format, status, total_bytes, downloaded_bytes, error_kind, \
     error_message, created_at, started_at, completed_at, metadata_json";

pub(super) fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let status: String = row.try_get("status")?;
    let error_kind: Option<String> = row.try_get("error_kind")?;
    let error_message: Option<String> = row.try_get("error_message")?;
    let source_url: String = row.try_get("source_url")?;
    let last_error = match (error_kind, error_message) {
        (None, None) => None,
        (kind, message) => Some(FetchError {
            kind: kind
                .as_deref()
                .and_then(ErrorKind::from_str)
                .unwrap_or(ErrorKind::Unknown),
            message: message.unwrap_or_default(),
            source_url: Some(source_url.clone()),
        }),
    };
    let metadata_json: Option<String> = row.try_get("metadata_json")?;
    let metadata = match metadata_json.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => serde_json::from_str(s)?,
        None => Default::default(),
    };
    let total_bytes: Option<i64> = row.try_get("total_bytes")?;
    let downloaded_bytes: i64 = row.try_get("downloaded_bytes")?;
    let playlist_index: i64 = row.try_get("playlist_index")?;

    Ok(Job {
        id: row.try_get("id")?,
        playlist_url: row.try_get("playlist_url")?,
        item_id: row.try_get("item_id")?,
        playlist_index: playlist_index.max(0) as u32,
        source_url,
        title: row.try_get("title")?,
        target_name: row.try_get("target_name")?,
        quality: row.try_get("quality")?,
        format: row.try_get("format")?,
        status: JobStatus::from_str(&status),
        total_bytes: total_bytes.map(|b| b.max(0) as u64),
        downloaded_bytes: downloaded_bytes.max(0) as u64,
        last_error,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        metadata,
    })
}
