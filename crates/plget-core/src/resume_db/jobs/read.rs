//! Job read operations: lookups, resume queries and statistics.

use sqlx::Row;
use std::collections::BTreeMap;

use super::super::db::{unix_timestamp, ResumeDb};
use super::super::error::Result;
use super::super::types::{DownloadStatistics, Job, JobStatus, ResumeInfo, StatusBreakdown};
use super::{job_from_row, JOB_COLUMNS};

impl ResumeDb {
    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    /// Jobs of one playlist in playlist order, optionally filtered by status.
    pub async fn get_jobs_by_playlist(
        &self,
        playlist_url: &str,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE playlist_url = ?1
              AND (?2 IS NULL OR status = ?2)
            ORDER BY playlist_index, created_at, rowid
            "#
        ))
        .bind(playlist_url)
        .bind(status.map(JobStatus::as_str))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Jobs that still need work (Pending, Downloading or Failed), oldest first.
    /// Scoped to one playlist when `playlist_url` is given. This is the basis of resume.
    pub async fn get_incomplete_jobs(&self, playlist_url: Option<&str>) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE status IN ('pending', 'downloading', 'failed')
              AND (?1 IS NULL OR playlist_url = ?1)
            ORDER BY created_at, rowid
            "#
        ))
        .bind(playlist_url)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    pub async fn is_job_completed(&self, playlist_url: &str, item_id: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM jobs
            WHERE playlist_url = ?1 AND item_id = ?2 AND status = 'completed'
            LIMIT 1
            "#,
        )
        .bind(playlist_url)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Summary of what a resume of `playlist_url` would pick up.
    pub async fn resume_info(&self, playlist_url: &str) -> Result<ResumeInfo> {
        let incomplete = self.get_incomplete_jobs(Some(playlist_url)).await?;
        let counts = sqlx::query(
            r#"
            SELECT
                SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END) AS completed,
                SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END) AS failed,
                COUNT(*) AS total
            FROM jobs WHERE playlist_url = ?1
            "#,
        )
        .bind(playlist_url)
        .fetch_one(&self.pool)
        .await?;
        let completed: Option<i64> = counts.try_get("completed")?;
        let failed: Option<i64> = counts.try_get("failed")?;
        let total: i64 = counts.try_get("total")?;

        Ok(ResumeInfo {
            playlist_url: playlist_url.to_string(),
            incomplete_count: incomplete.len(),
            completed_count: completed.unwrap_or(0) as usize,
            failed_count: failed.unwrap_or(0) as usize,
            total_count: total as usize,
            can_resume: !incomplete.is_empty(),
            incomplete,
        })
    }

    /// Store-wide counts and byte totals per status.
    pub async fn download_statistics(&self) -> Result<DownloadStatistics> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS n, COALESCE(SUM(total_bytes), 0) AS bytes
            FROM jobs
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let mut by_status = BTreeMap::new();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            let bytes: i64 = row.try_get("bytes")?;
            by_status.insert(
                status,
                StatusBreakdown {
                    count: n.max(0) as u64,
                    total_bytes: bytes.max(0) as u64,
                },
            );
        }

        let totals = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_jobs,
                COUNT(DISTINCT playlist_url) AS total_playlists,
                COALESCE(SUM(total_bytes), 0) AS total_bytes,
                AVG(CASE WHEN completed_at IS NOT NULL AND started_at IS NOT NULL
                    THEN completed_at - started_at END) AS avg_secs
            FROM jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        let total_jobs: i64 = totals.try_get("total_jobs")?;
        let total_playlists: i64 = totals.try_get("total_playlists")?;
        let total_bytes: i64 = totals.try_get("total_bytes")?;
        let avg_download_secs: Option<f64> = totals.try_get("avg_secs")?;

        Ok(DownloadStatistics {
            by_status,
            total_jobs: total_jobs.max(0) as u64,
            total_playlists: total_playlists.max(0) as u64,
            total_bytes: total_bytes.max(0) as u64,
            avg_download_secs,
            generated_at: unix_timestamp(),
        })
    }
}
