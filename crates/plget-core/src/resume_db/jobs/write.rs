//! Job write operations: upsert, status transitions, resume resets.

use super::super::db::{unix_timestamp, ResumeDb};
use super::super::error::Result;
use super::super::types::{Job, JobStatus};
use crate::retry::FetchError;

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl ResumeDb {
    /// Insert a job, or update the existing row for the same `(playlist_url, item_id)`.
    /// The original `created_at` is kept so resume order stays stable.
    pub async fn upsert_job(&self, job: &Job) -> Result<()> {
        let now = unix_timestamp();
        let metadata_json = if job.metadata.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&job.metadata)?)
        };
        let (error_kind, error_message) = match &job.last_error {
            Some(e) => (Some(e.kind.as_str()), Some(e.message.as_str())),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, playlist_url, item_id, playlist_index, source_url, title,
                target_name, quality, format, status, total_bytes, downloaded_bytes,
                error_kind, error_message, created_at, started_at, completed_at,
                updated_at, metadata_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                      ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            ON CONFLICT(playlist_url, item_id) DO UPDATE SET
                playlist_index = excluded.playlist_index,
                source_url = excluded.source_url,
                title = excluded.title,
                target_name = excluded.target_name,
                quality = excluded.quality,
                format = excluded.format,
                status = excluded.status,
                total_bytes = excluded.total_bytes,
                downloaded_bytes = excluded.downloaded_bytes,
                error_kind = excluded.error_kind,
                error_message = excluded.error_message,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                updated_at = excluded.updated_at,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&job.id)
        .bind(&job.playlist_url)
        .bind(&job.item_id)
        .bind(i64::from(job.playlist_index))
        .bind(&job.source_url)
        .bind(&job.title)
        .bind(&job.target_name)
        .bind(&job.quality)
        .bind(&job.format)
        .bind(job.status.as_str())
        .bind(job.total_bytes.map(to_i64))
        .bind(to_i64(job.downloaded_bytes))
        .bind(error_kind)
        .bind(error_message)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(now)
        .bind(metadata_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Partial status update. Returns whether a row was affected.
    ///
    /// - `Downloading` stamps `started_at`
    /// - `Completed` stamps `completed_at` and clears the last error
    /// - `Failed` stores `error` (kind and message)
    /// - `Pending` clears the last error and `started_at`
    pub async fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
        downloaded_bytes: Option<u64>,
        error: Option<&FetchError>,
    ) -> Result<bool> {
        let now = unix_timestamp();
        let res = sqlx::query(
            r#"
            UPDATE jobs SET
                status = ?1,
                downloaded_bytes = COALESCE(?2, downloaded_bytes),
                total_bytes = CASE
                    WHEN ?1 = 'completed' AND total_bytes IS NULL THEN ?2
                    ELSE total_bytes END,
                started_at = CASE
                    WHEN ?1 = 'downloading' THEN ?3
                    WHEN ?1 = 'pending' THEN NULL
                    ELSE started_at END,
                completed_at = CASE WHEN ?1 = 'completed' THEN ?3 ELSE completed_at END,
                error_kind = CASE
                    WHEN ?1 = 'failed' THEN COALESCE(?4, error_kind)
                    WHEN ?1 IN ('completed', 'pending') THEN NULL
                    ELSE error_kind END,
                error_message = CASE
                    WHEN ?1 = 'failed' THEN COALESCE(?5, error_message)
                    WHEN ?1 IN ('completed', 'pending') THEN NULL
                    ELSE error_message END,
                updated_at = ?3
            WHERE id = ?6
            "#,
        )
        .bind(status.as_str())
        .bind(downloaded_bytes.map(to_i64))
        .bind(now)
        .bind(error.map(|e| e.kind.as_str()))
        .bind(error.map(|e| e.message.as_str()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Record byte counters without changing status.
    pub async fn update_job_progress(
        &self,
        id: &str,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE jobs SET
                downloaded_bytes = ?1,
                total_bytes = COALESCE(?2, total_bytes),
                updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(to_i64(downloaded_bytes))
        .bind(total_bytes.map(to_i64))
        .bind(unix_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Reset jobs left in Downloading (no attempt survives a restart) back to Pending.
    /// Scoped to one playlist when `playlist_url` is given. Returns the number reset.
    pub async fn reset_stuck_jobs(&self, playlist_url: Option<&str>) -> Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                started_at = NULL,
                updated_at = ?1
            WHERE status = 'downloading'
              AND (?2 IS NULL OR playlist_url = ?2)
            "#,
        )
        .bind(unix_timestamp())
        .bind(playlist_url)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    /// Put Failed jobs of a playlist back to Pending, clearing their error.
    /// With `item_ids`, only those items are reset. Returns the number reset.
    pub async fn mark_for_retry(
        &self,
        playlist_url: &str,
        item_ids: Option<&[String]>,
    ) -> Result<u64> {
        let now = unix_timestamp();
        const SQL: &str = r#"
            UPDATE jobs
            SET status = 'pending',
                error_kind = NULL,
                error_message = NULL,
                started_at = NULL,
                updated_at = ?1
            WHERE playlist_url = ?2
              AND status = 'failed'
              AND (?3 IS NULL OR item_id = ?3)
        "#;

        let count = match item_ids {
            None => {
                sqlx::query(SQL)
                    .bind(now)
                    .bind(playlist_url)
                    .bind(None::<&str>)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
            }
            Some(ids) => {
                let mut tx = self.pool.begin().await?;
                let mut n = 0;
                for item_id in ids {
                    n += sqlx::query(SQL)
                        .bind(now)
                        .bind(playlist_url)
                        .bind(Some(item_id.as_str()))
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                }
                tx.commit().await?;
                n
            }
        };
        if count > 0 {
            tracing::info!(playlist_url, count, "marked failed jobs for retry");
        }
        Ok(count)
    }
}
