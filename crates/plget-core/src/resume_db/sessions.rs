//! Session rows: one per orchestration run.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::db::{unix_timestamp, ResumeDb};
use super::error::{Result, StoreError};
use super::types::{Session, SessionStatus};
use crate::identity;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

fn session_from_row(row: &SqliteRow) -> Result<Session> {
    let status: String = row.try_get("status")?;
    let snapshot: Option<String> = row.try_get("config_snapshot")?;
    let config_snapshot = match snapshot.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => serde_json::from_str(s)?,
        None => serde_json::Value::Null,
    };
    let total: i64 = row.try_get("total_jobs")?;
    let completed: i64 = row.try_get("completed_jobs")?;
    let failed: i64 = row.try_get("failed_jobs")?;
    Ok(Session {
        id: row.try_get("id")?,
        playlist_url: row.try_get("playlist_url")?,
        status: SessionStatus::from_str(&status),
        total_jobs: total.max(0) as u32,
        completed_jobs: completed.max(0) as u32,
        failed_jobs: failed.max(0) as u32,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        config_snapshot,
    })
}

impl ResumeDb {
    /// Start an Active session and return its generated id.
    pub async fn create_session(
        &self,
        playlist_url: &str,
        total_jobs: u32,
        config_snapshot: &serde_json::Value,
    ) -> Result<String> {
        let id = identity::session_id();
        self.create_session_with_id(&id, playlist_url, total_jobs, config_snapshot)
            .await?;
        Ok(id)
    }

    pub async fn create_session_with_id(
        &self,
        id: &str,
        playlist_url: &str,
        total_jobs: u32,
        config_snapshot: &serde_json::Value,
    ) -> Result<()> {
        let snapshot = serde_json::to_string(config_snapshot)?;
        sqlx::query(
            r#"
            INSERT INTO sessions (id, playlist_url, status, total_jobs, started_at, config_snapshot)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(id)
        .bind(playlist_url)
        .bind(SessionStatus::Active.as_str())
        .bind(i64::from(total_jobs))
        .bind(unix_timestamp())
        .bind(snapshot)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Set the completed/failed counters; `None` leaves a counter unchanged.
    pub async fn update_session_stats(
        &self,
        id: &str,
        completed: Option<u32>,
        failed: Option<u32>,
    ) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE sessions SET
                completed_jobs = COALESCE(?1, completed_jobs),
                failed_jobs = COALESCE(?2, failed_jobs)
            WHERE id = ?3
            "#,
        )
        .bind(completed.map(i64::from))
        .bind(failed.map(i64::from))
        .bind(id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::SessionNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Move a session to its final status and stamp `completed_at`.
    pub async fn complete_session(&self, id: &str, status: SessionStatus) -> Result<()> {
        let res = sqlx::query(
            "UPDATE sessions SET status = ?1, completed_at = ?2 WHERE id = ?3",
        )
        .bind(status.as_str())
        .bind(unix_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::SessionNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Mark every still-active session of a playlist Cancelled. Used when a run
    /// is abandoned without finalizing its own session. Returns the number changed.
    pub async fn cancel_active_sessions(&self, playlist_url: &str) -> Result<u64> {
        let res = sqlx::query(
            "UPDATE sessions SET status = ?1, completed_at = ?2 \
             WHERE playlist_url = ?3 AND status = ?4",
        )
        .bind(SessionStatus::Cancelled.as_str())
        .bind(unix_timestamp())
        .bind(playlist_url)
        .bind(SessionStatus::Active.as_str())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            r#"
            SELECT id, playlist_url, status, total_jobs, completed_jobs, failed_jobs,
                   started_at, completed_at, config_snapshot
            FROM sessions WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    /// Sessions of one playlist, newest first.
    pub async fn list_sessions(&self, playlist_url: &str) -> Result<Vec<Session>> {
        let rows = sqlx::query(
            r#"
            SELECT id, playlist_url, status, total_jobs, completed_jobs, failed_jobs,
                   started_at, completed_at, config_snapshot
            FROM sessions WHERE playlist_url = ?1
            ORDER BY started_at DESC, rowid DESC
            "#,
        )
        .bind(playlist_url)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(session_from_row).collect()
    }

    /// Delete terminal sessions that finished more than `retention_days` ago.
    /// Active sessions are never removed. Returns the number deleted.
    pub async fn cleanup_old_sessions(&self, retention_days: u32) -> Result<u64> {
        let cutoff = unix_timestamp() - i64::from(retention_days) * SECS_PER_DAY;
        let removed = self.cleanup_sessions_finished_before(cutoff).await?;
        if removed > 0 {
            tracing::info!(removed, retention_days, "cleaned up old sessions");
        }
        Ok(removed)
    }

    pub(crate) async fn cleanup_sessions_finished_before(&self, cutoff: i64) -> Result<u64> {
        let res = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE status IN ('completed', 'failed', 'cancelled')
              AND COALESCE(completed_at, started_at) < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }
}
