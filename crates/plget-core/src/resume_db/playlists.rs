//! Playlist rows: created on first visit, updated on later ones.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::db::{unix_timestamp, ResumeDb};
use super::error::Result;
use super::types::{Metadata, Playlist};

fn playlist_from_row(row: &SqliteRow) -> Result<Playlist> {
    let metadata_json: Option<String> = row.try_get("metadata_json")?;
    let metadata: Metadata = match metadata_json.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => serde_json::from_str(s)?,
        None => Metadata::new(),
    };
    let item_count: i64 = row.try_get("item_count")?;
    Ok(Playlist {
        url: row.try_get("url")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        item_count: item_count.max(0) as u32,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        metadata,
    })
}

impl ResumeDb {
    /// Insert or update a playlist keyed by URL. `created_at` survives updates.
    pub async fn upsert_playlist(
        &self,
        url: &str,
        title: &str,
        description: Option<&str>,
        item_count: u32,
    ) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            INSERT INTO playlists (url, title, description, item_count, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                item_count = excluded.item_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(url)
        .bind(title)
        .bind(description)
        .bind(i64::from(item_count))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace the metadata map of a playlist. Returns whether it exists.
    pub async fn set_playlist_metadata(&self, url: &str, metadata: &Metadata) -> Result<bool> {
        let json = serde_json::to_string(metadata)?;
        let res = sqlx::query(
            "UPDATE playlists SET metadata_json = ?1, updated_at = ?2 WHERE url = ?3",
        )
        .bind(json)
        .bind(unix_timestamp())
        .bind(url)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn get_playlist(&self, url: &str) -> Result<Option<Playlist>> {
        let row = sqlx::query(
            r#"
            SELECT url, title, description, item_count, created_at, updated_at, metadata_json
            FROM playlists WHERE url = ?1
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(playlist_from_row).transpose()
    }

    /// All known playlists, most recently updated first.
    pub async fn list_playlists(&self) -> Result<Vec<Playlist>> {
        let rows = sqlx::query(
            r#"
            SELECT url, title, description, item_count, created_at, updated_at, metadata_json
            FROM playlists
            ORDER BY updated_at DESC, url
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(playlist_from_row).collect()
    }
}
