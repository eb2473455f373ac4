//! Persistent job store (SQLite via sqlx).
//!
//! Holds playlists, jobs and sessions so an interrupted run can be resumed.
//! Job rows are keyed by `(playlist_url, item_id)`; re-submitting a playlist
//! updates rows in place instead of duplicating them.

pub mod db;
pub mod error;
mod jobs;
mod playlists;
mod sessions;
pub mod types;

pub use db::*;
pub use error::{Result, StoreError};
pub use types::*;
