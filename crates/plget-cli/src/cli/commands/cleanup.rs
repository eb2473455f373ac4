//! `plget cleanup [--days N]` – drop finished sessions past retention.

use anyhow::Result;
use plget_core::resume_db::ResumeDb;

pub async fn run_cleanup(db: &ResumeDb, days: u32) -> Result<()> {
    let removed = db.cleanup_old_sessions(days).await?;
    println!("Removed {removed} session(s) older than {days} day(s).");
    Ok(())
}
