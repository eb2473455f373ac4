//! `plget status [url]` – list playlists, or the items of one playlist.

use anyhow::Result;
use plget_core::resume_db::ResumeDb;

pub async fn run_status(db: &ResumeDb, url: Option<&str>) -> Result<()> {
    match url {
        Some(url) => playlist_status(db, url).await,
        None => all_playlists(db).await,
    }
}

async fn all_playlists(db: &ResumeDb) -> Result<()> {
    let playlists = db.list_playlists().await?;
    if playlists.is_empty() {
        println!("No playlists in database.");
        return Ok(());
    }
    println!("{:<7} {:<7} {:<7} {}", "DONE", "FAILED", "TOTAL", "PLAYLIST");
    for p in playlists {
        let info = db.resume_info(&p.url).await?;
        println!(
            "{:<7} {:<7} {:<7} {} ({})",
            info.completed_count, info.failed_count, info.total_count, p.title, p.url
        );
    }
    Ok(())
}

async fn playlist_status(db: &ResumeDb, url: &str) -> Result<()> {
    let jobs = db.get_jobs_by_playlist(url, None).await?;
    if jobs.is_empty() {
        println!("No items recorded for {url}.");
        return Ok(());
    }
    println!("{:<5} {:<12} {:<15} {}", "#", "STATUS", "ERROR", "TITLE");
    for j in &jobs {
        let kind = j
            .last_error
            .as_ref()
            .map(|e| e.kind.as_str())
            .unwrap_or("-");
        println!(
            "{:<5} {:<12} {:<15} {}",
            j.playlist_index,
            j.status.as_str(),
            kind,
            j.title
        );
    }

    let info = db.resume_info(url).await?;
    println!(
        "{} of {} done, {} failed.",
        info.completed_count, info.total_count, info.failed_count
    );
    if info.can_resume {
        println!("{} item(s) left; run `plget resume {url}`.", info.incomplete_count);
    }
    if let Some(last) = db.list_sessions(url).await?.first() {
        println!(
            "Last session {} [{}]: {}/{} completed, {} failed.",
            last.id,
            last.status.as_str(),
            last.completed_jobs,
            last.total_jobs,
            last.failed_jobs
        );
    }
    Ok(())
}
