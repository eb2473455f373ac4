//! `plget stats` – totals across the whole store.

use anyhow::Result;
use plget_core::resume_db::ResumeDb;

pub async fn run_stats(db: &ResumeDb, json: bool) -> Result<()> {
    let stats = db.download_statistics().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!(
        "{} item(s) in {} playlist(s), {:.1} MiB recorded",
        stats.total_jobs,
        stats.total_playlists,
        stats.total_bytes as f64 / 1_048_576.0
    );
    for (status, b) in &stats.by_status {
        println!(
            "  {:<12} {:>6}  {:>10.1} MiB",
            status,
            b.count,
            b.total_bytes as f64 / 1_048_576.0
        );
    }
    if let Some(avg) = stats.avg_download_secs {
        println!("Average item time: {avg:.1}s");
    }
    Ok(())
}
