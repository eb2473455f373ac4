//! `plget retry <url> [--item ID]...` – put failed items back in the queue.

use anyhow::Result;
use plget_core::resume_db::ResumeDb;

pub async fn run_retry(db: &ResumeDb, url: &str, items: &[String]) -> Result<()> {
    let only = (!items.is_empty()).then_some(items);
    let count = db.mark_for_retry(url, only).await?;
    if count == 0 {
        println!("No failed items to retry.");
    } else {
        println!("Marked {count} item(s) for retry; run `plget resume {url}`.");
    }
    Ok(())
}
