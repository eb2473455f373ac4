//! Run blocking fetcher calls on the blocking pool and tag the result for the retry loop.

use std::sync::Arc;

use crate::fetcher::{FetchProgress, FetchRequest, MediaFetcher, PlaylistInfo};
use crate::progress::ProgressTracker;
use crate::retry::{Attempt, ErrorKind, FetchError, RetryPolicy};

/// One playlist extraction attempt in `spawn_blocking`.
pub(super) async fn extract_attempt(
    fetcher: &Arc<dyn MediaFetcher>,
    policy: &RetryPolicy,
    url: &str,
) -> Attempt<PlaylistInfo> {
    let fetcher = Arc::clone(fetcher);
    let owned_url = url.to_string();
    match tokio::task::spawn_blocking(move || fetcher.extract_playlist(&owned_url)).await {
        Ok(Ok(info)) => Attempt::Ok(info),
        Ok(Err(e)) => policy.assess(&format!("{e:#}"), url),
        Err(join) => Attempt::Fatal(
            FetchError::new(ErrorKind::Unknown, format!("extraction task failed: {join}"))
                .with_source(url),
        ),
    }
}

/// One fetch attempt in `spawn_blocking`. Progress reports go straight to the tracker
/// under the job id the fetcher echoes back. Returns the last progress seen.
pub(super) async fn fetch_attempt(
    fetcher: &Arc<dyn MediaFetcher>,
    progress: &Arc<ProgressTracker>,
    policy: &RetryPolicy,
    request: &FetchRequest,
    attempt: u32,
) -> Attempt<FetchProgress> {
    tracing::debug!(job_id = %request.job_id, attempt, "fetch attempt");
    let fetcher = Arc::clone(fetcher);
    let progress = Arc::clone(progress);
    let req = request.clone();
    let res = tokio::task::spawn_blocking(move || {
        let mut last = FetchProgress::default();
        let res = fetcher.fetch(&req, &mut |job_id: &str, p: FetchProgress| {
            last = p;
            progress.update_progress(job_id, p.into());
        });
        res.map(|()| last)
    })
    .await;

    match res {
        Ok(Ok(last)) => Attempt::Ok(last),
        Ok(Err(e)) => policy.assess(&format!("{e:#}"), &request.source_url),
        Err(join) => Attempt::Fatal(
            FetchError::new(ErrorKind::Unknown, format!("fetch task failed: {join}"))
                .with_source(request.source_url.clone()),
        ),
    }
}
