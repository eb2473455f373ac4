//! One job, end to end: claim, guard, fetch with retry, record the outcome.

use std::sync::Arc;

use crate::breaker::CircuitBreaker;
use crate::config::PlgetConfig;
use crate::control::ShutdownCoordinator;
use crate::fetcher::{FetchProgress, FetchRequest, MediaFetcher};
use crate::progress::{ProgressTracker, ProgressUpdate, TrackStatus};
use crate::resume_db::{Job, JobStatus, ResumeDb};
use crate::retry::{run_with_retry, ErrorKind, FetchError, RetryPolicy};

use super::invoke;
use super::report::{JobOutcome, OutcomeStatus};

/// Shared handles every worker needs. Cheap to clone.
#[derive(Clone)]
pub(super) struct WorkerContext {
    pub db: ResumeDb,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub config: Arc<PlgetConfig>,
    pub policy: Arc<RetryPolicy>,
    pub breaker: Arc<CircuitBreaker>,
    pub progress: Arc<ProgressTracker>,
    pub shutdown: Arc<ShutdownCoordinator>,
}

/// Log a failed store write. The live run carries on; only durability suffers.
fn log_store<T>(res: crate::resume_db::Result<T>, job_id: &str, what: &str) -> Option<T> {
    match res {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::error!(job_id, error = %e, "store write failed: {}", what);
            None
        }
    }
}

pub(super) async fn execute_job(ctx: WorkerContext, job: Job) -> JobOutcome {
    if ctx.shutdown.is_shutdown_requested() {
        return JobOutcome::new(&job, OutcomeStatus::Abandoned, None);
    }
    let _active = ctx.shutdown.register(&job.id);
    ctx.progress.start_tracking(&job.id, &job.source_url);
    let destination = ctx.config.output_dir.join(&job.target_name);

    if ctx.config.skip_existing && tokio::fs::try_exists(&destination).await.unwrap_or(false) {
        tracing::info!(job_id = %job.id, path = %destination.display(), "target exists; skipping");
        let size = tokio::fs::metadata(&destination).await.ok().map(|m| m.len());
        log_store(
            ctx.db
                .update_job_status(&job.id, JobStatus::Skipped, size, None)
                .await,
            &job.id,
            "mark skipped",
        );
        ctx.progress
            .finish_with_status(&job.id, TrackStatus::Skipped, None);
        return JobOutcome::new(&job, OutcomeStatus::Skipped, None);
    }

    if !ctx.breaker.can_execute() {
        let err = FetchError::circuit_open().with_source(job.source_url.clone());
        tracing::warn!(job_id = %job.id, "circuit open; failing fast");
        return fail(&ctx, &job, err).await;
    }

    log_store(
        ctx.db
            .update_job_status(&job.id, JobStatus::Downloading, None, None)
            .await,
        &job.id,
        "mark downloading",
    );
    ctx.progress.update_progress(
        &job.id,
        ProgressUpdate {
            status: Some(TrackStatus::Downloading),
            ..Default::default()
        },
    );

    let request = FetchRequest {
        job_id: job.id.clone(),
        source_url: job.source_url.clone(),
        destination: destination.clone(),
        quality: job.quality.clone(),
        format: job.format.clone(),
    };
    let result = run_with_retry(&ctx.policy, &ctx.shutdown, |attempt| {
        invoke::fetch_attempt(&ctx.fetcher, &ctx.progress, &ctx.policy, &request, attempt)
    })
    .await;

    match result {
        Ok(last) => {
            ctx.breaker.record_success();
            let bytes = completed_bytes(&destination, last).await;
            log_store(
                ctx.db.update_job_progress(&job.id, bytes, Some(bytes)).await,
                &job.id,
                "record bytes",
            );
            log_store(
                ctx.db
                    .update_job_status(&job.id, JobStatus::Completed, Some(bytes), None)
                    .await,
                &job.id,
                "mark completed",
            );
            ctx.progress.update_progress(
                &job.id,
                ProgressUpdate {
                    downloaded_bytes: Some(bytes),
                    total_bytes: Some(bytes),
                    ..Default::default()
                },
            );
            ctx.progress.finish_tracking(&job.id, true, None);
            tracing::info!(job_id = %job.id, title = %job.title, bytes, "job completed");
            JobOutcome::new(&job, OutcomeStatus::Completed, None)
        }
        Err(err) if err.kind == ErrorKind::ShutdownRequested => {
            // Left as Downloading in the store; resume resets it.
            ctx.progress
                .finish_with_status(&job.id, TrackStatus::Cancelled, Some(&err.message));
            tracing::info!(job_id = %job.id, "job abandoned for shutdown");
            JobOutcome::new(&job, OutcomeStatus::Abandoned, Some(err))
        }
        Err(err) => {
            ctx.breaker.record_failure();
            fail(&ctx, &job, err).await
        }
    }
}

async fn fail(ctx: &WorkerContext, job: &Job, err: FetchError) -> JobOutcome {
    log_store(
        ctx.db
            .update_job_status(&job.id, JobStatus::Failed, None, Some(&err))
            .await,
        &job.id,
        "mark failed",
    );
    ctx.progress
        .finish_tracking(&job.id, false, Some(&err.to_string()));
    tracing::warn!(job_id = %job.id, kind = %err.kind, error = %err.message, "job failed");
    JobOutcome::new(job, OutcomeStatus::Failed, Some(err))
}

/// Size on disk if the file is there, otherwise the last reported counters.
async fn completed_bytes(destination: &std::path::Path, last: FetchProgress) -> u64 {
    match tokio::fs::metadata(destination).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => last
            .total_bytes
            .unwrap_or(0)
            .max(last.downloaded_bytes),
    }
}
