//! Run a session's jobs on a bounded worker pool.
//!
//! Keeps up to `max_concurrent` jobs running at once; when one finishes, the
//! next queued job is started until the queue is empty or shutdown is requested.
//! Outcomes are collected in completion order and the session counters in the
//! store are updated after each one.

use std::collections::{HashMap, VecDeque};

use tokio::task::{Id, JoinError};

use crate::progress::TrackStatus;
use crate::resume_db::{Job, JobStatus};
use crate::retry::{ErrorKind, FetchError};

use super::report::{JobOutcome, OutcomeStatus, SessionTally};
use super::worker::{execute_job, WorkerContext};

pub(super) async fn run_jobs_parallel(
    ctx: &WorkerContext,
    session_id: &str,
    jobs: Vec<Job>,
    max_concurrent: usize,
    mut tally: SessionTally,
) -> SessionTally {
    let max_concurrent = max_concurrent.max(1);
    let mut queue: VecDeque<Job> = jobs.into();
    let mut join_set = tokio::task::JoinSet::new();
    let mut running: HashMap<Id, Job> = HashMap::new();

    loop {
        while join_set.len() < max_concurrent && !ctx.shutdown.is_shutdown_requested() {
            let Some(job) = queue.pop_front() else {
                break;
            };
            let handle = join_set.spawn(execute_job(ctx.clone(), job.clone()));
            running.insert(handle.id(), job);
        }

        let Some(res) = join_set.join_next_with_id().await else {
            break;
        };
        match res {
            Ok((id, outcome)) => {
                running.remove(&id);
                tally.record(outcome);
            }
            Err(e) => match running.remove(&e.id()) {
                Some(job) => tally.record(lost_job(ctx, &job, &e).await),
                None => {
                    tracing::error!(session_id, error = %e, "unknown worker task failed");
                    tally.failed += 1;
                }
            },
        }
        if let Err(e) = ctx
            .db
            .update_session_stats(session_id, Some(tally.completed), Some(tally.failed))
            .await
        {
            tracing::error!(session_id, error = %e, "failed to update session counters");
        }
    }

    if !queue.is_empty() {
        tracing::info!(
            session_id,
            remaining = queue.len(),
            "shutdown requested; leaving remaining jobs pending"
        );
    }
    for job in queue {
        tally.record(JobOutcome::new(&job, OutcomeStatus::Abandoned, None));
    }
    tally
}

/// Outcome for a job whose worker task panicked or was cancelled before it
/// could report. The job is stored as Failed so resume retries it.
pub(super) async fn lost_job(ctx: &WorkerContext, job: &Job, err: &JoinError) -> JobOutcome {
    let cause = if err.is_panic() { "panicked" } else { "was cancelled" };
    let fetch_err = FetchError::new(ErrorKind::Unknown, format!("worker task {cause}"))
        .with_source(job.source_url.clone());
    tracing::error!(job_id = %job.id, error = %err, "worker task failed");
    if let Err(e) = ctx
        .db
        .update_job_status(&job.id, JobStatus::Failed, None, Some(&fetch_err))
        .await
    {
        tracing::error!(job_id = %job.id, error = %e, "store write failed: mark failed");
    }
    ctx.progress
        .finish_with_status(&job.id, TrackStatus::Failed, Some(&fetch_err.to_string()));
    JobOutcome::new(job, OutcomeStatus::Failed, Some(fetch_err))
}
