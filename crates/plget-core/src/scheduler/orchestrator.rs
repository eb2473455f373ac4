//! Session lifecycle: extract a playlist, persist its jobs, fan them out, finalize.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;

use crate::breaker::CircuitBreaker;
use crate::config::{ConfigError, PlgetConfig};
use crate::control::ShutdownCoordinator;
use crate::fetcher::{MediaFetcher, PlaylistInfo};
use crate::identity;
use crate::naming::render_filename;
use crate::progress::ProgressTracker;
use crate::resume_db::{Job, JobStatus, ResumeDb, SessionStatus};
use crate::retry::{run_with_retry, RetryPolicy};

use super::invoke;
use super::parallel::run_jobs_parallel;
use super::report::{JobOutcome, OutcomeStatus, SessionReport, SessionTally};
use super::worker::WorkerContext;

/// Drives playlist downloads: one breaker, one tracker and one shutdown
/// coordinator shared by all workers it spawns.
pub struct Orchestrator {
    db: ResumeDb,
    fetcher: Arc<dyn MediaFetcher>,
    config: Arc<PlgetConfig>,
    policy: Arc<RetryPolicy>,
    breaker: Arc<CircuitBreaker>,
    progress: Arc<ProgressTracker>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl Orchestrator {
    /// Build an orchestrator. The configuration is validated here and frozen.
    pub fn new(
        db: ResumeDb,
        fetcher: Arc<dyn MediaFetcher>,
        config: PlgetConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            db,
            fetcher,
            policy: Arc::new(config.retry_policy()),
            breaker: Arc::new(config.circuit_breaker()),
            config: Arc::new(config),
            progress: Arc::new(ProgressTracker::new()),
            shutdown: ShutdownCoordinator::shared(),
        })
    }

    pub fn with_progress(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_shutdown(mut self, shutdown: Arc<ShutdownCoordinator>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn db(&self) -> &ResumeDb {
        &self.db
    }

    pub fn config(&self) -> &PlgetConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    pub(super) fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            db: self.db.clone(),
            fetcher: Arc::clone(&self.fetcher),
            config: Arc::clone(&self.config),
            policy: Arc::clone(&self.policy),
            breaker: Arc::clone(&self.breaker),
            progress: Arc::clone(&self.progress),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Fetch every entry of a playlist that is not already completed.
    pub async fn download_playlist(&self, playlist_url: &str) -> Result<SessionReport> {
        let info = self.extract(playlist_url).await?;
        tracing::info!(
            playlist_url,
            title = %info.title,
            entries = info.entries.len(),
            "playlist extracted"
        );
        if let Err(e) = self
            .db
            .upsert_playlist(
                playlist_url,
                &info.title,
                info.description.as_deref(),
                info.entries.len() as u32,
            )
            .await
        {
            tracing::error!(playlist_url, error = %e, "failed to record playlist");
        }

        let mut pending = Vec::new();
        let mut tally = SessionTally::default();
        for job in self.build_jobs(playlist_url, &info) {
            let done = match self.db.is_job_completed(playlist_url, &job.item_id).await {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "completion lookup failed");
                    false
                }
            };
            if done {
                tracing::debug!(job_id = %job.id, "already completed; not fetching again");
                tally.record(JobOutcome::new(&job, OutcomeStatus::AlreadyCompleted, None));
                continue;
            }
            if let Err(e) = self.db.upsert_job(&job).await {
                tracing::error!(job_id = %job.id, error = %e, "failed to persist job");
            }
            pending.push(job);
        }

        self.run_session(playlist_url, Some(info.title), pending, tally)
            .await
    }

    /// Reconcile a playlist's stored jobs for another run: jobs stuck in
    /// Downloading and Failed jobs go back to Pending. Returns the jobs that
    /// still need work, oldest first.
    pub async fn prepare_resume(&self, playlist_url: &str) -> Result<Vec<Job>> {
        let reset = self.db.reset_stuck_jobs(Some(playlist_url)).await?;
        let retried = self.db.mark_for_retry(playlist_url, None).await?;
        let jobs = self.db.get_incomplete_jobs(Some(playlist_url)).await?;
        tracing::info!(
            playlist_url,
            reset_stuck = reset,
            retried,
            incomplete = jobs.len(),
            "prepared resume"
        );
        Ok(jobs)
    }

    /// Continue an earlier run from the store. A playlist with nothing left to do
    /// (or never seen) is re-extracted so new entries are picked up.
    pub async fn resume_playlist(&self, playlist_url: &str) -> Result<SessionReport> {
        let jobs = self.prepare_resume(playlist_url).await?;
        if jobs.is_empty() {
            tracing::info!(playlist_url, "nothing to resume; checking playlist for new entries");
            return self.download_playlist(playlist_url).await;
        }

        let mut tally = SessionTally::default();
        for status in [JobStatus::Completed, JobStatus::Skipped] {
            for job in self.db.get_jobs_by_playlist(playlist_url, Some(status)).await? {
                tally.record(JobOutcome::new(&job, OutcomeStatus::AlreadyCompleted, None));
            }
        }
        let title = self
            .db
            .get_playlist(playlist_url)
            .await
            .ok()
            .flatten()
            .map(|p| p.title);
        self.run_session(playlist_url, title, jobs, tally).await
    }

    async fn extract(&self, playlist_url: &str) -> Result<PlaylistInfo> {
        if !self.breaker.can_execute() {
            anyhow::bail!("circuit breaker is open; not contacting the fetcher for {playlist_url}");
        }
        let res = run_with_retry(&self.policy, &self.shutdown, |_| {
            invoke::extract_attempt(&self.fetcher, &self.policy, playlist_url)
        })
        .await;
        match res {
            Ok(info) => {
                self.breaker.record_success();
                Ok(info)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e).with_context(|| format!("extract playlist {playlist_url}"))
            }
        }
    }

    fn build_jobs(&self, playlist_url: &str, info: &PlaylistInfo) -> Vec<Job> {
        let cfg = &self.config;
        let mut seen = HashSet::new();
        let mut jobs = Vec::with_capacity(info.entries.len());
        for (i, entry) in info.entries.iter().enumerate() {
            if !seen.insert(entry.item_id.as_str()) {
                tracing::warn!(item_id = %entry.item_id, "duplicate playlist entry ignored");
                continue;
            }
            let index = i + 1;
            let target = render_filename(&cfg.naming_template, index, &entry.title, &cfg.format);
            jobs.push(Job::new(
                playlist_url,
                index as u32,
                entry,
                target,
                &cfg.quality,
                &cfg.format,
            ));
        }
        jobs
    }

    async fn run_session(
        &self,
        playlist_url: &str,
        playlist_title: Option<String>,
        jobs: Vec<Job>,
        tally: SessionTally,
    ) -> Result<SessionReport> {
        let total = (jobs.len() + tally.outcomes.len()) as u32;
        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .with_context(|| {
                format!("create output dir {}", self.config.output_dir.display())
            })?;

        let session_id = match self
            .db
            .create_session(playlist_url, total, &self.config.snapshot())
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(playlist_url, error = %e, "failed to record session");
                identity::session_id()
            }
        };
        tracing::info!(
            %session_id,
            playlist_url,
            total,
            to_fetch = jobs.len(),
            concurrency = self.config.concurrency,
            "session started"
        );
        if let Err(e) = self
            .db
            .update_session_stats(&session_id, Some(tally.completed), Some(tally.failed))
            .await
        {
            tracing::debug!(%session_id, error = %e, "initial session counters not stored");
        }

        // Report totals cover this session only.
        self.progress.reset();
        let ctx = self.worker_context();
        let tally =
            run_jobs_parallel(&ctx, &session_id, jobs, self.config.concurrency, tally).await;

        let status = if self.shutdown.is_shutdown_requested() {
            SessionStatus::Cancelled
        } else if tally.failed == 0 {
            SessionStatus::Completed
        } else {
            SessionStatus::Failed
        };
        if let Err(e) = self.db.complete_session(&session_id, status).await {
            tracing::error!(%session_id, error = %e, "failed to finalize session");
        }
        if let Err(e) = self
            .db
            .cleanup_old_sessions(self.config.session_retention_days)
            .await
        {
            tracing::warn!(error = %e, "session cleanup failed");
        }
        self.progress.cleanup();

        tracing::info!(
            %session_id,
            status = status.as_str(),
            completed = tally.completed,
            failed = tally.failed,
            abandoned = tally.abandoned,
            "session finished"
        );
        Ok(SessionReport {
            session_id,
            playlist_url: playlist_url.to_string(),
            playlist_title,
            status,
            total,
            completed: tally.completed,
            failed: tally.failed,
            skipped: tally.skipped,
            abandoned: tally.abandoned,
            outcomes: tally.outcomes,
            overall: self.progress.overall_stats(),
            breaker_state: self.breaker.state(),
        })
    }
}
