//! Orchestrator tests against an in-memory store and a scripted fetcher.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::breaker::CircuitState;
use crate::config::{ConfigError, PlgetConfig};
use crate::fetcher::{FetchProgress, FetchRequest, MediaFetcher, PlaylistEntry, PlaylistInfo};
use crate::resume_db::db::open_memory;
use crate::progress::TrackStatus;
use crate::resume_db::{JobStatus, ResumeDb};
use crate::retry::ErrorKind;

use super::parallel::lost_job;
use super::{OutcomeStatus, Orchestrator};

const PL: &str = "https://example.com/playlist?list=PLtest";

/// Fails `source_url` with `message` for the first `times` calls (u32::MAX = always).
#[derive(Default)]
struct ScriptedFetcher {
    entries: Vec<PlaylistEntry>,
    extract_error: Option<String>,
    failures: Mutex<HashMap<String, (u32, String)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    fn with_items(items: &[&str]) -> Self {
        Self {
            entries: items
                .iter()
                .map(|i| PlaylistEntry {
                    item_id: i.to_string(),
                    source_url: url(i),
                    title: format!("Title {i}"),
                })
                .collect(),
            ..Default::default()
        }
    }

    fn fail(self, item: &str, times: u32, message: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(url(item), (times, message.to_string()));
        self
    }

    fn calls_for(&self, item: &str) -> usize {
        let u = url(item);
        self.calls.lock().unwrap().iter().filter(|c| **c == u).count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn url(item: &str) -> String {
    format!("https://example.com/watch?v={item}")
}

impl MediaFetcher for ScriptedFetcher {
    fn extract_playlist(&self, _url: &str) -> anyhow::Result<PlaylistInfo> {
        if let Some(msg) = &self.extract_error {
            anyhow::bail!("{msg}");
        }
        Ok(PlaylistInfo {
            title: "Test list".into(),
            description: None,
            entries: self.entries.clone(),
        })
    }

    fn fetch(
        &self,
        request: &FetchRequest,
        on_progress: &mut dyn FnMut(&str, FetchProgress),
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(request.source_url.clone());
        on_progress(
            &request.job_id,
            FetchProgress {
                downloaded_bytes: 256,
                total_bytes: Some(512),
                speed: Some(1024.0),
                eta_secs: Some(1),
            },
        );
        if let Some((remaining, msg)) = self.failures.lock().unwrap().get_mut(&request.source_url)
        {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                anyhow::bail!("{msg}");
            }
        }
        std::fs::write(&request.destination, vec![0u8; 512])?;
        Ok(())
    }
}

async fn orchestrator(fetcher: Arc<ScriptedFetcher>, dir: &Path) -> Orchestrator {
    let db: ResumeDb = open_memory().await.unwrap();
    Orchestrator::new(db, fetcher, test_config(dir)).unwrap()
}

fn test_config(dir: &Path) -> PlgetConfig {
    let mut cfg = PlgetConfig::default();
    cfg.output_dir = dir.to_path_buf();
    cfg.concurrency = 2;
    cfg.retry.base_delay_secs = 0.0;
    cfg.retry.max_delay_secs = 0;
    cfg.retry.jitter = false;
    cfg
}

#[tokio::test]
async fn retryable_errors_are_retried_until_success() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher =
        Arc::new(ScriptedFetcher::with_items(&["a"]).fail("a", 2, "Connection reset by peer"));
    let orch = orchestrator(fetcher.clone(), dir.path()).await;

    let report = orch.download_playlist(PL).await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(fetcher.calls_for("a"), 3);
    assert!(dir.path().join("001 - Title a.mp4").exists());

    let job = &orch.db().get_jobs_by_playlist(PL, None).await.unwrap()[0];
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.downloaded_bytes, 512);
}

#[tokio::test]
async fn non_retryable_error_uses_one_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(
        ScriptedFetcher::with_items(&["a"]).fail("a", u32::MAX, "HTTP Error 403: Forbidden"),
    );
    let orch = orchestrator(fetcher.clone(), dir.path()).await;

    let report = orch.download_playlist(PL).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(fetcher.calls_for("a"), 1);
    let err = report.failures().next().unwrap().error.clone().unwrap();
    assert_eq!(err.kind, ErrorKind::Permission);
}

#[tokio::test]
async fn open_breaker_fails_remaining_jobs_fast() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.concurrency = 1;
    cfg.breaker.failure_threshold = 1;
    let fetcher = Arc::new(
        ScriptedFetcher::with_items(&["a", "b", "c"])
            .fail("a", u32::MAX, "Video unavailable")
            .fail("b", u32::MAX, "Video unavailable")
            .fail("c", u32::MAX, "Video unavailable"),
    );
    let orch = Orchestrator::new(open_memory().await.unwrap(), fetcher.clone(), cfg).unwrap();

    let report = orch.download_playlist(PL).await.unwrap();
    assert_eq!(report.failed, 3);
    assert_eq!(fetcher.total_calls(), 1);
    assert_eq!(report.breaker_state, CircuitState::Open);
    let kinds: Vec<ErrorKind> = report
        .failures()
        .map(|o| o.error.as_ref().unwrap().kind)
        .collect();
    assert_eq!(kinds.iter().filter(|k| **k == ErrorKind::CircuitOpen).count(), 2);
}

#[tokio::test]
async fn existing_target_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("002 - Title b.mp4"), b"already here").unwrap();
    let fetcher = Arc::new(ScriptedFetcher::with_items(&["a", "b"]));
    let orch = orchestrator(fetcher.clone(), dir.path()).await;

    let report = orch.download_playlist(PL).await.unwrap();
    assert_eq!(report.completed, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(fetcher.calls_for("b"), 0);
    let skipped = orch
        .db()
        .get_jobs_by_playlist(PL, Some(JobStatus::Skipped))
        .await
        .unwrap();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].item_id, "b");
}

#[tokio::test]
async fn duplicate_entries_become_one_job() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::with_items(&["a", "a", "b"]));
    let orch = orchestrator(fetcher.clone(), dir.path()).await;

    let report = orch.download_playlist(PL).await.unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(fetcher.calls_for("a"), 1);
}

#[tokio::test]
async fn second_run_does_not_refetch_completed_items() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::with_items(&["a", "b"]));
    let orch = orchestrator(fetcher.clone(), dir.path()).await;

    orch.download_playlist(PL).await.unwrap();
    let again = orch.download_playlist(PL).await.unwrap();
    assert_eq!(again.completed, 2);
    assert!(again
        .outcomes
        .iter()
        .all(|o| o.status == OutcomeStatus::AlreadyCompleted));
    assert_eq!(fetcher.total_calls(), 2);
}

#[tokio::test]
async fn extraction_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(ScriptedFetcher {
        extract_error: Some("ERROR: The playlist does not exist (HTTP Error 404)".into()),
        ..Default::default()
    });
    let orch = orchestrator(fetcher, dir.path()).await;

    let err = orch.download_playlist(PL).await.unwrap_err();
    assert!(format!("{err:#}").contains("extract playlist"));
    assert!(orch.db().list_sessions(PL).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.concurrency = 0;
    let res = Orchestrator::new(
        open_memory().await.unwrap(),
        Arc::new(ScriptedFetcher::default()),
        cfg,
    );
    assert!(matches!(res, Err(ConfigError::ZeroConcurrency)));
}

#[tokio::test]
async fn closed_store_does_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::with_items(&["a", "b"]));
    let orch = orchestrator(fetcher.clone(), dir.path()).await;
    orch.db().pool.close().await;

    let report = orch.download_playlist(PL).await.unwrap();
    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(fetcher.total_calls(), 2);
    assert!(dir.path().join("001 - Title a.mp4").exists());
    assert!(dir.path().join("002 - Title b.mp4").exists());
}

#[tokio::test]
async fn panicked_worker_is_recorded_as_failed_job() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::with_items(&["a"]));
    let orch = orchestrator(fetcher, dir.path()).await;
    orch.download_playlist(PL).await.unwrap();
    let job = orch.db().get_jobs_by_playlist(PL, None).await.unwrap()[0].clone();

    let ctx = orch.worker_context();
    ctx.progress.start_tracking(&job.id, &job.source_url);
    let join_err = tokio::spawn(async { panic!("worker blew up") })
        .await
        .unwrap_err();
    let outcome = lost_job(&ctx, &job, &join_err).await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.error.as_ref().unwrap().kind, ErrorKind::Unknown);
    assert_eq!(ctx.progress.get(&job.id).unwrap().status, TrackStatus::Failed);
    let stored = orch.db().get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.last_error.unwrap().kind, ErrorKind::Unknown);
}

#[tokio::test]
async fn overall_stats_cover_only_the_current_session() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(
        ScriptedFetcher::with_items(&["a", "b", "c"]).fail("c", 1, "HTTP Error 403: Forbidden"),
    );
    let orch = orchestrator(fetcher.clone(), dir.path()).await;

    let first = orch.download_playlist(PL).await.unwrap();
    assert_eq!(first.overall.total_jobs, 3);
    assert_eq!(first.overall.failed, 1);

    let second = orch.resume_playlist(PL).await.unwrap();
    assert_eq!(second.failed, 0);
    assert_eq!(second.overall.total_jobs, 1);
    assert_eq!(second.overall.failed, 0);
    assert_eq!(second.overall.completed, 1);
    assert_eq!(second.overall.downloaded_bytes, 512);
}
