//! `plget download <url>` – fetch a playlist, optionally resuming the previous run.

use anyhow::{Context, Result};
use plget_core::config::PlgetConfig;
use plget_core::control::{self, ShutdownCoordinator};
use plget_core::progress::ProgressTracker;
use plget_core::resume_db::ResumeDb;
use plget_core::scheduler::{Orchestrator, SessionReport};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::control_socket;
use crate::ytdlp::YtDlpFetcher;

/// Per-invocation overrides on top of the loaded config.
#[derive(Debug, Default)]
pub struct DownloadOptions {
    pub resume: bool,
    pub jobs: Option<usize>,
    pub output: Option<PathBuf>,
    pub quality: Option<String>,
    pub format: Option<String>,
    pub report: Option<PathBuf>,
}

impl DownloadOptions {
    fn apply(&self, cfg: &mut PlgetConfig) {
        if let Some(n) = self.jobs {
            cfg.concurrency = n;
        }
        if let Some(dir) = &self.output {
            cfg.output_dir = dir.clone();
        }
        if let Some(q) = &self.quality {
            cfg.quality = q.clone();
        }
        if let Some(f) = &self.format {
            cfg.format = f.clone();
        }
    }
}

pub async fn run_download(
    db: ResumeDb,
    mut cfg: PlgetConfig,
    url: &str,
    opts: DownloadOptions,
) -> Result<()> {
    opts.apply(&mut cfg);
    let drain_timeout = cfg.drain_timeout();

    let shutdown = ShutdownCoordinator::shared();
    let progress = if std::io::stderr().is_terminal() {
        Arc::new(ProgressTracker::with_progress_bars())
    } else {
        Arc::new(ProgressTracker::new())
    };
    let orchestrator = Orchestrator::new(db, Arc::new(YtDlpFetcher::new()), cfg)
        .context("invalid configuration")?
        .with_progress(progress)
        .with_shutdown(Arc::clone(&shutdown));

    let socket_path = control::default_control_socket_path().ok();
    let listener = socket_path.as_ref().and_then(|path| {
        match control_socket::spawn_control_listener(Arc::clone(&shutdown), path) {
            Ok(handle) => {
                tracing::debug!(path = %path.display(), "control socket listening");
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "control socket unavailable: {}", e);
                None
            }
        }
    });

    let run = async {
        if opts.resume {
            orchestrator.resume_playlist(url).await
        } else {
            orchestrator.download_playlist(url).await
        }
    };
    tokio::pin!(run);

    let report = tokio::select! {
        res = &mut run => res,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted; waiting for in-flight items to finish...");
            shutdown.request_shutdown();
            if !shutdown.wait_for_drain(drain_timeout).await {
                eprintln!(
                    "Gave up waiting on: {}. They will be retried on resume.",
                    shutdown.active_jobs().join(", ")
                );
                cleanup_listener(listener, socket_path.as_deref());
                cancel_abandoned_sessions(orchestrator.db(), url).await;
                std::process::exit(130);
            }
            run.await
        }
    };
    cleanup_listener(listener, socket_path.as_deref());
    let report = report?;

    print_report(&report);
    if let Some(path) = &opts.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("write report {}", path.display()))?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

/// Close out the session a forced exit leaves behind, so `status` does not
/// report it as still running.
pub(crate) async fn cancel_abandoned_sessions(db: &ResumeDb, url: &str) {
    match db.cancel_active_sessions(url).await {
        Ok(n) => tracing::info!(playlist_url = url, cancelled = n, "abandoned session closed"),
        Err(e) => tracing::warn!(playlist_url = url, error = %e, "could not close session"),
    }
}

fn cleanup_listener(
    listener: Option<tokio::task::JoinHandle<()>>,
    socket_path: Option<&std::path::Path>,
) {
    if let Some(handle) = listener {
        handle.abort();
        if let Some(path) = socket_path {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn print_report(report: &SessionReport) {
    let title = report.playlist_title.as_deref().unwrap_or(&report.playlist_url);
    println!("{} [{}]", title, report.status.as_str());
    println!(
        "  {} of {} done ({} skipped), {} failed, {} not started",
        report.completed, report.total, report.skipped, report.failed, report.abandoned
    );
    let mib = report.overall.downloaded_bytes as f64 / 1_048_576.0;
    println!("  {:.1} MiB fetched this session", mib);
    for outcome in report.failures() {
        let reason = outcome
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  FAILED {} ({}): {}", outcome.item_id, outcome.title, reason);
    }
    if report.failed > 0 || report.abandoned > 0 {
        println!("Run `plget resume {}` to continue.", report.playlist_url);
    }
}
