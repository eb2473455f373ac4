//! Live progress for every job in a session, plus the aggregate.
//!
//! All mutations go through one mutex so a reader never sees per-job stats that
//! disagree with the totals. Subscribers are called synchronously after each update
//! (outside the lock); a subscriber that errors or panics is logged and skipped.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use crate::fetcher::FetchProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Starting,
    Downloading,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl TrackStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, TrackStatus::Starting | TrackStatus::Downloading)
    }
}

/// Live statistics for one job.
#[derive(Debug, Clone)]
pub struct JobStats {
    pub source_url: String,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Reported by the fetcher, in bytes per second.
    pub speed: Option<f64>,
    pub eta_secs: Option<u64>,
    pub status: TrackStatus,
    pub started: Instant,
    pub finished: Option<Instant>,
    pub error: Option<String>,
}

impl JobStats {
    fn new(source_url: &str) -> Self {
        Self {
            source_url: source_url.to_string(),
            downloaded_bytes: 0,
            total_bytes: None,
            speed: None,
            eta_secs: None,
            status: TrackStatus::Starting,
            started: Instant::now(),
            finished: None,
            error: None,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        let end = self.finished.unwrap_or_else(Instant::now);
        end.duration_since(self.started).as_secs_f64()
    }

    /// Reported speed, or average rate since start (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if let Some(speed) = self.speed {
            return speed;
        }
        let elapsed = self.elapsed_secs();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.downloaded_bytes as f64 / elapsed
    }

    /// Percent complete in [0, 100]; 0 while the total is unknown.
    pub fn percentage(&self) -> f64 {
        match self.total_bytes {
            Some(total) if total > 0 => {
                (self.downloaded_bytes as f64 / total as f64 * 100.0).min(100.0)
            }
            _ => 0.0,
        }
    }

    pub fn speed_mib(&self) -> f64 {
        self.bytes_per_sec() / (1024.0 * 1024.0)
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressUpdate {
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub speed: Option<f64>,
    pub eta_secs: Option<u64>,
    pub status: Option<TrackStatus>,
}

impl From<FetchProgress> for ProgressUpdate {
    fn from(p: FetchProgress) -> Self {
        Self {
            downloaded_bytes: Some(p.downloaded_bytes),
            total_bytes: p.total_bytes,
            speed: p.speed,
            eta_secs: p.eta_secs,
            status: Some(TrackStatus::Downloading),
        }
    }
}

/// Aggregate over every tracked job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverallStats {
    pub total_jobs: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    /// Σdownloaded / Σtotal in [0, 1]; 0 while no totals are known.
    pub overall_progress: f64,
    /// Sum of the reported speeds of active jobs.
    pub speed: f64,
}

/// Serializable view of one job's stats.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub source_url: String,
    pub status: TrackStatus,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub percentage: f64,
    pub speed: f64,
    pub eta_secs: Option<u64>,
    pub elapsed_secs: f64,
    pub error: Option<String>,
}

/// Subscriber invoked with the job id and its stats after every change.
pub type ProgressCallback = Box<dyn Fn(&str, &JobStats) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
struct State {
    jobs: HashMap<String, JobStats>,
    bars: HashMap<String, ProgressBar>,
}

#[derive(Default)]
pub struct ProgressTracker {
    state: Mutex<State>,
    multi: Option<MultiProgress>,
    callbacks: RwLock<Vec<Arc<ProgressCallback>>>,
}

impl ProgressTracker {
    /// Tracker without terminal output (tests, `--report` runs).
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker that draws one terminal progress bar per active job.
    pub fn with_progress_bars() -> Self {
        Self {
            multi: Some(MultiProgress::new()),
            ..Self::default()
        }
    }

    pub fn add_callback(&self, callback: ProgressCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start_tracking(&self, job_id: &str, source_url: &str) {
        let stats = JobStats::new(source_url);
        {
            let mut state = self.lock();
            if let Some(multi) = &self.multi {
                let bar = multi.add(ProgressBar::new(0));
                bar.set_style(bar_style());
                bar.set_prefix(short_id(job_id).to_string());
                bar.set_message("starting");
                if let Some(old) = state.bars.insert(job_id.to_string(), bar) {
                    old.finish_and_clear();
                }
            }
            state.jobs.insert(job_id.to_string(), stats.clone());
        }
        self.notify(job_id, &stats);
    }

    /// Apply a partial update. Unknown job ids are ignored.
    pub fn update_progress(&self, job_id: &str, update: ProgressUpdate) {
        let stats = {
            let mut state = self.lock();
            let State { jobs, bars } = &mut *state;
            let Some(stats) = jobs.get_mut(job_id) else {
                return;
            };
            if let Some(d) = update.downloaded_bytes {
                stats.downloaded_bytes = d;
            }
            if update.total_bytes.is_some() {
                stats.total_bytes = update.total_bytes;
            }
            if update.speed.is_some() {
                stats.speed = update.speed;
            }
            if update.eta_secs.is_some() {
                stats.eta_secs = update.eta_secs;
            }
            if let Some(status) = update.status {
                stats.status = status;
            }
            if let Some(bar) = bars.get(job_id) {
                if let Some(total) = stats.total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(stats.downloaded_bytes);
                bar.set_message(format!("{:.2} MiB/s", stats.speed_mib()));
            }
            stats.clone()
        };
        self.notify(job_id, &stats);
    }

    /// Mark a job finished as Completed or Failed.
    pub fn finish_tracking(&self, job_id: &str, success: bool, error: Option<&str>) {
        let status = if success {
            TrackStatus::Completed
        } else {
            TrackStatus::Failed
        };
        self.finish_with_status(job_id, status, error);
    }

    pub fn finish_with_status(&self, job_id: &str, status: TrackStatus, error: Option<&str>) {
        let stats = {
            let mut state = self.lock();
            let State { jobs, bars } = &mut *state;
            let Some(stats) = jobs.get_mut(job_id) else {
                return;
            };
            stats.status = status;
            stats.finished = Some(Instant::now());
            stats.error = error.map(str::to_string);
            if status == TrackStatus::Completed {
                if let Some(total) = stats.total_bytes {
                    stats.downloaded_bytes = stats.downloaded_bytes.max(total);
                }
                stats.eta_secs = Some(0);
            }
            if let Some(bar) = bars.get(job_id) {
                let msg = match error {
                    Some(e) => format!("{status:?}: {e}"),
                    None => format!("{status:?}"),
                };
                bar.finish_with_message(msg);
            }
            stats.clone()
        };
        self.notify(job_id, &stats);
    }

    pub fn get(&self, job_id: &str) -> Option<JobStats> {
        self.lock().jobs.get(job_id).cloned()
    }

    pub fn overall_stats(&self) -> OverallStats {
        let state = self.lock();
        let mut out = OverallStats {
            total_jobs: state.jobs.len(),
            ..OverallStats::default()
        };
        for stats in state.jobs.values() {
            match stats.status {
                TrackStatus::Starting | TrackStatus::Downloading => {
                    out.active += 1;
                    out.speed += stats.speed.unwrap_or(0.0);
                }
                TrackStatus::Completed => out.completed += 1,
                TrackStatus::Failed => out.failed += 1,
                TrackStatus::Skipped => out.skipped += 1,
                TrackStatus::Cancelled => out.cancelled += 1,
            }
            out.downloaded_bytes += stats.downloaded_bytes;
            out.total_bytes += stats.total_bytes.unwrap_or(0);
        }
        if out.total_bytes > 0 {
            out.overall_progress =
                (out.downloaded_bytes as f64 / out.total_bytes as f64).min(1.0);
        }
        out
    }

    /// Per-job view, sorted by job id.
    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        let state = self.lock();
        let mut out: Vec<JobSnapshot> = state
            .jobs
            .iter()
            .map(|(id, s)| JobSnapshot {
                job_id: id.clone(),
                source_url: s.source_url.clone(),
                status: s.status,
                downloaded_bytes: s.downloaded_bytes,
                total_bytes: s.total_bytes,
                percentage: s.percentage(),
                speed: s.bytes_per_sec(),
                eta_secs: s.eta_secs,
                elapsed_secs: s.elapsed_secs(),
                error: s.error.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        out
    }

    /// Forget every tracked job and drop its bar, so totals start from zero.
    pub fn reset(&self) {
        let bars: Vec<ProgressBar> = {
            let mut state = self.lock();
            state.jobs.clear();
            state.bars.drain().map(|(_, b)| b).collect()
        };
        for bar in bars {
            bar.finish_and_clear();
        }
    }

    /// Release every progress bar. Stats stay queryable.
    pub fn cleanup(&self) {
        let bars: Vec<ProgressBar> = self.lock().bars.drain().map(|(_, b)| b).collect();
        for bar in bars {
            bar.finish_and_clear();
        }
        if let Some(multi) = &self.multi {
            let _ = multi.clear();
        }
    }

    fn notify(&self, job_id: &str, stats: &JobStats) {
        let callbacks: Vec<Arc<ProgressCallback>> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for cb in callbacks {
            match catch_unwind(AssertUnwindSafe(|| (**cb)(job_id, stats))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(job_id, error = %e, "progress callback failed"),
                Err(_) => tracing::error!(job_id, "progress callback panicked"),
            }
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(concat!(
        "{prefix:.bold} [{elapsed_precise}] [{bar:30.cyan/blue}] ",
        "{bytes}/{total_bytes} ({eta}) {msg}",
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ")
}

fn short_id(job_id: &str) -> &str {
    job_id.get(..8).unwrap_or(job_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn tracks_update_and_finish() {
        let t = ProgressTracker::new();
        t.start_tracking("a", "https://x/a");
        t.update_progress(
            "a",
            ProgressUpdate {
                downloaded_bytes: Some(50),
                total_bytes: Some(200),
                speed: Some(10.0),
                ..Default::default()
            },
        );
        let s = t.get("a").unwrap();
        assert_eq!(s.status, TrackStatus::Starting);
        assert!((s.percentage() - 25.0).abs() < 1e-9);
        assert!((s.bytes_per_sec() - 10.0).abs() < 1e-9);

        t.finish_tracking("a", true, None);
        let s = t.get("a").unwrap();
        assert_eq!(s.status, TrackStatus::Completed);
        assert_eq!(s.downloaded_bytes, 200);
        assert!(s.finished.is_some());
    }

    #[test]
    fn overall_progress_is_sum_ratio() {
        let t = ProgressTracker::new();
        t.start_tracking("a", "u");
        t.start_tracking("b", "u");
        t.start_tracking("c", "u");
        let done = FetchProgress {
            downloaded_bytes: 100,
            total_bytes: Some(100),
            ..Default::default()
        };
        let fresh = FetchProgress {
            downloaded_bytes: 0,
            total_bytes: Some(300),
            ..Default::default()
        };
        t.update_progress("a", done.into());
        t.update_progress("b", fresh.into());
        t.finish_tracking("c", false, Some("boom"));

        let o = t.overall_stats();
        assert_eq!(o.total_jobs, 3);
        assert_eq!(o.active, 2);
        assert_eq!(o.failed, 1);
        assert_eq!(o.downloaded_bytes, 100);
        assert_eq!(o.total_bytes, 400);
        assert!((o.overall_progress - 0.25).abs() < 1e-9);
        assert_eq!(t.get("c").unwrap().error.as_deref(), Some("boom"));
    }

    #[test]
    fn unknown_job_updates_are_ignored() {
        let t = ProgressTracker::new();
        t.update_progress("ghost", ProgressUpdate::default());
        t.finish_tracking("ghost", true, None);
        assert!(t.get("ghost").is_none());
        assert_eq!(t.overall_stats(), OverallStats::default());
    }

    #[test]
    fn callbacks_fire_and_failures_are_contained() {
        let t = ProgressTracker::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        t.add_callback(Box::new(|_: &str, _: &JobStats| -> anyhow::Result<()> {
            anyhow::bail!("subscriber broke")
        }));
        t.add_callback(Box::new(|_: &str, _: &JobStats| -> anyhow::Result<()> {
            panic!("subscriber panicked")
        }));
        t.add_callback(Box::new(move |_: &str, _: &JobStats| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        t.start_tracking("a", "u");
        t.update_progress("a", ProgressUpdate::default());
        t.finish_tracking("a", true, None);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn snapshot_is_sorted_and_serializable() {
        let t = ProgressTracker::new();
        t.start_tracking("b", "u2");
        t.start_tracking("a", "u1");
        t.finish_with_status("b", TrackStatus::Skipped, None);
        let snap = t.snapshot();
        assert_eq!(snap[0].job_id, "a");
        assert_eq!(snap[1].status, TrackStatus::Skipped);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json[1]["status"], "skipped");
    }

    #[test]
    fn cleanup_keeps_stats() {
        let t = ProgressTracker::with_progress_bars();
        t.start_tracking("a", "u");
        t.cleanup();
        assert!(t.get("a").is_some());
    }

    #[test]
    fn reset_starts_totals_from_zero() {
        let t = ProgressTracker::with_progress_bars();
        t.start_tracking("a", "u");
        t.finish_tracking("a", false, Some("boom"));
        t.reset();
        assert!(t.get("a").is_none());
        assert_eq!(t.overall_stats(), OverallStats::default());

        t.start_tracking("b", "u");
        assert_eq!(t.overall_stats().total_jobs, 1);
    }
}
