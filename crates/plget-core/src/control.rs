//! Cooperative shutdown: a process-wide stop flag plus the registry of jobs in flight.
//!
//! Workers register each job they start and check the flag before picking up new
//! work and before every retry wait. Requesting shutdown never interrupts a fetch
//! that is already running; `wait_for_drain` lets the caller wait (bounded) for
//! those to finish.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DRAIN_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Default)]
pub struct ShutdownCoordinator {
    requested: AtomicBool,
    notify: Notify,
    active: RwLock<HashSet<String>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Set the shutdown flag and wake everyone waiting on it. Idempotent.
    pub fn request_shutdown(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            tracing::info!(active = self.active_count(), "shutdown requested");
        }
        self.notify.notify_waiters();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been requested (immediately if it already was).
    pub async fn wait_for_shutdown(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }

    /// Register a job as in flight. The job leaves the active set when the guard drops.
    pub fn register(&self, job_id: &str) -> ActiveJob<'_> {
        self.active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id.to_string());
        ActiveJob {
            coordinator: self,
            job_id: job_id.to_string(),
        }
    }

    pub fn unregister(&self, job_id: &str) {
        self.active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id);
    }

    /// Snapshot of job ids currently in flight, sorted.
    pub fn active_jobs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn active_count(&self) -> usize {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Poll the active set until it is empty or `timeout` elapses.
    /// Returns `true` if everything drained.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let mut last_log = start;
        loop {
            let remaining_jobs = self.active_count();
            if remaining_jobs == 0 {
                tracing::info!("all active jobs drained");
                return true;
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                tracing::warn!(
                    remaining = remaining_jobs,
                    jobs = ?self.active_jobs(),
                    "drain timed out; remaining jobs will be picked up on resume"
                );
                return false;
            }
            if last_log.elapsed() >= DRAIN_LOG_INTERVAL {
                tracing::info!(
                    remaining = remaining_jobs,
                    waited_secs = elapsed.as_secs(),
                    "waiting for active jobs to finish"
                );
                last_log = Instant::now();
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL.min(timeout - elapsed)).await;
        }
    }
}

/// RAII registration in the active-job set.
pub struct ActiveJob<'a> {
    coordinator: &'a ShutdownCoordinator,
    job_id: String,
}

impl ActiveJob<'_> {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl Drop for ActiveJob<'_> {
    fn drop(&mut self) {
        self.coordinator.unregister(&self.job_id);
    }
}

/// Default path for the control socket (same XDG state dir as the DB).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("plget")?.get_state_home();
    Ok(dir.join("control.sock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_guard_drop() {
        let c = ShutdownCoordinator::new();
        {
            let _a = c.register("a");
            let _b = c.register("b");
            assert_eq!(c.active_jobs(), vec!["a".to_string(), "b".to_string()]);
        }
        assert_eq!(c.active_count(), 0);
    }

    #[test]
    fn request_is_idempotent() {
        let c = ShutdownCoordinator::new();
        assert!(!c.is_shutdown_requested());
        c.request_shutdown();
        c.request_shutdown();
        assert!(c.is_shutdown_requested());
    }

    #[tokio::test]
    async fn wait_for_shutdown_returns_when_already_requested() {
        let c = ShutdownCoordinator::new();
        c.request_shutdown();
        tokio::time::timeout(Duration::from_secs(1), c.wait_for_shutdown())
            .await
            .expect("should not block");
    }

    #[tokio::test]
    async fn wait_for_shutdown_wakes_on_request() {
        let c = ShutdownCoordinator::shared();
        let waiter = {
            let c = c.clone();
            tokio::spawn(async move { c.wait_for_shutdown().await })
        };
        tokio::task::yield_now().await;
        c.request_shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
    }

    #[tokio::test]
    async fn drain_times_out_with_stuck_job() {
        let c = ShutdownCoordinator::new();
        let _stuck = c.register("stuck");
        assert!(!c.wait_for_drain(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn drain_completes_when_jobs_finish() {
        let c = ShutdownCoordinator::shared();
        c.unregister("never-registered");
        let held = c.clone();
        let task = tokio::spawn(async move {
            let _guard = held.register("job");
            tokio::time::sleep(Duration::from_millis(100)).await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(c.wait_for_drain(Duration::from_secs(5)).await);
        task.await.unwrap();
    }
}
