//! Per-job outcomes and the session summary returned to callers.

use serde::Serialize;

use crate::breaker::CircuitState;
use crate::progress::OverallStats;
use crate::resume_db::{Job, SessionStatus};
use crate::retry::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Fetched in this session.
    Completed,
    /// Already completed by an earlier session; not fetched again.
    AlreadyCompleted,
    /// Target file already existed on disk.
    Skipped,
    Failed,
    /// Never finished because shutdown was requested; picked up again on resume.
    Abandoned,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub item_id: String,
    pub title: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FetchError>,
}

impl JobOutcome {
    pub fn new(job: &Job, status: OutcomeStatus, error: Option<FetchError>) -> Self {
        Self {
            job_id: job.id.clone(),
            item_id: job.item_id.clone(),
            title: job.title.clone(),
            status,
            error,
        }
    }
}

/// Running counters for one session, updated as outcomes arrive.
#[derive(Debug, Default)]
pub(super) struct SessionTally {
    pub completed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub abandoned: u32,
    pub outcomes: Vec<JobOutcome>,
}

impl SessionTally {
    pub fn record(&mut self, outcome: JobOutcome) {
        match outcome.status {
            OutcomeStatus::Completed | OutcomeStatus::AlreadyCompleted => self.completed += 1,
            OutcomeStatus::Skipped => {
                self.completed += 1;
                self.skipped += 1;
            }
            OutcomeStatus::Failed => self.failed += 1,
            OutcomeStatus::Abandoned => self.abandoned += 1,
        }
        self.outcomes.push(outcome);
    }
}

/// Result of one orchestration run over a playlist.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub playlist_url: String,
    pub playlist_title: Option<String>,
    pub status: SessionStatus,
    pub total: u32,
    /// Includes items completed by earlier sessions and items skipped on disk.
    pub completed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub abandoned: u32,
    /// Outcomes in completion order.
    pub outcomes: Vec<JobOutcome>,
    pub overall: OverallStats,
    pub breaker_state: CircuitState,
}

impl SessionReport {
    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
    }
}
