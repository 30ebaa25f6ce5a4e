//! Linked experiment-run state.
//!
//! Runs live in the experiment-tracking data plane; the scheduler only
//! propagates terminal job outcomes onto the linked run record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::JobStatus;

/// State of a linked experiment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Finished,
    Crashed,
    Killed,
}

impl RunState {
    /// Map a job status onto the run state it implies, if any.
    ///
    /// Pending/Queued jobs leave the run untouched.
    pub fn from_job_status(status: JobStatus) -> Option<RunState> {
        match status {
            JobStatus::Pending | JobStatus::Queued => None,
            JobStatus::Running => Some(RunState::Running),
            JobStatus::Succeeded => Some(RunState::Finished),
            JobStatus::Failed | JobStatus::Timeout => Some(RunState::Crashed),
            JobStatus::Cancelled => Some(RunState::Killed),
        }
    }

    /// Check if this is a terminal run state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Finished | RunState::Crashed | RunState::Killed)
    }
}

/// The slice of a run record the scheduler may update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub state: RunState,
    pub finished_at: Option<DateTime<Utc>>,
}
