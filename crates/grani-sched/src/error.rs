//! Error handling and dispatch outcomes for the scheduler.

use thiserror::Error;

use grani_types::JobStatus;

/// Result type for scheduler operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur during scheduler operations.
#[derive(Error, Debug)]
pub enum SchedError {
    /// Job not found in the store.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Queue not found in the store.
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    /// Queue exists but is disabled.
    #[error("queue is disabled: {0}")]
    QueueDisabled(String),

    /// Submission rejected before anything was persisted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested executor is not configured in this deployment.
    #[error("executor not configured: {0}")]
    ExecutorUnavailable(String),

    /// A transition the lifecycle DAG forbids was attempted.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// Backend driver failure.
    #[error("driver error: {0}")]
    Driver(#[from] grani_exec::ExecError),

    /// Resource quantity could not be parsed.
    #[error("resource error: {0}")]
    Resource(#[from] grani_types::ResourceError),

    /// Persistence failure.
    #[error("store error: {0}")]
    Store(String),

    /// Internal scheduler error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for SchedError {
    fn from(e: rusqlite::Error) -> Self {
        SchedError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for SchedError {
    fn from(e: serde_json::Error) -> Self {
        SchedError::Store(e.to_string())
    }
}

/// Outcome of one dispatch attempt.
///
/// Quota exhaustion and missing cluster candidates are expected
/// outcomes, not errors: the job stays queued and the next tick
/// retries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The job was submitted and is now running.
    Dispatched,

    /// The job stays queued; `reason` is recorded on the job.
    Queued { reason: String },

    /// The job failed permanently; `message` is recorded on the job.
    Failed { message: String },
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, DispatchOutcome::Dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedError::JobNotFound("j-1".to_string());
        assert_eq!(err.to_string(), "job not found: j-1");

        let err = SchedError::InvalidTransition {
            from: JobStatus::Succeeded,
            to: JobStatus::Running,
        };
        assert_eq!(err.to_string(), "invalid status transition: succeeded -> running");
    }
}
