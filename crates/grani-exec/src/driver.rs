//! The uniform driver interface over compute backends.

use async_trait::async_trait;

use grani_types::{Job, JobStatus};

use crate::error::ExecResult;

/// Job-level metrics as reported by a backend.
pub type JobMetrics = serde_json::Map<String, serde_json::Value>;

/// Uniform interface over a compute backend.
///
/// A driver translates the scheduler's generic job model into
/// backend-native objects and reads status back. Implementations must
/// be safe to call concurrently for independent jobs.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Name of the backend (for logs and error messages).
    fn name(&self) -> &str;

    /// Submit a job and return the backend-assigned handle.
    ///
    /// Re-submitting a job whose handle already exists must be treated
    /// as idempotent success and return the same handle.
    async fn submit(&self, job: &Job) -> ExecResult<String>;

    /// Read the current status of a submitted job.
    async fn status(&self, external_id: &str) -> ExecResult<JobStatus>;

    /// Cancel a submitted job. Cancelling an already-gone job is an error
    /// of kind `NotFound`, which callers treat as success.
    async fn cancel(&self, external_id: &str) -> ExecResult<()>;

    /// Retrieve job logs, or a stable sentinel when none are available.
    async fn logs(&self, external_id: &str) -> ExecResult<String>;

    /// Retrieve job-level metrics.
    async fn metrics(&self, external_id: &str) -> ExecResult<JobMetrics>;
}
