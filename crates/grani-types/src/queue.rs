//! Per-project job queues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A per-project queue with a concurrency cap.
///
/// The `total_jobs` / `running_jobs` / `pending_jobs` counters are
/// denormalized statistics, recomputable from the job table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobQueue {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,

    /// Queues are drained in descending priority order.
    pub priority: i64,

    /// Maximum number of jobs running concurrently from this queue.
    pub max_concurrent_jobs: u32,

    /// Disabled queues accept no new jobs and are skipped by the tick.
    pub enabled: bool,

    pub total_jobs: u32,
    pub running_jobs: u32,
    pub pending_jobs: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobQueue {
    /// The default queue created on a project's first submission.
    pub fn default_for_project(project_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            name: "default".to_string(),
            description: Some("Default job queue".to_string()),
            priority: 0,
            max_concurrent_jobs: 10,
            enabled: true,
            total_jobs: 0,
            running_jobs: 0,
            pending_jobs: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether another job may start from this queue.
    pub fn has_capacity(&self) -> bool {
        self.running_jobs < self.max_concurrent_jobs
    }
}
