//! Job entity and lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::resources::Resources;

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of workload a job carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    /// One-shot model training run.
    Training,
    /// Long-running inference/serving workload.
    Inference,
    /// Multi-step DAG workflow.
    Workflow,
}

impl JobType {
    /// Stable lowercase name, as stored and logged.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Training => "training",
            JobType::Inference => "inference",
            JobType::Workflow => "workflow",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute platform a job executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    Kubernetes,
    Slurm,
}

impl ExecutorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorKind::Kubernetes => "kubernetes",
            ExecutorKind::Slurm => "slurm",
        }
    }
}

impl std::fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job.
///
/// Transitions form a DAG: `Pending → Queued → Running → terminal`,
/// with user cancellation allowed from any non-terminal state. There
/// are no backward edges; terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Submitted but not yet enqueued (transient during admission).
    Pending,
    /// Waiting in a queue for dispatch.
    Queued,
    /// Dispatched to a backend and executing.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Completed with an error.
    Failed,
    /// Cancelled by the user or preempted.
    Cancelled,
    /// Exceeded its time limit.
    Timeout,
}

impl JobStatus {
    /// Stable lowercase name, as stored and logged.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Timeout => "timeout",
        }
    }

    /// Check if this is a terminal (absorbing) state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout
        )
    }

    /// Check if the job still occupies backend resources.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Running)
    }

    /// Check whether a transition to `next` is allowed by the lifecycle DAG.
    ///
    /// `Queued → Failed` covers permanent backend rejections at
    /// dispatch; every other edge follows the normal flow.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending => matches!(next, JobStatus::Queued | JobStatus::Cancelled),
            JobStatus::Queued => {
                matches!(next, JobStatus::Running | JobStatus::Cancelled | JobStatus::Failed)
            }
            JobStatus::Running => next.is_terminal(),
            // Terminal states are absorbing.
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled unit of compute work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,

    /// Human-readable job name.
    pub name: String,

    /// Kind of workload.
    pub job_type: JobType,

    /// Target compute platform.
    pub executor: ExecutorKind,

    /// Current lifecycle state.
    pub status: JobStatus,

    /// Owning project.
    pub project_id: Uuid,

    /// Submitting user.
    pub user_id: Uuid,

    /// Optional link to an external experiment run.
    pub run_id: Option<Uuid>,

    /// Queue the job was admitted to.
    pub queue_id: Option<Uuid>,

    /// VDC the job was routed through (when VDC routing is enabled).
    pub vdc_id: Option<Uuid>,

    /// Cluster the job was dispatched to.
    pub cluster_id: Option<Uuid>,

    pub description: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Scheduling priority; higher dispatches first under the priority policy.
    #[serde(default)]
    pub priority: i64,

    /// Resources reserved for the job while it runs.
    pub request: Resources,

    /// Position within the queue, assigned at admission.
    pub queue_position: Option<i64>,

    /// When the job entered the queue.
    pub enqueued_at: Option<DateTime<Utc>>,

    /// Opaque backend-specific specification, consumed only by the
    /// matching driver.
    pub executor_config: serde_json::Value,

    /// Ordered cluster preferences for affinity selection.
    #[serde(default)]
    pub preferred_cluster_ids: Vec<Uuid>,

    /// Labels a cluster must carry to host this job.
    #[serde(default)]
    pub required_labels: rustc_hash::FxHashMap<String, String>,

    /// Backend-assigned handle, set once the job is dispatched.
    pub external_id: Option<String>,

    /// Kubernetes namespace or Slurm cluster name.
    pub namespace: Option<String>,

    pub exit_code: Option<i32>,

    /// Last failure or deferral reason, surfaced to the caller.
    pub error_message: Option<String>,

    /// When the submission was accepted.
    pub submitted_at: DateTime<Utc>,

    /// When the job entered Running.
    pub started_at: Option<DateTime<Utc>>,

    /// When the job entered a terminal state.
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub metrics: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub outputs: serde_json::Map<String, serde_json::Value>,
}

impl Job {
    /// Create a new job in the Pending state.
    pub fn new(
        name: impl Into<String>,
        job_type: JobType,
        executor: ExecutorKind,
        project_id: Uuid,
        user_id: Uuid,
        executor_config: serde_json::Value,
    ) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            job_type,
            executor,
            status: JobStatus::Pending,
            project_id,
            user_id,
            run_id: None,
            queue_id: None,
            vdc_id: None,
            cluster_id: None,
            description: None,
            tags: Vec::new(),
            priority: 0,
            request: Resources::zero(),
            queue_position: None,
            enqueued_at: None,
            executor_config,
            preferred_cluster_ids: Vec::new(),
            required_labels: rustc_hash::FxHashMap::default(),
            external_id: None,
            namespace: None,
            exit_code: None,
            error_message: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            metrics: serde_json::Map::new(),
            outputs: serde_json::Map::new(),
        }
    }

    /// Set the resource request.
    pub fn with_request(mut self, request: Resources) -> Self {
        self.request = request;
        self
    }

    /// Set the scheduling priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Link the job to an experiment run.
    pub fn with_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Route the job through a VDC.
    pub fn with_vdc(mut self, vdc_id: Uuid) -> Self {
        self.vdc_id = Some(vdc_id);
        self
    }

    /// Set ordered cluster preferences.
    pub fn with_preferred_clusters(
        mut self,
        cluster_ids: impl IntoIterator<Item = Uuid>,
    ) -> Self {
        self.preferred_cluster_ids = cluster_ids.into_iter().collect();
        self
    }

    /// Require a label on the hosting cluster.
    pub fn with_required_label(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.required_labels.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Filter for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub project_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub queue_id: Option<Uuid>,
    pub vdc_id: Option<Uuid>,

    /// Restrict to the given statuses.
    pub status: Option<Vec<JobStatus>>,

    /// Restrict to jobs occupying backend resources (Running).
    pub active_only: bool,

    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl JobFilter {
    /// Filter for running jobs (the reconciler's working set).
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Default::default()
        }
    }

    /// Filter for queued jobs of a queue.
    pub fn queued_in(queue_id: Uuid) -> Self {
        Self {
            queue_id: Some(queue_id),
            status: Some(vec![JobStatus::Queued]),
            ..Default::default()
        }
    }

    pub fn with_project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn with_status(mut self, status: impl IntoIterator<Item = JobStatus>) -> Self {
        self.status = Some(status.into_iter().collect());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check if a job matches this filter (the limit is applied by the caller).
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(project_id) = self.project_id {
            if job.project_id != project_id {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            if job.user_id != user_id {
                return false;
            }
        }
        if let Some(queue_id) = self.queue_id {
            if job.queue_id != Some(queue_id) {
                return false;
            }
        }
        if let Some(vdc_id) = self.vdc_id {
            if job.vdc_id != Some(vdc_id) {
                return false;
            }
        }
        if let Some(ref statuses) = self.status {
            if !statuses.contains(&job.status) {
                return false;
            }
        }
        if self.active_only && !job.status.is_active() {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_job() -> Job {
        Job::new(
            "train-resnet",
            JobType::Training,
            ExecutorKind::Kubernetes,
            Uuid::new_v4(),
            Uuid::new_v4(),
            serde_json::json!({"image": "pytorch:2.1"}),
        )
    }

    #[test]
    fn test_job_id_round_trip() {
        let id = JobId::new();
        let parsed = JobId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_status_predicates() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(JobStatus::Running.is_active());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Timeout.is_terminal());
    }

    #[test]
    fn test_transition_dag() {
        use JobStatus::*;

        assert!(Pending.can_transition_to(Queued));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Queued.can_transition_to(Running));
        assert!(Queued.can_transition_to(Cancelled));
        // Permanent backend rejection at dispatch.
        assert!(Queued.can_transition_to(Failed));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));
        assert!(Running.can_transition_to(Timeout));
        assert!(Running.can_transition_to(Cancelled));

        // No backward edges.
        assert!(!Running.can_transition_to(Queued));
        assert!(!Queued.can_transition_to(Pending));
        assert!(!Succeeded.can_transition_to(Running));

        // Terminal states are absorbing.
        for terminal in [Succeeded, Failed, Cancelled, Timeout] {
            for next in [Pending, Queued, Running, Succeeded, Failed, Cancelled, Timeout] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_job_builder() {
        let run_id = Uuid::new_v4();
        let job = make_job()
            .with_priority(50)
            .with_request(crate::Resources::new(2.0, 4.0, 1))
            .with_run(run_id)
            .with_required_label("gpu_type", "a100")
            .with_tag("experiment");

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.priority, 50);
        assert_eq!(job.run_id, Some(run_id));
        assert_eq!(job.required_labels.get("gpu_type").map(String::as_str), Some("a100"));
        assert!(job.external_id.is_none());
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_job_filter() {
        let mut job = make_job();
        let project = job.project_id;

        assert!(JobFilter::default().matches(&job));
        assert!(JobFilter::default().with_project(project).matches(&job));
        assert!(!JobFilter::default().with_project(Uuid::new_v4()).matches(&job));
        assert!(!JobFilter::active().matches(&job));

        job.status = JobStatus::Running;
        assert!(JobFilter::active().matches(&job));
        assert!(
            JobFilter::default()
                .with_status([JobStatus::Running, JobStatus::Queued])
                .matches(&job)
        );
    }

    #[test]
    fn test_job_serde_round_trip() {
        let job = make_job().with_request(crate::Resources::new(1.0, 2.0, 0));
        let text = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&text).unwrap();
        assert_eq!(back.id, job.id);
        assert_eq!(back.status, JobStatus::Pending);
        assert_eq!(back.request, job.request);
    }
}
