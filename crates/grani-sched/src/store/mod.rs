//! Persistence layer for scheduler state.
//!
//! The orchestrator is pure with respect to this trait: every entry
//! point threads through a [`StateStore`], and tests supply the
//! in-memory fake. The reserve/release methods are the serialization
//! points for quota accounting — implementations must execute each of
//! them as one atomic transaction.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use uuid::Uuid;

use grani_types::{
    Cluster, Job, JobFilter, JobId, JobQueue, JobType, ProjectQuota, ProjectVdcQuota, Resources,
    Run, Vdc,
};

use crate::error::SchedResult;

/// Trait for persistent scheduler state.
#[async_trait]
pub trait StateStore: Send + Sync {
    // --- Jobs ---

    /// Persist a new job.
    async fn insert_job(&self, job: &Job) -> SchedResult<()>;

    /// Persist changes to an existing job.
    async fn update_job(&self, job: &Job) -> SchedResult<()>;

    /// Load a job by id.
    async fn get_job(&self, id: JobId) -> SchedResult<Option<Job>>;

    /// List jobs matching a filter.
    async fn list_jobs(&self, filter: &JobFilter) -> SchedResult<Vec<Job>>;

    /// Highest queue position among Pending/Queued jobs of a queue.
    async fn max_queue_position(&self, queue_id: Uuid) -> SchedResult<i64>;

    /// Number of running jobs a user has on a cluster (per-user caps).
    async fn count_running_for_user(&self, cluster_id: Uuid, user_id: Uuid) -> SchedResult<u32>;

    // --- Queues ---

    async fn get_queue(&self, id: Uuid) -> SchedResult<Option<JobQueue>>;

    /// Resolve the project's default queue, creating it on first use.
    ///
    /// With several queues present, the enabled queue of highest
    /// priority wins.
    async fn get_or_create_default_queue(&self, project_id: Uuid) -> SchedResult<JobQueue>;

    async fn update_queue(&self, queue: &JobQueue) -> SchedResult<()>;

    /// All enabled queues in descending priority order.
    async fn list_enabled_queues(&self) -> SchedResult<Vec<JobQueue>>;

    /// Recompute a queue's denormalized counters from the job table.
    async fn refresh_queue_stats(&self, queue_id: Uuid) -> SchedResult<JobQueue>;

    // --- Project quotas ---

    /// Load a project's quota, provisioning the default on first use.
    async fn get_or_create_project_quota(&self, project_id: Uuid) -> SchedResult<ProjectQuota>;

    async fn upsert_project_quota(&self, quota: &ProjectQuota) -> SchedResult<()>;

    /// Atomically reserve against the project quota. Returns false
    /// (and changes nothing) when the request does not fit.
    async fn try_reserve_project_quota(
        &self,
        project_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<bool>;

    /// Release a project-quota reservation, saturating at zero.
    async fn release_project_quota(
        &self,
        project_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<()>;

    // --- VDCs and clusters ---

    async fn get_vdc(&self, id: Uuid) -> SchedResult<Option<Vdc>>;
    async fn upsert_vdc(&self, vdc: &Vdc) -> SchedResult<()>;

    async fn get_cluster(&self, id: Uuid) -> SchedResult<Option<Cluster>>;
    async fn upsert_cluster(&self, cluster: &Cluster) -> SchedResult<()>;

    /// Clusters belonging to a VDC.
    async fn list_clusters(&self, vdc_id: Uuid) -> SchedResult<Vec<Cluster>>;

    /// Account a dispatched job against a cluster's advisory counters.
    async fn reserve_cluster(&self, cluster_id: Uuid, request: &Resources) -> SchedResult<()>;

    /// Release a finished job from a cluster's advisory counters.
    async fn release_cluster(&self, cluster_id: Uuid, request: &Resources) -> SchedResult<()>;

    // --- Two-tier VDC quota ---

    async fn get_project_vdc_quota(
        &self,
        project_id: Uuid,
        vdc_id: Uuid,
    ) -> SchedResult<Option<ProjectVdcQuota>>;

    async fn upsert_project_vdc_quota(&self, quota: &ProjectVdcQuota) -> SchedResult<()>;

    /// Atomically reserve against both the VDC and the project's
    /// allocation within it. Either both counters move or neither does.
    async fn try_reserve_vdc_quota(
        &self,
        project_id: Uuid,
        vdc_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<bool>;

    /// Release both tiers, saturating at zero.
    async fn release_vdc_quota(
        &self,
        project_id: Uuid,
        vdc_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<()>;

    // --- Linked runs ---

    async fn get_run(&self, id: Uuid) -> SchedResult<Option<Run>>;
    async fn upsert_run(&self, run: &Run) -> SchedResult<()>;
}
