//! In-memory state store.
//!
//! One mutex serializes every operation, which gives the same
//! guarantee the SQLite store gets from its connection lock: reserve
//! and release run as indivisible transactions. This is the store the
//! test suites run against.

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use grani_types::{
    Cluster, Job, JobFilter, JobId, JobQueue, JobStatus, JobType, ProjectQuota, ProjectVdcQuota,
    Resources, Run, Vdc,
};

use crate::error::{SchedError, SchedResult};
use crate::store::StateStore;

#[derive(Default)]
struct Inner {
    jobs: rustc_hash::FxHashMap<JobId, Job>,
    queues: rustc_hash::FxHashMap<Uuid, JobQueue>,
    project_quotas: rustc_hash::FxHashMap<Uuid, ProjectQuota>,
    vdcs: rustc_hash::FxHashMap<Uuid, Vdc>,
    clusters: rustc_hash::FxHashMap<Uuid, Cluster>,
    project_vdc_quotas: rustc_hash::FxHashMap<(Uuid, Uuid), ProjectVdcQuota>,
    runs: rustc_hash::FxHashMap<Uuid, Run>,
}

/// In-memory [`StateStore`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SchedResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| SchedError::Store(e.to_string()))
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn insert_job(&self, job: &Job) -> SchedResult<()> {
        self.lock()?.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &Job) -> SchedResult<()> {
        let mut inner = self.lock()?;
        if !inner.jobs.contains_key(&job.id) {
            return Err(SchedError::JobNotFound(job.id.to_string()));
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> SchedResult<Option<Job>> {
        Ok(self.lock()?.jobs.get(&id).cloned())
    }

    async fn list_jobs(&self, filter: &JobFilter) -> SchedResult<Vec<Job>> {
        let inner = self.lock()?;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();

        // Stable ordering keeps selection deterministic across ticks.
        jobs.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    async fn max_queue_position(&self, queue_id: Uuid) -> SchedResult<i64> {
        let inner = self.lock()?;
        Ok(inner
            .jobs
            .values()
            .filter(|j| {
                j.queue_id == Some(queue_id)
                    && matches!(j.status, JobStatus::Pending | JobStatus::Queued)
            })
            .filter_map(|j| j.queue_position)
            .max()
            .unwrap_or(0))
    }

    async fn count_running_for_user(&self, cluster_id: Uuid, user_id: Uuid) -> SchedResult<u32> {
        let inner = self.lock()?;
        Ok(inner
            .jobs
            .values()
            .filter(|j| {
                j.cluster_id == Some(cluster_id)
                    && j.user_id == user_id
                    && j.status == JobStatus::Running
            })
            .count() as u32)
    }

    async fn get_queue(&self, id: Uuid) -> SchedResult<Option<JobQueue>> {
        Ok(self.lock()?.queues.get(&id).cloned())
    }

    async fn get_or_create_default_queue(&self, project_id: Uuid) -> SchedResult<JobQueue> {
        let mut inner = self.lock()?;

        let best_enabled = inner
            .queues
            .values()
            .filter(|q| q.project_id == project_id && q.enabled)
            .max_by_key(|q| (q.priority, q.id))
            .cloned();
        if let Some(queue) = best_enabled {
            return Ok(queue);
        }

        // All existing queues disabled: hand one back and let the
        // caller refuse the enqueue.
        let any = inner
            .queues
            .values()
            .filter(|q| q.project_id == project_id)
            .max_by_key(|q| (q.priority, q.id))
            .cloned();
        if let Some(queue) = any {
            return Ok(queue);
        }

        let queue = JobQueue::default_for_project(project_id);
        inner.queues.insert(queue.id, queue.clone());
        Ok(queue)
    }

    async fn update_queue(&self, queue: &JobQueue) -> SchedResult<()> {
        let mut inner = self.lock()?;
        if !inner.queues.contains_key(&queue.id) {
            return Err(SchedError::QueueNotFound(queue.id.to_string()));
        }
        inner.queues.insert(queue.id, queue.clone());
        Ok(())
    }

    async fn list_enabled_queues(&self) -> SchedResult<Vec<JobQueue>> {
        let inner = self.lock()?;
        let mut queues: Vec<JobQueue> = inner.queues.values().filter(|q| q.enabled).cloned().collect();
        queues.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(queues)
    }

    async fn refresh_queue_stats(&self, queue_id: Uuid) -> SchedResult<JobQueue> {
        let mut inner = self.lock()?;

        let (mut total, mut running, mut pending) = (0u32, 0u32, 0u32);
        for job in inner.jobs.values().filter(|j| j.queue_id == Some(queue_id)) {
            total += 1;
            match job.status {
                JobStatus::Running => running += 1,
                JobStatus::Pending | JobStatus::Queued => pending += 1,
                _ => {}
            }
        }

        let queue = inner
            .queues
            .get_mut(&queue_id)
            .ok_or_else(|| SchedError::QueueNotFound(queue_id.to_string()))?;
        queue.total_jobs = total;
        queue.running_jobs = running;
        queue.pending_jobs = pending;
        queue.updated_at = chrono::Utc::now();
        Ok(queue.clone())
    }

    async fn get_or_create_project_quota(&self, project_id: Uuid) -> SchedResult<ProjectQuota> {
        let mut inner = self.lock()?;
        if let Some(quota) = inner.project_quotas.get(&project_id) {
            return Ok(quota.clone());
        }
        let quota = ProjectQuota::default_for_project(project_id);
        inner.project_quotas.insert(project_id, quota.clone());
        Ok(quota)
    }

    async fn upsert_project_quota(&self, quota: &ProjectQuota) -> SchedResult<()> {
        self.lock()?
            .project_quotas
            .insert(quota.project_id, quota.clone());
        Ok(())
    }

    async fn try_reserve_project_quota(
        &self,
        project_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<bool> {
        let mut inner = self.lock()?;
        let quota = inner
            .project_quotas
            .entry(project_id)
            .or_insert_with(|| ProjectQuota::default_for_project(project_id));

        let reserved = quota.account.try_reserve(request, job_type);
        if reserved {
            quota.updated_at = chrono::Utc::now();
        }
        Ok(reserved)
    }

    async fn release_project_quota(
        &self,
        project_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<()> {
        let mut inner = self.lock()?;
        if let Some(quota) = inner.project_quotas.get_mut(&project_id) {
            quota.account.release(request, job_type);
            quota.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn get_vdc(&self, id: Uuid) -> SchedResult<Option<Vdc>> {
        Ok(self.lock()?.vdcs.get(&id).cloned())
    }

    async fn upsert_vdc(&self, vdc: &Vdc) -> SchedResult<()> {
        self.lock()?.vdcs.insert(vdc.id, vdc.clone());
        Ok(())
    }

    async fn get_cluster(&self, id: Uuid) -> SchedResult<Option<Cluster>> {
        Ok(self.lock()?.clusters.get(&id).cloned())
    }

    async fn upsert_cluster(&self, cluster: &Cluster) -> SchedResult<()> {
        self.lock()?.clusters.insert(cluster.id, cluster.clone());
        Ok(())
    }

    async fn list_clusters(&self, vdc_id: Uuid) -> SchedResult<Vec<Cluster>> {
        let inner = self.lock()?;
        let mut clusters: Vec<Cluster> = inner
            .clusters
            .values()
            .filter(|c| c.vdc_id == vdc_id)
            .cloned()
            .collect();
        clusters.sort_by_key(|c| c.id);
        Ok(clusters)
    }

    async fn reserve_cluster(&self, cluster_id: Uuid, request: &Resources) -> SchedResult<()> {
        let mut inner = self.lock()?;
        let cluster = inner
            .clusters
            .get_mut(&cluster_id)
            .ok_or_else(|| SchedError::Store(format!("cluster {cluster_id} not found")))?;
        cluster.reserve(request);
        cluster.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn release_cluster(&self, cluster_id: Uuid, request: &Resources) -> SchedResult<()> {
        let mut inner = self.lock()?;
        if let Some(cluster) = inner.clusters.get_mut(&cluster_id) {
            cluster.release(request);
            cluster.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn get_project_vdc_quota(
        &self,
        project_id: Uuid,
        vdc_id: Uuid,
    ) -> SchedResult<Option<ProjectVdcQuota>> {
        Ok(self
            .lock()?
            .project_vdc_quotas
            .get(&(project_id, vdc_id))
            .cloned())
    }

    async fn upsert_project_vdc_quota(&self, quota: &ProjectVdcQuota) -> SchedResult<()> {
        self.lock()?
            .project_vdc_quotas
            .insert((quota.project_id, quota.vdc_id), quota.clone());
        Ok(())
    }

    async fn try_reserve_vdc_quota(
        &self,
        project_id: Uuid,
        vdc_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<bool> {
        let mut inner = self.lock()?;

        // VDC-level headroom against the effective quota.
        let clusters: Vec<Cluster> = inner
            .clusters
            .values()
            .filter(|c| c.vdc_id == vdc_id)
            .cloned()
            .collect();
        let Some(vdc) = inner.vdcs.get(&vdc_id) else {
            return Ok(false);
        };
        if !vdc.enabled || !request.fits(&vdc.available(&clusters)) {
            return Ok(false);
        }

        // Project-level allocation inside the VDC. Reserve it first so
        // a per-type cap rejection leaves the VDC untouched.
        let Some(quota) = inner.project_vdc_quotas.get_mut(&(project_id, vdc_id)) else {
            tracing::warn!(%project_id, %vdc_id, "no project allocation in vdc");
            return Ok(false);
        };
        if !quota.account.try_reserve(request, job_type) {
            return Ok(false);
        }
        quota.updated_at = chrono::Utc::now();

        let vdc = inner.vdcs.get_mut(&vdc_id).expect("vdc checked above");
        vdc.reserve(request);
        vdc.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn release_vdc_quota(
        &self,
        project_id: Uuid,
        vdc_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<()> {
        let mut inner = self.lock()?;
        if let Some(vdc) = inner.vdcs.get_mut(&vdc_id) {
            vdc.release(request);
            vdc.updated_at = chrono::Utc::now();
        }
        if let Some(quota) = inner.project_vdc_quotas.get_mut(&(project_id, vdc_id)) {
            quota.account.release(request, job_type);
            quota.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> SchedResult<Option<Run>> {
        Ok(self.lock()?.runs.get(&id).cloned())
    }

    async fn upsert_run(&self, run: &Run) -> SchedResult<()> {
        self.lock()?.runs.insert(run.id, run.clone());
        Ok(())
    }
}
