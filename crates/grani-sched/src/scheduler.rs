//! The scheduler orchestrator.
//!
//! Drives each job through the lifecycle state machine:
//! enqueue → policy-select → quota-reserve → backend-submit →
//! reconcile → release. The orchestrator holds no global locks; each
//! dispatch acquires its own short store transactions, and rollback of
//! a reservation happens on every later-stage failure.

use std::sync::Arc;
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use grani_exec::{Driver, ExecError, KubernetesDriver, SlurmDriver};
use grani_types::{
    Cluster, ExecutorKind, Job, JobFilter, JobId, JobQueue, JobStatus, Resources, RunState,
    SelectionStrategy, parse_cpu, parse_gpu, parse_memory,
};

use crate::config::{QuotaProviderKind, SchedulerConfig};
use crate::error::{DispatchOutcome, SchedError, SchedResult};
use crate::policy::{PolicyContext, SchedulingPolicy};
use crate::quota::{
    KubernetesQuotaProvider, LocalQuotaProvider, QuotaProvider, SlurmQuotaProvider,
    VdcQuotaManager,
};
use crate::selector;
use crate::store::StateStore;

/// The set of configured backend drivers.
///
/// Built once at process start; an unconfigured executor causes
/// submissions targeting it to fail synchronously.
#[derive(Default)]
pub struct DriverRegistry {
    kubernetes: Option<Arc<dyn Driver>>,
    slurm: Option<Arc<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kubernetes(mut self, driver: Arc<dyn Driver>) -> Self {
        self.kubernetes = Some(driver);
        self
    }

    pub fn with_slurm(mut self, driver: Arc<dyn Driver>) -> Self {
        self.slurm = Some(driver);
        self
    }

    pub fn is_configured(&self, kind: ExecutorKind) -> bool {
        match kind {
            ExecutorKind::Kubernetes => self.kubernetes.is_some(),
            ExecutorKind::Slurm => self.slurm.is_some(),
        }
    }

    pub fn get(&self, kind: ExecutorKind) -> SchedResult<Arc<dyn Driver>> {
        let driver = match kind {
            ExecutorKind::Kubernetes => &self.kubernetes,
            ExecutorKind::Slurm => &self.slurm,
        };
        driver
            .clone()
            .ok_or_else(|| SchedError::ExecutorUnavailable(kind.to_string()))
    }
}

/// The scheduler orchestrator.
pub struct Scheduler {
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) drivers: DriverRegistry,
    pub(crate) policy: SchedulingPolicy,
    pub(crate) quota: Arc<dyn QuotaProvider>,
    pub(crate) vdc_quota: Option<VdcQuotaManager>,
    pub(crate) config: SchedulerConfig,

    /// Consecutive status-read failures per running job.
    pub(crate) sync_failures: Mutex<rustc_hash::FxHashMap<JobId, u32>>,
}

impl Scheduler {
    /// Assemble a scheduler from already-constructed parts. This is
    /// the composition root; nothing here is process-global.
    pub fn new(
        store: Arc<dyn StateStore>,
        drivers: DriverRegistry,
        quota: Arc<dyn QuotaProvider>,
        config: SchedulerConfig,
    ) -> Self {
        let policy = SchedulingPolicy::from_name(
            config.policy,
            config.preemption_threshold,
            config.fair_share_target,
        );
        let vdc_quota = config
            .vdc_routing
            .then(|| VdcQuotaManager::new(store.clone()));

        tracing::info!(
            policy = ?config.policy,
            vdc_routing = config.vdc_routing,
            "scheduler initialized"
        );

        Self {
            store,
            drivers,
            policy,
            quota,
            vdc_quota,
            config,
            sync_failures: Mutex::new(rustc_hash::FxHashMap::default()),
        }
    }

    /// Build drivers and the quota provider from the configuration
    /// envelope, then assemble the scheduler.
    pub async fn from_config(
        config: SchedulerConfig,
        store: Arc<dyn StateStore>,
    ) -> SchedResult<Self> {
        let mut drivers = DriverRegistry::new();
        let mut kubernetes: Option<Arc<KubernetesDriver>> = None;
        let mut slurm: Option<Arc<SlurmDriver>> = None;

        if let Some(kube_config) = &config.kubernetes {
            let driver = Arc::new(KubernetesDriver::connect(kube_config.clone()).await?);
            kubernetes = Some(driver.clone());
            drivers = drivers.with_kubernetes(driver);
        }
        if let Some(slurm_config) = &config.slurm {
            let driver = Arc::new(SlurmDriver::connect(slurm_config.clone())?);
            slurm = Some(driver.clone());
            drivers = drivers.with_slurm(driver);
        }

        let quota: Arc<dyn QuotaProvider> = match config.quota_provider {
            QuotaProviderKind::Local => Arc::new(LocalQuotaProvider::new(store.clone())),
            QuotaProviderKind::Kubernetes => Arc::new(KubernetesQuotaProvider::new(
                kubernetes.ok_or_else(|| {
                    SchedError::Validation("kubernetes quota provider needs a kubernetes executor".into())
                })?,
            )),
            QuotaProviderKind::Slurm => Arc::new(SlurmQuotaProvider::new(
                slurm.ok_or_else(|| {
                    SchedError::Validation("slurm quota provider needs a slurm executor".into())
                })?,
                config.slurm_account_prefix.clone(),
            )),
        };

        Ok(Self::new(store, drivers, quota, config))
    }

    /// Access the underlying store (admin surface).
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    // --- Submission ---

    /// Admit and enqueue a job.
    ///
    /// Validation failures surface synchronously and persist nothing.
    /// On success the job is in `Queued` and will be considered on the
    /// next scheduling tick.
    pub async fn submit_job(&self, mut job: Job) -> SchedResult<Job> {
        if job.name.trim().is_empty() {
            return Err(SchedError::Validation("job name must not be empty".into()));
        }
        if job.status != JobStatus::Pending {
            return Err(SchedError::Validation(format!(
                "new jobs must be pending, got {}",
                job.status
            )));
        }
        if !self.drivers.is_configured(job.executor) {
            return Err(SchedError::ExecutorUnavailable(job.executor.to_string()));
        }

        if job.request.is_zero() {
            job.request = extract_request(&job)?;
        }
        grani_exec::validate::validate(&job)
            .map_err(|e| SchedError::Validation(e.to_string()))?;

        let mut queue = self.store.get_or_create_default_queue(job.project_id).await?;
        if !queue.enabled {
            return Err(SchedError::QueueDisabled(queue.id.to_string()));
        }

        job.queue_id = Some(queue.id);
        job.queue_position = Some(self.store.max_queue_position(queue.id).await? + 1);
        job.enqueued_at = Some(Utc::now());
        self.transition(&mut job, JobStatus::Queued)?;
        self.store.insert_job(&job).await?;

        queue.total_jobs += 1;
        queue.pending_jobs += 1;
        queue.updated_at = Utc::now();
        self.store.update_queue(&queue).await?;

        tracing::info!(
            job = %job.id,
            queue = %queue.id,
            position = ?job.queue_position,
            request = %job.request,
            "job enqueued"
        );
        Ok(job)
    }

    // --- Scheduling ---

    /// One scheduling pass over all enabled queues, highest priority
    /// first. Returns the number of jobs dispatched.
    pub async fn run_scheduling_tick(&self) -> SchedResult<usize> {
        let queues = self.store.list_enabled_queues().await?;
        let mut dispatched = 0;

        for queue in queues {
            match self.schedule_queue(&queue).await {
                Ok(count) => dispatched += count,
                Err(e) => {
                    // One queue's failure must not starve the others.
                    tracing::error!(queue = %queue.id, error = %e, "queue scheduling failed");
                }
            }
        }

        if dispatched > 0 {
            tracing::info!(dispatched, "scheduling tick complete");
        }
        Ok(dispatched)
    }

    async fn schedule_queue(&self, queue: &JobQueue) -> SchedResult<usize> {
        // Recompute counters from the job table; the denormalized
        // values are advisory.
        let mut queue = self.store.refresh_queue_stats(queue.id).await?;
        if !queue.has_capacity() {
            tracing::debug!(
                queue = %queue.id,
                running = queue.running_jobs,
                max = queue.max_concurrent_jobs,
                "queue at capacity"
            );
            return Ok(0);
        }

        let mut pending = self.store.list_jobs(&JobFilter::queued_in(queue.id)).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let running = self
            .store
            .list_jobs(
                &JobFilter {
                    queue_id: Some(queue.id),
                    ..Default::default()
                }
                .with_status([JobStatus::Running]),
            )
            .await?;
        let ctx = self.build_policy_context(&queue).await?;

        let mut dispatched = 0;
        while queue.has_capacity() {
            let Some(selected) = self.policy.select_next(&queue, &pending, &ctx) else {
                break;
            };
            let index = pending
                .iter()
                .position(|j| j.id == selected.id)
                .expect("selected job comes from the pending set");
            let mut job = pending.remove(index);

            match self.try_dispatch(&mut job).await {
                Ok(DispatchOutcome::Dispatched) => {
                    dispatched += 1;
                    queue.running_jobs += 1;
                    queue.pending_jobs = queue.pending_jobs.saturating_sub(1);
                    queue.updated_at = Utc::now();
                    self.store.update_queue(&queue).await?;
                }
                Ok(DispatchOutcome::Queued { .. }) => {
                    // Blocked on quota or placement. The policy may
                    // nominate a victim to free resources; the victim
                    // is cancelled through the normal path and the
                    // incoming job waits for the next cycle.
                    if let Some(victim) = self.policy.should_preempt(&running, &job) {
                        let victim_id = victim.id;
                        if let Err(e) = self.cancel_job(victim_id).await {
                            tracing::error!(victim = %victim_id, error = %e, "preemption cancel failed");
                        }
                    }
                }
                Ok(outcome) => {
                    // Failed permanently: the next candidate still gets
                    // its chance this tick.
                    tracing::debug!(job = %job.id, ?outcome, "dispatch attempt did not run");
                }
                Err(e) => {
                    tracing::error!(job = %job.id, error = %e, "dispatch error");
                }
            }
        }

        Ok(dispatched)
    }

    /// Attempt to dispatch one queued job: reserve quota, pick a
    /// cluster when VDC-routed, submit, persist `Running`.
    ///
    /// Every failure after reservation rolls the reservation back;
    /// quota counters never drift.
    pub async fn try_dispatch(&self, job: &mut Job) -> SchedResult<DispatchOutcome> {
        let vdc_routed = self.vdc_quota.is_some() && job.vdc_id.is_some();

        // 1. Reserve. The reserve call is the single authority; a
        //    false return leaves the job queued for the next tick.
        let reserved = if vdc_routed {
            let manager = self.vdc_quota.as_ref().expect("vdc_routed implies manager");
            manager.reserve(job).await?
        } else {
            self.quota
                .reserve(job.project_id, &job.request, job.job_type)
                .await?
        };
        if !reserved {
            return self.defer(job, "insufficient quota").await;
        }

        // 2. Cluster selection (VDC-routed jobs only).
        let mut chosen_cluster: Option<Cluster> = None;
        if vdc_routed {
            match self.select_cluster_for(job).await {
                Ok(Some(cluster)) => {
                    job.cluster_id = Some(cluster.id);
                    chosen_cluster = Some(cluster);
                }
                Ok(None) => {
                    self.rollback_reservation(job, vdc_routed).await;
                    return self.defer(job, "no suitable cluster").await;
                }
                Err(e) => {
                    self.rollback_reservation(job, vdc_routed).await;
                    return Err(e);
                }
            }
        }

        // 3. Submit to the backend.
        let driver = match self.drivers.get(job.executor) {
            Ok(driver) => driver,
            Err(e) => {
                self.rollback_reservation(job, vdc_routed).await;
                return Err(e);
            }
        };

        match driver.submit(job).await {
            Ok(external_id) => {
                // 4. Persist the running state. From here the
                //    reconciler owns the job's lifecycle.
                job.external_id = Some(external_id);
                job.error_message = None;
                self.transition(job, JobStatus::Running)?;

                if let Some(cluster) = &chosen_cluster {
                    self.store.reserve_cluster(cluster.id, &job.request).await?;
                }
                self.store.update_job(job).await?;

                tracing::info!(
                    job = %job.id,
                    external_id = job.external_id.as_deref().unwrap_or_default(),
                    cluster = ?job.cluster_id,
                    "job dispatched"
                );
                Ok(DispatchOutcome::Dispatched)
            }
            Err(e) if e.is_transient() => {
                self.rollback_reservation(job, vdc_routed).await;
                self.defer(job, &format!("backend unavailable: {e}")).await
            }
            Err(e) => {
                self.rollback_reservation(job, vdc_routed).await;
                self.fail_job(job, &format!("submission rejected: {e}")).await
            }
        }
    }

    /// Keep the job queued with the deferral reason recorded on it.
    async fn defer(&self, job: &mut Job, reason: &str) -> SchedResult<DispatchOutcome> {
        job.error_message = Some(reason.to_string());
        self.store.update_job(job).await?;
        tracing::debug!(job = %job.id, reason, "dispatch deferred");
        Ok(DispatchOutcome::Queued {
            reason: reason.to_string(),
        })
    }

    /// Transition the job to `Failed` with the backend's message.
    async fn fail_job(&self, job: &mut Job, message: &str) -> SchedResult<DispatchOutcome> {
        job.error_message = Some(message.to_string());
        self.transition(job, JobStatus::Failed)?;
        self.store.update_job(job).await?;
        self.propagate_run_state(job).await;

        tracing::warn!(job = %job.id, message, "job failed");
        Ok(DispatchOutcome::Failed {
            message: message.to_string(),
        })
    }

    async fn rollback_reservation(&self, job: &Job, vdc_routed: bool) {
        let result = if vdc_routed {
            match self.vdc_quota.as_ref() {
                Some(manager) => manager.release(job).await,
                None => Ok(()),
            }
        } else {
            self.quota
                .release(job.project_id, &job.request, job.job_type)
                .await
        };
        if let Err(e) = result {
            tracing::error!(job = %job.id, error = %e, "failed to roll back reservation");
        }
    }

    async fn select_cluster_for(&self, job: &Job) -> SchedResult<Option<Cluster>> {
        let vdc_id = job
            .vdc_id
            .ok_or_else(|| SchedError::Internal(format!("job {} has no vdc", job.id)))?;
        let strategy = match self.store.get_vdc(vdc_id).await? {
            Some(vdc) => vdc.selection_strategy,
            None => SelectionStrategy::default(),
        };

        let clusters = self.store.list_clusters(vdc_id).await?;

        // Per-user running counts, only for clusters that cap them.
        let mut user_running = rustc_hash::FxHashMap::default();
        for cluster in clusters.iter().filter(|c| c.max_jobs_per_user.is_some()) {
            let count = self
                .store
                .count_running_for_user(cluster.id, job.user_id)
                .await?;
            user_running.insert(cluster.id, count);
        }

        Ok(selector::select_cluster(job, &clusters, strategy, &user_running).cloned())
    }

    async fn build_policy_context(&self, queue: &JobQueue) -> SchedResult<PolicyContext> {
        let mut ctx = PolicyContext::empty();

        if matches!(self.policy, SchedulingPolicy::FairShare { .. }) {
            ctx.recent_usage = self.recent_usage_by_user(queue.project_id).await?;
        }
        if matches!(self.policy, SchedulingPolicy::Backfill { .. }) {
            ctx.available = self
                .quota
                .snapshot(queue.project_id)
                .await?
                .map(|snapshot| snapshot.available());
        }

        Ok(ctx)
    }

    /// Resource-hours (cpu-hours + gpu-hours) per user over the
    /// fair-share lookback window.
    async fn recent_usage_by_user(
        &self,
        project_id: Uuid,
    ) -> SchedResult<rustc_hash::FxHashMap<Uuid, f64>> {
        let lookback = chrono::Duration::from_std(self.config.fair_share_lookback)
            .map_err(|e| SchedError::Internal(e.to_string()))?;
        let horizon = Utc::now() - lookback;
        let now = Utc::now();

        let jobs = self
            .store
            .list_jobs(&JobFilter::default().with_project(project_id).with_status([
                JobStatus::Running,
                JobStatus::Succeeded,
                JobStatus::Failed,
                JobStatus::Cancelled,
                JobStatus::Timeout,
            ]))
            .await?;

        let mut usage: rustc_hash::FxHashMap<Uuid, f64> = rustc_hash::FxHashMap::default();
        for job in jobs {
            let Some(started) = job.started_at else { continue };
            let end = job.finished_at.unwrap_or(now);
            if end < horizon {
                continue;
            }
            let start = started.max(horizon);
            let hours = (end - start).num_seconds().max(0) as f64 / 3600.0;
            let resource_hours = (job.request.cpu + f64::from(job.request.gpu)) * hours;
            *usage.entry(job.user_id).or_default() += resource_hours;
        }
        Ok(usage)
    }

    // --- Cancellation ---

    /// Cancel a job from any non-terminal state.
    ///
    /// Running jobs are cancelled at the backend first; already-gone
    /// backend objects count as success. Cancelling a terminal job is
    /// a no-op — terminal states are never overwritten.
    pub async fn cancel_job(&self, job_id: JobId) -> SchedResult<Job> {
        let mut job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| SchedError::JobNotFound(job_id.to_string()))?;

        if job.is_terminal() {
            return Ok(job);
        }

        let was_running = job.status == JobStatus::Running;
        if was_running {
            let driver = self.drivers.get(job.executor)?;
            let external_id = job
                .external_id
                .clone()
                .ok_or_else(|| SchedError::Internal(format!("running job {job_id} has no handle")))?;
            match driver.cancel(&external_id).await {
                Ok(()) => {}
                Err(ExecError::NotFound(_)) => {
                    tracing::warn!(job = %job.id, "backend object already gone on cancel");
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.transition(&mut job, JobStatus::Cancelled)?;
        self.store.update_job(&job).await?;
        self.on_job_finished(&job, was_running).await;

        tracing::info!(job = %job.id, was_running, "job cancelled");
        Ok(job)
    }

    // --- Lifecycle plumbing shared with the reconciler ---

    /// Apply a lifecycle transition, stamping the timestamps the
    /// target state implies.
    pub(crate) fn transition(&self, job: &mut Job, next: JobStatus) -> SchedResult<()> {
        if !job.status.can_transition_to(next) {
            return Err(SchedError::InvalidTransition {
                from: job.status,
                to: next,
            });
        }
        job.status = next;
        if next == JobStatus::Running {
            job.started_at = Some(Utc::now());
        }
        if next.is_terminal() && job.finished_at.is_none() {
            job.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Completion hook: release everything a job held and propagate
    /// its outcome. Safe to call more than once — all releases
    /// saturate.
    pub(crate) async fn on_job_finished(&self, job: &Job, was_running: bool) {
        if was_running {
            let vdc_routed = self.vdc_quota.is_some() && job.vdc_id.is_some();
            self.rollback_reservation(job, vdc_routed).await;

            if let Some(cluster_id) = job.cluster_id {
                if let Err(e) = self.store.release_cluster(cluster_id, &job.request).await {
                    tracing::error!(job = %job.id, error = %e, "cluster release failed");
                }
            }
        }

        if let Some(queue_id) = job.queue_id {
            if let Err(e) = self.store.refresh_queue_stats(queue_id).await {
                tracing::error!(job = %job.id, error = %e, "queue stats refresh failed");
            }
        }

        self.propagate_run_state(job).await;
    }

    /// Push the job's outcome onto its linked experiment run, if any.
    pub(crate) async fn propagate_run_state(&self, job: &Job) {
        let Some(run_id) = job.run_id else { return };
        let Some(new_state) = RunState::from_job_status(job.status) else {
            return;
        };

        let run = match self.store.get_run(run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => {
                tracing::warn!(job = %job.id, %run_id, "linked run not found");
                return;
            }
            Err(e) => {
                tracing::error!(job = %job.id, error = %e, "linked run load failed");
                return;
            }
        };

        if run.state == new_state {
            return;
        }
        let mut run = run;
        let old_state = run.state;
        run.state = new_state;
        if new_state.is_terminal() && run.finished_at.is_none() {
            run.finished_at = Some(Utc::now());
        }
        if let Err(e) = self.store.upsert_run(&run).await {
            tracing::error!(job = %job.id, error = %e, "linked run update failed");
            return;
        }
        tracing::info!(job = %job.id, %run_id, ?old_state, ?new_state, "run state synced");
    }

    // --- Background loop ---

    /// Run the scheduling and reconcile loops until the task is
    /// aborted.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = self;
        tokio::spawn(async move {
            let mut schedule = tokio::time::interval(scheduler.config.scheduling_tick);
            let mut reconcile = tokio::time::interval(scheduler.config.reconcile_tick);

            loop {
                tokio::select! {
                    _ = schedule.tick() => {
                        if let Err(e) = scheduler.run_scheduling_tick().await {
                            tracing::error!(error = %e, "scheduling tick failed");
                        }
                    }
                    _ = reconcile.tick() => {
                        if let Err(e) = scheduler.run_reconcile_tick().await {
                            tracing::error!(error = %e, "reconcile tick failed");
                        }
                    }
                }
            }
        })
    }

    // --- Read surface ---

    pub async fn get_job(&self, job_id: JobId) -> SchedResult<Job> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| SchedError::JobNotFound(job_id.to_string()))
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> SchedResult<Vec<Job>> {
        self.store.list_jobs(filter).await
    }

    /// Fetch logs for a job from its backend.
    pub async fn job_logs(&self, job_id: JobId) -> SchedResult<String> {
        let job = self.get_job(job_id).await?;
        let external_id = job
            .external_id
            .ok_or_else(|| SchedError::Validation(format!("job {job_id} was never dispatched")))?;
        let driver = self.drivers.get(job.executor)?;
        Ok(driver.logs(&external_id).await?)
    }

    /// Fetch backend metrics for a job.
    pub async fn job_metrics(&self, job_id: JobId) -> SchedResult<grani_exec::JobMetrics> {
        let job = self.get_job(job_id).await?;
        let external_id = job
            .external_id
            .ok_or_else(|| SchedError::Validation(format!("job {job_id} was never dispatched")))?;
        let driver = self.drivers.get(job.executor)?;
        Ok(driver.metrics(&external_id).await?)
    }
}

/// Resolve a job's resource request from its backend configuration
/// when no explicit request was supplied.
pub(crate) fn extract_request(job: &Job) -> SchedResult<Resources> {
    let config = &job.executor_config;

    match job.executor {
        ExecutorKind::Kubernetes => {
            let requests = config
                .pointer("/resources/requests")
                .unwrap_or(&serde_json::Value::Null);
            let get = |key: &str| requests.get(key).and_then(|v| v.as_str());

            let cpu = get("cpu").map(parse_cpu).transpose()?.unwrap_or(1.0);
            let memory = get("memory").map(parse_memory).transpose()?.unwrap_or(2.0);
            let gpu = get("nvidia.com/gpu")
                .map(parse_gpu)
                .transpose()?
                .unwrap_or(0);
            Ok(Resources::new(cpu, memory, gpu))
        }
        ExecutorKind::Slurm => {
            let nodes = config.get("nodes").and_then(|v| v.as_u64()).unwrap_or(1);
            let cpus_per_task = config
                .get("cpus_per_task")
                .and_then(|v| v.as_u64())
                .unwrap_or(1);
            let tasks_per_node = config
                .get("ntasks_per_node")
                .and_then(|v| v.as_u64())
                .unwrap_or(1);
            let cpu = (nodes * tasks_per_node * cpus_per_task) as f64;

            let memory = match config.get("mem").and_then(|v| v.as_str()) {
                Some(mem) => {
                    let mib = grani_exec::slurm::spec::parse_memory_mib(mem)
                        .map_err(|e| SchedError::Validation(e.to_string()))?;
                    (mib * nodes) as f64 / 1024.0
                }
                None => 2.0,
            };

            let gpus_per_node = config
                .get("gpus_per_node")
                .or_else(|| config.get("gpus"))
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            let gpu = (gpus_per_node * nodes) as u32;

            Ok(Resources::new(cpu, memory, gpu))
        }
    }
}
