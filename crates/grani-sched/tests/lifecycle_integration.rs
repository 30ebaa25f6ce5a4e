//! End-to-end lifecycle tests over the in-memory store and mock
//! drivers: dispatch, quota blocking, completion release, cancel
//! races, VDC cluster selection, preemption, and status-sync failure.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use grani_exec::{
    Driver, ExecError, ExecResult, JobMetrics, KubernetesConfig, KubernetesDriver, SlurmConfig,
    SlurmDriver,
};
use grani_sched::{
    DispatchOutcome, DriverRegistry, LocalQuotaProvider, MemoryStore, QuotaProvider, SchedError,
    Scheduler, SchedulerConfig, SqliteStore, StateStore,
};
use grani_types::{
    Cluster, ClusterStatus, ExecutorKind, Job, JobStatus, JobType, PolicyName, ProjectQuota,
    ProjectVdcQuota, Resources, Run, RunState, SelectionStrategy, Vdc,
};

struct Harness {
    scheduler: Scheduler,
    store: Arc<MemoryStore>,
    kubernetes: Arc<KubernetesDriver>,
}

fn harness_with(config: SchedulerConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let kubernetes = Arc::new(KubernetesDriver::mock(KubernetesConfig::default()));
    let slurm = Arc::new(SlurmDriver::mock(SlurmConfig::default()));

    let drivers = DriverRegistry::new()
        .with_kubernetes(kubernetes.clone())
        .with_slurm(slurm);
    let quota: Arc<dyn QuotaProvider> = Arc::new(LocalQuotaProvider::new(store.clone()));

    Harness {
        scheduler: Scheduler::new(store.clone(), drivers, quota, config),
        store,
        kubernetes,
    }
}

fn harness() -> Harness {
    harness_with(SchedulerConfig::default())
}

async fn set_quota(store: &MemoryStore, project: Uuid, limits: Resources, max_jobs: u32) {
    let mut quota = ProjectQuota::default_for_project(project);
    quota.account.limits = limits;
    quota.account.max_concurrent_jobs = max_jobs;
    store.upsert_project_quota(&quota).await.unwrap();
}

fn training_job(project: Uuid, request: Resources) -> Job {
    Job::new(
        "train-model",
        JobType::Training,
        ExecutorKind::Kubernetes,
        project,
        Uuid::new_v4(),
        json!({"image": "pytorch/pytorch:2.1.0"}),
    )
    .with_request(request)
}

#[tokio::test]
async fn test_basic_dispatch() {
    let h = harness();
    let project = Uuid::new_v4();
    set_quota(&h.store, project, Resources::new(10.0, 20.0, 0), 5).await;

    let job = h
        .scheduler
        .submit_job(training_job(project, Resources::new(2.0, 4.0, 0)))
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert!(job.enqueued_at.is_some());
    assert_eq!(job.queue_position, Some(1));

    let dispatched = h.scheduler.run_scheduling_tick().await.unwrap();
    assert_eq!(dispatched, 1);

    let job = h.scheduler.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert!(job.external_id.is_some());
    assert!(job.started_at.is_some());

    let quota = h.store.get_or_create_project_quota(project).await.unwrap();
    assert_eq!(quota.account.used, Resources::new(2.0, 4.0, 0));
    assert_eq!(quota.account.current_jobs, 1);
}

#[tokio::test]
async fn test_quota_block_keeps_job_queued() {
    let h = harness();
    let project = Uuid::new_v4();
    set_quota(&h.store, project, Resources::new(10.0, 20.0, 0), 5).await;

    // Exhaust the quota with one job.
    let big = h
        .scheduler
        .submit_job(training_job(project, Resources::new(10.0, 20.0, 0)))
        .await
        .unwrap();
    h.scheduler.run_scheduling_tick().await.unwrap();
    assert_eq!(h.scheduler.get_job(big.id).await.unwrap().status, JobStatus::Running);

    let blocked = h
        .scheduler
        .submit_job(training_job(project, Resources::new(1.0, 1.0, 0)))
        .await
        .unwrap();

    // Stays queued across multiple ticks, with the reason recorded.
    for _ in 0..3 {
        h.scheduler.run_scheduling_tick().await.unwrap();
        let job = h.scheduler.get_job(blocked.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.error_message.as_deref(), Some("insufficient quota"));
    }

    let quota = h.store.get_or_create_project_quota(project).await.unwrap();
    assert_eq!(quota.account.used, Resources::new(10.0, 20.0, 0));
    assert_eq!(quota.account.current_jobs, 1);
}

#[tokio::test]
async fn test_release_on_completion_unblocks_successor() {
    let h = harness();
    let project = Uuid::new_v4();
    set_quota(&h.store, project, Resources::new(10.0, 20.0, 0), 5).await;

    let first = h
        .scheduler
        .submit_job(training_job(project, Resources::new(10.0, 20.0, 0)))
        .await
        .unwrap();
    h.scheduler.run_scheduling_tick().await.unwrap();

    let successor = h
        .scheduler
        .submit_job(training_job(project, Resources::new(2.0, 4.0, 0)))
        .await
        .unwrap();
    h.scheduler.run_scheduling_tick().await.unwrap();
    assert_eq!(
        h.scheduler.get_job(successor.id).await.unwrap().status,
        JobStatus::Queued
    );

    // Backend reports success; the reconcile tick releases the quota.
    let external_id = h.scheduler.get_job(first.id).await.unwrap().external_id.unwrap();
    h.kubernetes.set_mock_status(&external_id, JobStatus::Succeeded).await;

    let updated = h.scheduler.run_reconcile_tick().await.unwrap();
    assert_eq!(updated, 1);

    let first = h.scheduler.get_job(first.id).await.unwrap();
    assert_eq!(first.status, JobStatus::Succeeded);
    assert!(first.finished_at.is_some());

    let quota = h.store.get_or_create_project_quota(project).await.unwrap();
    assert_eq!(quota.account.used, Resources::zero());
    assert_eq!(quota.account.current_jobs, 0);

    // The queued successor dispatches on the following tick.
    h.scheduler.run_scheduling_tick().await.unwrap();
    assert_eq!(
        h.scheduler.get_job(successor.id).await.unwrap().status,
        JobStatus::Running
    );
}

#[tokio::test]
async fn test_cancel_running_is_not_overwritten_by_reconcile() {
    let h = harness();
    let project = Uuid::new_v4();
    set_quota(&h.store, project, Resources::new(10.0, 20.0, 0), 5).await;

    let job = h
        .scheduler
        .submit_job(training_job(project, Resources::new(2.0, 4.0, 0)))
        .await
        .unwrap();
    h.scheduler.run_scheduling_tick().await.unwrap();

    let cancelled = h.scheduler.cancel_job(job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.finished_at.is_some());

    let quota = h.store.get_or_create_project_quota(project).await.unwrap();
    assert_eq!(quota.account.used, Resources::zero());

    // A late backend report must not overwrite the terminal state.
    let external_id = cancelled.external_id.clone().unwrap();
    h.kubernetes.set_mock_status(&external_id, JobStatus::Succeeded).await;
    h.scheduler.run_reconcile_tick().await.unwrap();

    let job = h.scheduler.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);

    // Quota was not double-released.
    let quota = h.store.get_or_create_project_quota(project).await.unwrap();
    assert_eq!(quota.account.used, Resources::zero());
    assert_eq!(quota.account.current_jobs, 0);
}

#[tokio::test]
async fn test_cancel_queued_job_needs_no_driver() {
    let h = harness();
    let project = Uuid::new_v4();

    let job = h
        .scheduler
        .submit_job(training_job(project, Resources::new(1.0, 1.0, 0)))
        .await
        .unwrap();

    let cancelled = h.scheduler.cancel_job(job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.external_id.is_none());

    // Cancelling again is a no-op.
    let again = h.scheduler.cancel_job(job.id).await.unwrap();
    assert_eq!(again.status, JobStatus::Cancelled);
    assert_eq!(again.finished_at, cancelled.finished_at);
}

#[tokio::test]
async fn test_queue_concurrency_cap() {
    let h = harness();
    let project = Uuid::new_v4();
    set_quota(&h.store, project, Resources::new(100.0, 100.0, 0), 50).await;

    // Tighten the default queue to one concurrent job.
    let mut queue = h.store.get_or_create_default_queue(project).await.unwrap();
    queue.max_concurrent_jobs = 1;
    h.store.update_queue(&queue).await.unwrap();

    let first = h
        .scheduler
        .submit_job(training_job(project, Resources::new(1.0, 1.0, 0)))
        .await
        .unwrap();
    let second = h
        .scheduler
        .submit_job(training_job(project, Resources::new(1.0, 1.0, 0)))
        .await
        .unwrap();

    h.scheduler.run_scheduling_tick().await.unwrap();
    assert_eq!(h.scheduler.get_job(first.id).await.unwrap().status, JobStatus::Running);
    assert_eq!(h.scheduler.get_job(second.id).await.unwrap().status, JobStatus::Queued);

    // Finishing the first job frees the slot for the next tick.
    let external_id = h.scheduler.get_job(first.id).await.unwrap().external_id.unwrap();
    h.kubernetes.set_mock_status(&external_id, JobStatus::Succeeded).await;
    h.scheduler.run_reconcile_tick().await.unwrap();

    h.scheduler.run_scheduling_tick().await.unwrap();
    assert_eq!(h.scheduler.get_job(second.id).await.unwrap().status, JobStatus::Running);
}

#[tokio::test]
async fn test_fifo_order_within_tick() {
    let h = harness();
    let project = Uuid::new_v4();
    set_quota(&h.store, project, Resources::new(2.0, 2.0, 0), 50).await;

    // Only the first-submitted job fits the quota.
    let first = h
        .scheduler
        .submit_job(training_job(project, Resources::new(2.0, 2.0, 0)))
        .await
        .unwrap();
    let second = h
        .scheduler
        .submit_job(training_job(project, Resources::new(2.0, 2.0, 0)))
        .await
        .unwrap();
    assert!(first.queue_position < second.queue_position);

    h.scheduler.run_scheduling_tick().await.unwrap();
    assert_eq!(h.scheduler.get_job(first.id).await.unwrap().status, JobStatus::Running);
    assert_eq!(h.scheduler.get_job(second.id).await.unwrap().status, JobStatus::Queued);
}

#[tokio::test]
async fn test_unconfigured_executor_rejected_synchronously() {
    let store = Arc::new(MemoryStore::new());
    let kubernetes = Arc::new(KubernetesDriver::mock(KubernetesConfig::default()));
    let drivers = DriverRegistry::new().with_kubernetes(kubernetes);
    let quota: Arc<dyn QuotaProvider> = Arc::new(LocalQuotaProvider::new(store.clone()));
    let scheduler = Scheduler::new(store.clone(), drivers, quota, SchedulerConfig::default());

    let job = Job::new(
        "hpc-train",
        JobType::Training,
        ExecutorKind::Slurm,
        Uuid::new_v4(),
        Uuid::new_v4(),
        json!({"script": "srun python train.py"}),
    );
    assert!(matches!(
        scheduler.submit_job(job).await,
        Err(SchedError::ExecutorUnavailable(_))
    ));

    // Nothing was persisted.
    assert!(
        scheduler
            .list_jobs(&grani_types::JobFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_invalid_config_rejected_synchronously() {
    let h = harness();
    let job = Job::new(
        "bad",
        JobType::Training,
        ExecutorKind::Kubernetes,
        Uuid::new_v4(),
        Uuid::new_v4(),
        json!({}),
    );
    assert!(matches!(
        h.scheduler.submit_job(job).await,
        Err(SchedError::Validation(_))
    ));
}

#[tokio::test]
async fn test_run_state_propagation() {
    let h = harness();
    let project = Uuid::new_v4();
    let run_id = Uuid::new_v4();
    h.store
        .upsert_run(&Run {
            id: run_id,
            state: RunState::Running,
            finished_at: None,
        })
        .await
        .unwrap();

    let job = training_job(project, Resources::new(1.0, 1.0, 0)).with_run(run_id);
    let job = h.scheduler.submit_job(job).await.unwrap();
    h.scheduler.run_scheduling_tick().await.unwrap();

    let external_id = h.scheduler.get_job(job.id).await.unwrap().external_id.unwrap();
    h.kubernetes.set_mock_status(&external_id, JobStatus::Failed).await;
    h.scheduler.run_reconcile_tick().await.unwrap();

    let run = h.store.get_run(run_id).await.unwrap().unwrap();
    assert_eq!(run.state, RunState::Crashed);
    assert!(run.finished_at.is_some());
}

// --- VDC routing ---

struct VdcHarness {
    h: Harness,
    vdc: Vdc,
    project: Uuid,
}

async fn vdc_harness(strategy: SelectionStrategy) -> VdcHarness {
    let h = harness_with(SchedulerConfig::default().with_vdc_routing());

    let mut vdc = Vdc::new("vdc-a");
    vdc.selection_strategy = strategy;
    h.store.upsert_vdc(&vdc).await.unwrap();

    let project = Uuid::new_v4();
    h.store
        .upsert_project_vdc_quota(&ProjectVdcQuota::new(
            project,
            vdc.id,
            Resources::new(50.0, 100.0, 8),
            20,
        ))
        .await
        .unwrap();

    VdcHarness { h, vdc, project }
}

async fn add_cluster(store: &MemoryStore, vdc_id: Uuid, name: &str, usage_pct: f64) -> Cluster {
    let capacity = Resources::new(100.0, 100.0, 0);
    let mut cluster = Cluster::new(vdc_id, name, ExecutorKind::Kubernetes, capacity);
    cluster.used = capacity.scale(usage_pct / 100.0);
    store.upsert_cluster(&cluster).await.unwrap();
    cluster
}

#[tokio::test]
async fn test_vdc_load_balancing_picks_least_loaded() {
    let v = vdc_harness(SelectionStrategy::LoadBalancing).await;
    let _busy = add_cluster(&v.h.store, v.vdc.id, "c1", 80.0).await;
    let idle = add_cluster(&v.h.store, v.vdc.id, "c2", 20.0).await;

    let job = training_job(v.project, Resources::new(2.0, 4.0, 0)).with_vdc(v.vdc.id);
    let job = v.h.scheduler.submit_job(job).await.unwrap();
    v.h.scheduler.run_scheduling_tick().await.unwrap();

    let job = v.h.scheduler.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.cluster_id, Some(idle.id));

    // Both quota tiers and the cluster counters were charged.
    let vdc = v.h.store.get_vdc(v.vdc.id).await.unwrap().unwrap();
    assert_eq!(vdc.used, Resources::new(2.0, 4.0, 0));
    let cluster = v.h.store.get_cluster(idle.id).await.unwrap().unwrap();
    assert_eq!(cluster.used, Resources::new(22.0, 24.0, 0));
    assert_eq!(cluster.current_jobs, 1);
}

#[tokio::test]
async fn test_vdc_affinity_falls_back_when_preferred_unavailable() {
    let v = vdc_harness(SelectionStrategy::Affinity).await;

    let mut preferred = add_cluster(&v.h.store, v.vdc.id, "c3", 0.0).await;
    preferred.status = ClusterStatus::Unavailable;
    v.h.store.upsert_cluster(&preferred).await.unwrap();

    let _busy = add_cluster(&v.h.store, v.vdc.id, "c1", 70.0).await;
    let idle = add_cluster(&v.h.store, v.vdc.id, "c2", 10.0).await;

    let job = training_job(v.project, Resources::new(2.0, 4.0, 0))
        .with_vdc(v.vdc.id)
        .with_preferred_clusters([preferred.id]);
    let job = v.h.scheduler.submit_job(job).await.unwrap();
    v.h.scheduler.run_scheduling_tick().await.unwrap();

    let job = v.h.scheduler.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.cluster_id, Some(idle.id));
}

#[tokio::test]
async fn test_vdc_no_candidate_keeps_job_queued_and_releases_quota() {
    let v = vdc_harness(SelectionStrategy::LoadBalancing).await;
    // Only a Slurm cluster in a Kubernetes job's VDC: no candidates.
    let capacity = Resources::new(100.0, 100.0, 0);
    let cluster = Cluster::new(v.vdc.id, "slurm-only", ExecutorKind::Slurm, capacity);
    v.h.store.upsert_cluster(&cluster).await.unwrap();

    let job = training_job(v.project, Resources::new(2.0, 4.0, 0)).with_vdc(v.vdc.id);
    let job = v.h.scheduler.submit_job(job).await.unwrap();
    v.h.scheduler.run_scheduling_tick().await.unwrap();

    let job = v.h.scheduler.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.error_message.as_deref(), Some("no suitable cluster"));

    // The two-tier reservation was rolled back.
    let vdc = v.h.store.get_vdc(v.vdc.id).await.unwrap().unwrap();
    assert_eq!(vdc.used, Resources::zero());
    let allocation = v
        .h
        .store
        .get_project_vdc_quota(v.project, v.vdc.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(allocation.account.used, Resources::zero());
}

#[tokio::test]
async fn test_vdc_completion_releases_cluster_counters() {
    let v = vdc_harness(SelectionStrategy::LoadBalancing).await;
    let cluster = add_cluster(&v.h.store, v.vdc.id, "c1", 0.0).await;

    let job = training_job(v.project, Resources::new(2.0, 4.0, 0)).with_vdc(v.vdc.id);
    let job = v.h.scheduler.submit_job(job).await.unwrap();
    v.h.scheduler.run_scheduling_tick().await.unwrap();

    let external_id = v.h.scheduler.get_job(job.id).await.unwrap().external_id.unwrap();
    v.h.kubernetes.set_mock_status(&external_id, JobStatus::Succeeded).await;
    v.h.scheduler.run_reconcile_tick().await.unwrap();

    let vdc = v.h.store.get_vdc(v.vdc.id).await.unwrap().unwrap();
    assert_eq!(vdc.used, Resources::zero());
    assert_eq!(vdc.current_jobs, 0);
    let cluster = v.h.store.get_cluster(cluster.id).await.unwrap().unwrap();
    assert_eq!(cluster.used, Resources::zero());
    assert_eq!(cluster.current_jobs, 0);
}

// --- Preemption ---

#[tokio::test]
async fn test_priority_preemption_frees_quota_for_incoming() {
    let mut config = SchedulerConfig::default();
    config.policy = PolicyName::Priority;
    let h = harness_with(config);
    let project = Uuid::new_v4();
    set_quota(&h.store, project, Resources::new(1.0, 1.0, 0), 50).await;

    let victim = h
        .scheduler
        .submit_job(training_job(project, Resources::new(1.0, 1.0, 0)))
        .await
        .unwrap();
    h.scheduler.run_scheduling_tick().await.unwrap();
    assert_eq!(h.scheduler.get_job(victim.id).await.unwrap().status, JobStatus::Running);

    // Ten points over the victim meets the preemption threshold.
    let incoming = h
        .scheduler
        .submit_job(training_job(project, Resources::new(1.0, 1.0, 0)).with_priority(10))
        .await
        .unwrap();

    // First tick: incoming is blocked, victim is nominated and
    // cancelled; the incoming job defers to the next cycle.
    h.scheduler.run_scheduling_tick().await.unwrap();
    assert_eq!(
        h.scheduler.get_job(victim.id).await.unwrap().status,
        JobStatus::Cancelled
    );
    assert_eq!(
        h.scheduler.get_job(incoming.id).await.unwrap().status,
        JobStatus::Queued
    );

    // Next tick: the freed quota admits the incoming job.
    h.scheduler.run_scheduling_tick().await.unwrap();
    assert_eq!(
        h.scheduler.get_job(incoming.id).await.unwrap().status,
        JobStatus::Running
    );
}

// --- Reconciler failure handling ---

/// Driver whose status endpoint is permanently down.
struct DownstreamDownDriver;

#[async_trait]
impl Driver for DownstreamDownDriver {
    fn name(&self) -> &str {
        "down"
    }

    async fn submit(&self, _job: &Job) -> ExecResult<String> {
        Ok("ext-down-1".to_string())
    }

    async fn status(&self, _external_id: &str) -> ExecResult<JobStatus> {
        Err(ExecError::Transient("backend unreachable".to_string()))
    }

    async fn cancel(&self, _external_id: &str) -> ExecResult<()> {
        Ok(())
    }

    async fn logs(&self, _external_id: &str) -> ExecResult<String> {
        Ok(String::new())
    }

    async fn metrics(&self, _external_id: &str) -> ExecResult<JobMetrics> {
        Ok(JobMetrics::new())
    }
}

#[tokio::test]
async fn test_repeated_sync_failures_mark_job_failed() {
    let store = Arc::new(MemoryStore::new());
    let drivers = DriverRegistry::new().with_kubernetes(Arc::new(DownstreamDownDriver));
    let quota: Arc<dyn QuotaProvider> = Arc::new(LocalQuotaProvider::new(store.clone()));
    let scheduler = Scheduler::new(store.clone(), drivers, quota, SchedulerConfig::default());

    let project = Uuid::new_v4();
    let job = scheduler
        .submit_job(training_job(project, Resources::new(2.0, 4.0, 0)))
        .await
        .unwrap();
    scheduler.run_scheduling_tick().await.unwrap();

    // Four failed reads leave the job running.
    for _ in 0..4 {
        scheduler.run_reconcile_tick().await.unwrap();
        assert_eq!(scheduler.get_job(job.id).await.unwrap().status, JobStatus::Running);
    }

    // The fifth crosses the threshold.
    scheduler.run_reconcile_tick().await.unwrap();
    let job = scheduler.get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("status-sync failed"));
    assert!(job.finished_at.is_some());

    let quota = store.get_or_create_project_quota(project).await.unwrap();
    assert_eq!(quota.account.used, Resources::zero());
}

#[tokio::test]
async fn test_reconcile_of_terminal_jobs_is_a_no_op() {
    let h = harness();
    let project = Uuid::new_v4();

    let job = h
        .scheduler
        .submit_job(training_job(project, Resources::new(1.0, 1.0, 0)))
        .await
        .unwrap();
    h.scheduler.run_scheduling_tick().await.unwrap();

    let external_id = h.scheduler.get_job(job.id).await.unwrap().external_id.unwrap();
    h.kubernetes.set_mock_status(&external_id, JobStatus::Succeeded).await;
    h.scheduler.run_reconcile_tick().await.unwrap();

    let after_first = h.scheduler.get_job(job.id).await.unwrap();
    let quota_after_first = h.store.get_or_create_project_quota(project).await.unwrap();

    // Further reconcile passes change nothing.
    for _ in 0..3 {
        assert_eq!(h.scheduler.run_reconcile_tick().await.unwrap(), 0);
    }
    let after_more = h.scheduler.get_job(job.id).await.unwrap();
    assert_eq!(after_more.status, after_first.status);
    assert_eq!(after_more.finished_at, after_first.finished_at);

    let quota_after_more = h.store.get_or_create_project_quota(project).await.unwrap();
    assert_eq!(quota_after_more.account.used, quota_after_first.account.used);
}

// --- Dispatch outcome surface ---

#[tokio::test]
async fn test_try_dispatch_reports_queued_outcome() {
    let h = harness();
    let project = Uuid::new_v4();
    set_quota(&h.store, project, Resources::new(1.0, 1.0, 0), 50).await;

    let mut job = h
        .scheduler
        .submit_job(training_job(project, Resources::new(5.0, 5.0, 0)))
        .await
        .unwrap();

    let outcome = h.scheduler.try_dispatch(&mut job).await.unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Queued {
            reason: "insufficient quota".to_string()
        }
    );
    assert!(!outcome.is_dispatched());
}

// --- SQLite store smoke test ---

#[tokio::test]
async fn test_full_lifecycle_on_sqlite_store() {
    let store: Arc<dyn StateStore> = Arc::new(SqliteStore::in_memory().unwrap());
    let kubernetes = Arc::new(KubernetesDriver::mock(KubernetesConfig::default()));
    let drivers = DriverRegistry::new().with_kubernetes(kubernetes.clone());
    let quota: Arc<dyn QuotaProvider> = Arc::new(LocalQuotaProvider::new(store.clone()));
    let scheduler = Scheduler::new(store.clone(), drivers, quota, SchedulerConfig::default());

    let project = Uuid::new_v4();
    let job = scheduler
        .submit_job(training_job(project, Resources::new(2.0, 4.0, 0)))
        .await
        .unwrap();

    assert_eq!(scheduler.run_scheduling_tick().await.unwrap(), 1);
    let running = scheduler.get_job(job.id).await.unwrap();
    assert_eq!(running.status, JobStatus::Running);

    kubernetes
        .set_mock_status(running.external_id.as_deref().unwrap(), JobStatus::Succeeded)
        .await;
    assert_eq!(scheduler.run_reconcile_tick().await.unwrap(), 1);

    let done = scheduler.get_job(job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Succeeded);
    assert!(done.finished_at.is_some());

    let quota = store.get_or_create_project_quota(project).await.unwrap();
    assert_eq!(quota.account.used, Resources::zero());
}
