//! The reconciler: pulls backend status into the authoritative job
//! state.
//!
//! Runs periodically over all `Running` jobs. Status changes are
//! applied through the same transition checks as every other path, so
//! a job already in a terminal state is never overwritten — a late
//! backend report after a user cancel is a no-op.

use grani_types::{JobFilter, JobStatus};

use crate::error::SchedResult;
use crate::scheduler::Scheduler;

impl Scheduler {
    /// One reconcile pass over all running jobs. Returns how many jobs
    /// changed state.
    pub async fn run_reconcile_tick(&self) -> SchedResult<usize> {
        let jobs = self.store.list_jobs(&JobFilter::active()).await?;
        let mut updated = 0;

        for mut job in jobs {
            match self.reconcile_job(&mut job).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => {
                    // A persistence failure aborts only this job; the
                    // loop continues with the rest.
                    tracing::error!(job = %job.id, error = %e, "reconcile failed");
                }
            }
        }

        if updated > 0 {
            tracing::info!(updated, "reconcile tick complete");
        }
        Ok(updated)
    }

    /// Reconcile one running job against its backend. Returns whether
    /// persisted state changed.
    async fn reconcile_job(&self, job: &mut grani_types::Job) -> SchedResult<bool> {
        let Some(external_id) = job.external_id.clone() else {
            // A running job without a handle violates the dispatch
            // invariant; treat it like a failed status read so the
            // threshold eventually resolves it.
            tracing::warn!(job = %job.id, "running job has no external id");
            return self.record_sync_failure(job).await;
        };

        let driver = self.drivers.get(job.executor)?;
        let backend_status = match driver.status(&external_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(job = %job.id, external_id, error = %e, "status read failed");
                return self.record_sync_failure(job).await;
            }
        };
        self.clear_sync_failures(job.id);

        if backend_status == job.status || !backend_status.is_terminal() {
            // Pending/Queued reports from the backend never regress a
            // running job.
            return Ok(false);
        }

        let old_status = job.status;
        self.transition(job, backend_status)?;
        self.store.update_job(job).await?;
        self.on_job_finished(job, true).await;

        tracing::info!(
            job = %job.id,
            from = %old_status,
            to = %backend_status,
            "job state reconciled"
        );
        Ok(true)
    }

    /// Count a failed status read; after the configured threshold the
    /// job is marked failed and its resources are released.
    async fn record_sync_failure(&self, job: &mut grani_types::Job) -> SchedResult<bool> {
        let failures = {
            let mut counts = self
                .sync_failures
                .lock()
                .map_err(|e| crate::error::SchedError::Internal(e.to_string()))?;
            let entry = counts.entry(job.id).or_insert(0);
            *entry += 1;
            *entry
        };

        if failures < self.config.sync_failure_threshold {
            return Ok(false);
        }

        tracing::error!(
            job = %job.id,
            failures,
            "status sync failure threshold reached, marking job failed"
        );
        job.error_message = Some("status-sync failed".to_string());
        self.transition(job, JobStatus::Failed)?;
        self.store.update_job(job).await?;
        self.on_job_finished(job, true).await;
        self.clear_sync_failures(job.id);
        Ok(true)
    }

    fn clear_sync_failures(&self, job_id: grani_types::JobId) {
        if let Ok(mut counts) = self.sync_failures.lock() {
            counts.remove(&job_id);
        }
    }
}
