//! Two-tier quota accounting for VDC-routed jobs.

use std::sync::Arc;

use grani_types::Job;
use uuid::Uuid;

use crate::error::{SchedError, SchedResult};
use crate::store::StateStore;

/// Layers two checks for a VDC-routed job: VDC-level capacity and the
/// project's allocation within the VDC. Reservation mutates both
/// counters in a single store transaction; release saturates both.
pub struct VdcQuotaManager {
    store: Arc<dyn StateStore>,
}

impl VdcQuotaManager {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn route(job: &Job) -> SchedResult<Uuid> {
        job.vdc_id
            .ok_or_else(|| SchedError::Internal(format!("job {} has no vdc", job.id)))
    }

    /// Read-only check of the VDC tier.
    pub async fn check_vdc_quota(&self, job: &Job) -> SchedResult<bool> {
        let vdc_id = Self::route(job)?;
        let Some(vdc) = self.store.get_vdc(vdc_id).await? else {
            tracing::warn!(job = %job.id, %vdc_id, "vdc not found");
            return Ok(false);
        };
        if !vdc.enabled {
            tracing::warn!(job = %job.id, vdc = %vdc.name, "vdc is disabled");
            return Ok(false);
        }

        let clusters = self.store.list_clusters(vdc_id).await?;
        let available = vdc.available(&clusters);
        let fits = job.request.fits(&available);
        if !fits {
            tracing::debug!(
                job = %job.id, vdc = %vdc.name, request = %job.request, %available,
                "insufficient vdc quota"
            );
        }
        Ok(fits)
    }

    /// Read-only check of the project tier, including per-type caps.
    pub async fn check_project_quota(&self, job: &Job) -> SchedResult<bool> {
        let vdc_id = Self::route(job)?;
        let Some(quota) = self
            .store
            .get_project_vdc_quota(job.project_id, vdc_id)
            .await?
        else {
            tracing::warn!(job = %job.id, project = %job.project_id, "no allocation in vdc");
            return Ok(false);
        };

        Ok(quota.account.has_available_quota(&job.request)
            && quota.account.can_run_job_type(job.job_type))
    }

    /// Reserve both tiers atomically; false means neither moved.
    pub async fn reserve(&self, job: &Job) -> SchedResult<bool> {
        let vdc_id = Self::route(job)?;
        let reserved = self
            .store
            .try_reserve_vdc_quota(job.project_id, vdc_id, &job.request, job.job_type)
            .await?;
        if reserved {
            tracing::info!(job = %job.id, %vdc_id, request = %job.request, "reserved vdc quota");
        }
        Ok(reserved)
    }

    /// Release both tiers, saturating at zero.
    pub async fn release(&self, job: &Job) -> SchedResult<()> {
        let vdc_id = Self::route(job)?;
        self.store
            .release_vdc_quota(job.project_id, vdc_id, &job.request, job.job_type)
            .await?;
        tracing::info!(job = %job.id, %vdc_id, request = %job.request, "released vdc quota");
        Ok(())
    }
}
