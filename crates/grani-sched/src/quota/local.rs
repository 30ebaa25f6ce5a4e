//! Quota provider backed by the scheduler's own store.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use grani_types::{JobType, Resources};

use crate::error::SchedResult;
use crate::quota::{QuotaProvider, QuotaSnapshot};
use crate::store::StateStore;

/// Local provider: project quotas live in the scheduler store, and
/// reserve/release are store transactions.
pub struct LocalQuotaProvider {
    store: Arc<dyn StateStore>,
}

impl LocalQuotaProvider {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl QuotaProvider for LocalQuotaProvider {
    async fn snapshot(&self, project_id: Uuid) -> SchedResult<Option<QuotaSnapshot>> {
        let quota = self.store.get_or_create_project_quota(project_id).await?;
        Ok(Some(QuotaSnapshot {
            limits: quota.account.limits,
            used: quota.account.used,
        }))
    }

    async fn check(
        &self,
        project_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<bool> {
        let quota = self.store.get_or_create_project_quota(project_id).await?;
        Ok(quota.account.has_available_quota(request) && quota.account.can_run_job_type(job_type))
    }

    async fn reserve(
        &self,
        project_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<bool> {
        let reserved = self
            .store
            .try_reserve_project_quota(project_id, request, job_type)
            .await?;
        if reserved {
            tracing::debug!(%project_id, %request, job_type = %job_type, "reserved project quota");
        }
        Ok(reserved)
    }

    async fn release(
        &self,
        project_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<()> {
        self.store
            .release_project_quota(project_id, request, job_type)
            .await?;
        tracing::debug!(%project_id, %request, job_type = %job_type, "released project quota");
        Ok(())
    }
}
