//! Quota providers: admission accounting against local counters,
//! Kubernetes ResourceQuota, or Slurm account associations.

mod kubernetes;
mod local;
mod slurm;
mod vdc;

pub use kubernetes::KubernetesQuotaProvider;
pub use local::LocalQuotaProvider;
pub use slurm::SlurmQuotaProvider;
pub use vdc::VdcQuotaManager;

use async_trait::async_trait;
use uuid::Uuid;

use grani_types::{JobType, Resources};

use crate::error::SchedResult;

/// A point-in-time projection of a project's quota.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaSnapshot {
    pub limits: Resources,
    pub used: Resources,
}

impl QuotaSnapshot {
    /// Remaining resources.
    pub fn available(&self) -> Resources {
        self.limits.saturating_sub(&self.used)
    }

    /// Whether a request fits the remaining capacity.
    pub fn has_capacity(&self, request: &Resources) -> bool {
        self.used.add(request).fits(&self.limits)
    }
}

/// Admission and accounting interface over a quota backend.
///
/// `check` is a read-only projection the orchestrator uses to
/// short-circuit selection; `reserve` is the single authority and must
/// be atomic — a true return means the counters moved, a false return
/// means nothing changed. Callers must not assume a passing `check`
/// implies `reserve` will succeed.
#[async_trait]
pub trait QuotaProvider: Send + Sync {
    /// Current limits and usage, or `None` when the backend has no
    /// quota for the project.
    async fn snapshot(&self, project_id: Uuid) -> SchedResult<Option<QuotaSnapshot>>;

    /// Read-only admission check.
    async fn check(
        &self,
        project_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<bool>;

    /// Atomically reserve resources; false means insufficient quota
    /// and no partial reservation.
    async fn reserve(
        &self,
        project_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<bool>;

    /// Release a reservation. Releasing more than is held saturates at
    /// zero rather than going negative.
    async fn release(
        &self,
        project_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<()>;

    /// Synchronize internal state with the backing system.
    async fn sync(&self) -> SchedResult<()> {
        Ok(())
    }
}
