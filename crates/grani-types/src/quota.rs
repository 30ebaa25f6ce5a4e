//! Project quota entities.
//!
//! Two independent hierarchies share the same accounting shape: the
//! project-local [`ProjectQuota`] and the two-tier [`ProjectVdcQuota`]
//! (a project's allocation inside one VDC). Counter mutation lives on
//! the entities; the store wraps each mutation in a transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::JobType;
use crate::resources::Resources;

/// Optional per-job-type concurrency caps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTypeCaps {
    pub training: Option<u32>,
    pub inference: Option<u32>,
    pub workflow: Option<u32>,
}

impl JobTypeCaps {
    fn cap_for(&self, job_type: JobType) -> Option<u32> {
        match job_type {
            JobType::Training => self.training,
            JobType::Inference => self.inference,
            JobType::Workflow => self.workflow,
        }
    }
}

/// Per-job-type running counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTypeCounts {
    pub training: u32,
    pub inference: u32,
    pub workflow: u32,
}

impl JobTypeCounts {
    fn get(&self, job_type: JobType) -> u32 {
        match job_type {
            JobType::Training => self.training,
            JobType::Inference => self.inference,
            JobType::Workflow => self.workflow,
        }
    }

    fn slot_mut(&mut self, job_type: JobType) -> &mut u32 {
        match job_type {
            JobType::Training => &mut self.training,
            JobType::Inference => &mut self.inference,
            JobType::Workflow => &mut self.workflow,
        }
    }
}

/// Usage ratios in percent, for the admin surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageRatios {
    pub cpu: f64,
    pub memory: f64,
    pub gpu: f64,
    pub jobs: f64,
}

/// The accounting core shared by both quota entities: limits, used
/// counters, job caps, and per-type caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaAccount {
    /// Resource limits.
    pub limits: Resources,

    /// Maximum concurrently running jobs.
    pub max_concurrent_jobs: u32,

    /// Currently reserved resources.
    pub used: Resources,

    /// Currently running jobs.
    pub current_jobs: u32,

    #[serde(default)]
    pub type_caps: JobTypeCaps,

    #[serde(default)]
    pub type_counts: JobTypeCounts,

    /// When false, checks are bypassed but counters are still updated.
    pub enforce_quota: bool,
}

impl QuotaAccount {
    /// An account with the given limits and empty usage.
    pub fn with_limits(limits: Resources, max_concurrent_jobs: u32) -> Self {
        Self {
            limits,
            max_concurrent_jobs,
            used: Resources::zero(),
            current_jobs: 0,
            type_caps: JobTypeCaps::default(),
            type_counts: JobTypeCounts::default(),
            enforce_quota: true,
        }
    }

    /// Check resource and concurrency headroom for a request.
    pub fn has_available_quota(&self, request: &Resources) -> bool {
        if !self.enforce_quota {
            return true;
        }
        self.used.add(request).fits(&self.limits) && self.current_jobs < self.max_concurrent_jobs
    }

    /// Check the per-type concurrency cap.
    pub fn can_run_job_type(&self, job_type: JobType) -> bool {
        match self.type_caps.cap_for(job_type) {
            Some(cap) => self.type_counts.get(job_type) < cap,
            None => true,
        }
    }

    /// Reserve resources for one job.
    ///
    /// Returns false without mutating anything if the request does not
    /// fit. With `enforce_quota` off the checks are skipped but the
    /// counters still move, so accounting stays truthful.
    pub fn try_reserve(&mut self, request: &Resources, job_type: JobType) -> bool {
        if self.enforce_quota
            && !(self.has_available_quota(request) && self.can_run_job_type(job_type))
        {
            return false;
        }

        self.used = self.used.add(request);
        self.current_jobs += 1;
        *self.type_counts.slot_mut(job_type) += 1;
        true
    }

    /// Release one job's reservation, saturating every counter at zero
    /// so a duplicate release cannot drive the account negative.
    pub fn release(&mut self, request: &Resources, job_type: JobType) {
        self.used = self.used.saturating_sub(request);
        self.current_jobs = self.current_jobs.saturating_sub(1);
        let slot = self.type_counts.slot_mut(job_type);
        *slot = slot.saturating_sub(1);
    }

    /// Remaining resources.
    pub fn available(&self) -> Resources {
        self.limits.saturating_sub(&self.used)
    }

    /// Remaining job slots.
    pub fn jobs_available(&self) -> u32 {
        self.max_concurrent_jobs.saturating_sub(self.current_jobs)
    }

    /// Usage in percent per dimension.
    pub fn usage_percentage(&self) -> UsageRatios {
        fn pct(used: f64, limit: f64) -> f64 {
            if limit > 0.0 { used / limit * 100.0 } else { 0.0 }
        }
        UsageRatios {
            cpu: pct(self.used.cpu, self.limits.cpu),
            memory: pct(self.used.memory, self.limits.memory),
            gpu: pct(f64::from(self.used.gpu), f64::from(self.limits.gpu)),
            jobs: pct(
                f64::from(self.current_jobs),
                f64::from(self.max_concurrent_jobs),
            ),
        }
    }
}

/// Single-tier quota: a project's budget across the whole deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectQuota {
    pub id: Uuid,
    pub project_id: Uuid,

    #[serde(flatten)]
    pub account: QuotaAccount,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectQuota {
    /// Default quota provisioned on a project's first job.
    pub fn default_for_project(project_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            account: QuotaAccount::with_limits(Resources::new(100.0, 500.0, 10), 50),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Two-tier quota: a project's allocation within one VDC.
///
/// Unique per `(project_id, vdc_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectVdcQuota {
    pub id: Uuid,
    pub project_id: Uuid,
    pub vdc_id: Uuid,

    /// The project's priority within the VDC.
    pub priority: i64,

    #[serde(flatten)]
    pub account: QuotaAccount,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectVdcQuota {
    pub fn new(project_id: Uuid, vdc_id: Uuid, limits: Resources, max_concurrent_jobs: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            vdc_id,
            priority: 0,
            account: QuotaAccount::with_limits(limits, max_concurrent_jobs),
            created_at: now,
            updated_at: now,
        }
    }
}
