//! VDC (virtual data center) and cluster entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::ExecutorKind;
use crate::resources::Resources;

/// Named scheduling policy, as configured on a VDC.
///
/// This enum is the single source for the name→policy mapping; the
/// scheduler constructs the concrete policy (with its parameters)
/// from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyName {
    #[default]
    Fifo,
    Priority,
    Fairshare,
    Backfill,
}

/// Strategy for choosing a cluster within a VDC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Weighted resource-usage score, least loaded wins.
    #[default]
    LoadBalancing,
    /// Smallest leftover relative to the request wins.
    ResourceFit,
    /// Highest `priority × weight` wins.
    Priority,
    /// Preferred clusters first, falling back to load balancing.
    Affinity,
    /// Cheapest hourly cost wins, falling back to load balancing.
    CostOptimized,
}

/// Health of a cluster, as observed by heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Healthy,
    Degraded,
    Unavailable,
    Maintenance,
}

/// A concrete compute backend inside a VDC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: Uuid,
    pub vdc_id: Uuid,
    pub name: String,
    pub description: Option<String>,

    /// Backend platform this cluster runs.
    pub cluster_type: ExecutorKind,

    /// API endpoint (Kubernetes API server or Slurm REST URL).
    pub endpoint: Option<String>,

    /// Opaque connection configuration, consumed by the driver
    /// (kubeconfig reference, REST token, partition, account).
    #[serde(default)]
    pub config: serde_json::Value,

    /// Kubernetes namespace or Slurm partition.
    pub namespace: Option<String>,

    /// Total capacity.
    pub capacity: Resources,

    /// Advisory live usage, reconciled periodically from the job table.
    pub used: Resources,
    pub current_jobs: u32,

    pub status: ClusterStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub status_message: Option<String>,

    /// Disabled clusters accept no new jobs.
    pub enabled: bool,

    /// Selection priority (higher preferred by the priority strategy).
    pub priority: i64,

    /// Selection weight multiplier.
    pub weight: f64,

    /// Labels matched against a job's `required_labels`.
    #[serde(default)]
    pub labels: rustc_hash::FxHashMap<String, String>,

    pub max_jobs_per_user: Option<u32>,
    pub max_total_jobs: Option<u32>,

    /// Optional hourly costs for cost-optimized selection.
    pub cost_per_cpu_hour: Option<f64>,
    pub cost_per_memory_gib_hour: Option<f64>,
    pub cost_per_gpu_hour: Option<f64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    pub fn new(
        vdc_id: Uuid,
        name: impl Into<String>,
        cluster_type: ExecutorKind,
        capacity: Resources,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            vdc_id,
            name: name.into(),
            description: None,
            cluster_type,
            endpoint: None,
            config: serde_json::Value::Null,
            namespace: None,
            capacity,
            used: Resources::zero(),
            current_jobs: 0,
            status: ClusterStatus::Healthy,
            last_heartbeat: None,
            status_message: None,
            enabled: true,
            priority: 0,
            weight: 1.0,
            labels: rustc_hash::FxHashMap::default(),
            max_jobs_per_user: None,
            max_total_jobs: None,
            cost_per_cpu_hour: None,
            cost_per_memory_gib_hour: None,
            cost_per_gpu_hour: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Remaining capacity.
    pub fn available(&self) -> Resources {
        self.capacity.saturating_sub(&self.used)
    }

    /// Usage in percent per resource dimension.
    pub fn usage_percentage(&self) -> (f64, f64, f64) {
        fn pct(used: f64, total: f64) -> f64 {
            if total > 0.0 { used / total * 100.0 } else { 0.0 }
        }
        (
            pct(self.used.cpu, self.capacity.cpu),
            pct(self.used.memory, self.capacity.memory),
            pct(f64::from(self.used.gpu), f64::from(self.capacity.gpu)),
        )
    }

    /// Check capacity for a request.
    pub fn has_available_resources(&self, request: &Resources) -> bool {
        request.fits(&self.available())
    }

    /// Check whether this cluster accepts new jobs at all.
    pub fn can_accept_job(&self) -> bool {
        if !self.enabled || self.status != ClusterStatus::Healthy {
            return false;
        }
        match self.max_total_jobs {
            Some(cap) => self.current_jobs < cap,
            None => true,
        }
    }

    /// Check whether all required labels are carried by this cluster.
    pub fn labels_match(&self, required: &rustc_hash::FxHashMap<String, String>) -> bool {
        required
            .iter()
            .all(|(key, value)| self.labels.get(key) == Some(value))
    }

    /// Account a dispatched job against the advisory usage counters.
    pub fn reserve(&mut self, request: &Resources) {
        self.used = self.used.add(request);
        self.current_jobs += 1;
    }

    /// Release a finished job from the advisory usage counters.
    pub fn release(&mut self, request: &Resources) {
        self.used = self.used.saturating_sub(request);
        self.current_jobs = self.current_jobs.saturating_sub(1);
    }
}

/// A resource pool aggregating one or more clusters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vdc {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,

    /// Optional override quota; when absent the effective quota is the
    /// sum of enabled cluster capacities.
    pub quota_override: Option<Resources>,

    pub used: Resources,
    pub current_jobs: u32,

    pub enabled: bool,

    /// Whether project quotas inside this VDC may oversubscribe it.
    pub allow_overcommit: bool,
    pub overcommit_ratio: f64,

    pub default_policy: PolicyName,
    pub selection_strategy: SelectionStrategy,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vdc {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            quota_override: None,
            used: Resources::zero(),
            current_jobs: 0,
            enabled: true,
            allow_overcommit: false,
            overcommit_ratio: 1.0,
            default_policy: PolicyName::default(),
            selection_strategy: SelectionStrategy::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The quota this VDC enforces: the override when set, otherwise
    /// the summed capacity of its enabled clusters.
    pub fn effective_quota(&self, clusters: &[Cluster]) -> Resources {
        if let Some(quota) = self.quota_override {
            return quota;
        }
        clusters
            .iter()
            .filter(|c| c.enabled)
            .fold(Resources::zero(), |acc, c| acc.add(&c.capacity))
    }

    /// Remaining capacity against the effective quota.
    pub fn available(&self, clusters: &[Cluster]) -> Resources {
        self.effective_quota(clusters).saturating_sub(&self.used)
    }

    /// Account a dispatched job.
    pub fn reserve(&mut self, request: &Resources) {
        self.used = self.used.add(request);
        self.current_jobs += 1;
    }

    /// Release a finished job, saturating at zero.
    pub fn release(&mut self, request: &Resources) {
        self.used = self.used.saturating_sub(request);
        self.current_jobs = self.current_jobs.saturating_sub(1);
    }
}
