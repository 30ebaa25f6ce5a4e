//! Process-wide scheduler configuration.

use std::time::Duration;

use grani_exec::{KubernetesConfig, SlurmConfig};
use grani_types::PolicyName;

/// Which quota provider backs admission accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotaProviderKind {
    /// Counters in the scheduler's own store.
    #[default]
    Local,
    /// Kubernetes ResourceQuota objects.
    Kubernetes,
    /// Slurm account association limits.
    Slurm,
}

/// Configuration envelope loaded at process start.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between scheduling ticks.
    pub scheduling_tick: Duration,

    /// Interval between reconcile ticks.
    pub reconcile_tick: Duration,

    /// Default scheduling policy.
    pub policy: PolicyName,

    /// Priority gap required before the priority policy nominates a
    /// preemption victim.
    pub preemption_threshold: i64,

    /// Fair-share usage lookback window.
    pub fair_share_lookback: Duration,

    /// Fair-share target (resource-hours considered a full share).
    pub fair_share_target: f64,

    /// Which quota provider to construct.
    pub quota_provider: QuotaProviderKind,

    /// Account name prefix for the Slurm quota provider.
    pub slurm_account_prefix: String,

    /// Route jobs carrying a `vdc_id` through cluster selection.
    pub vdc_routing: bool,

    /// Consecutive status-read failures before a running job is marked
    /// failed by the reconciler.
    pub sync_failure_threshold: u32,

    /// Kubernetes connection settings; `None` leaves the executor
    /// unconfigured and submissions targeting it fail synchronously.
    pub kubernetes: Option<KubernetesConfig>,

    /// Slurm connection settings; `None` leaves the executor
    /// unconfigured.
    pub slurm: Option<SlurmConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduling_tick: Duration::from_secs(5),
            reconcile_tick: Duration::from_secs(15),
            policy: PolicyName::Fifo,
            preemption_threshold: 10,
            fair_share_lookback: Duration::from_secs(24 * 3600),
            fair_share_target: 1.0,
            quota_provider: QuotaProviderKind::Local,
            slurm_account_prefix: "project-".to_string(),
            vdc_routing: false,
            sync_failure_threshold: 5,
            kubernetes: None,
            slurm: None,
        }
    }
}

impl SchedulerConfig {
    /// Configuration with a Kubernetes executor.
    pub fn with_kubernetes(mut self, kubernetes: KubernetesConfig) -> Self {
        self.kubernetes = Some(kubernetes);
        self
    }

    /// Configuration with a Slurm executor.
    pub fn with_slurm(mut self, slurm: SlurmConfig) -> Self {
        self.slurm = Some(slurm);
        self
    }

    /// Set the default scheduling policy.
    pub fn with_policy(mut self, policy: PolicyName) -> Self {
        self.policy = policy;
        self
    }

    /// Enable VDC routing.
    pub fn with_vdc_routing(mut self) -> Self {
        self.vdc_routing = true;
        self
    }
}
