//! Core entities and resource model for the Grani job scheduler.
//!
//! This crate holds the pure data layer shared by the backend drivers
//! and the scheduler orchestrator:
//!
//! - [`Resources`] and the backend unit parsers (Kubernetes `2000m` /
//!   `4Gi` quantities, Slurm TRES strings)
//! - [`Job`] and its lifecycle state machine ([`JobStatus`])
//! - [`JobQueue`], [`ProjectQuota`], [`ProjectVdcQuota`]
//! - [`Vdc`] and [`Cluster`] for multi-cluster routing
//! - [`RunState`] mapping for linked experiment runs
//!
//! Everything here is plain data with invariant helpers; persistence
//! and orchestration live in `grani-sched`.

pub mod job;
pub mod queue;
pub mod quota;
pub mod resources;
pub mod run;
pub mod vdc;

// Re-exports
pub use job::{ExecutorKind, Job, JobFilter, JobId, JobStatus, JobType};
pub use queue::JobQueue;
pub use quota::{JobTypeCaps, JobTypeCounts, ProjectQuota, ProjectVdcQuota, QuotaAccount, UsageRatios};
pub use resources::{
    ResourceError, Resources, format_cpu, format_memory, parse_cpu, parse_gpu, parse_memory,
    parse_tres,
};
pub use run::{Run, RunState};
pub use vdc::{Cluster, ClusterStatus, PolicyName, SelectionStrategy, Vdc};
