//! Hierarchical multi-tenant job scheduler.
//!
//! This crate is the control plane core: it admits jobs, holds them in
//! per-project queues, selects the next runnable job under a
//! configurable policy, reserves quota, routes VDC jobs onto a
//! concrete cluster, dispatches through a backend driver, and
//! reconciles backend status back into the authoritative store.
//!
//! # Lifecycle
//!
//! ```text
//! Pending ──enqueue──▶ Queued
//! Queued  ──select + reserve + submit──▶ Running
//! Queued  ──user cancel──▶ Cancelled
//! Running ──reconcile──▶ Succeeded | Failed | Timeout
//! Running ──user cancel / preempt──▶ Cancelled
//! ```
//!
//! Terminal states are absorbing and every reservation taken at
//! dispatch is released exactly once on terminal entry.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use grani_sched::{MemoryStore, Scheduler, SchedulerConfig};
//! use grani_exec::SlurmConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let config = SchedulerConfig::default().with_slurm(SlurmConfig {
//!         rest_api_url: "http://slurm-controller:6820".into(),
//!         credential: "svc:token".into(),
//!         ..Default::default()
//!     });
//!
//!     let scheduler = Arc::new(Scheduler::from_config(config, store).await?);
//!     let handle = scheduler.clone().start();
//!
//!     // submissions arrive via scheduler.submit_job(...)
//!     handle.await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod policy;
pub mod quota;
pub mod reconciler;
pub mod scheduler;
pub mod selector;
pub mod store;

// Re-exports
pub use config::{QuotaProviderKind, SchedulerConfig};
pub use error::{DispatchOutcome, SchedError, SchedResult};
pub use policy::{PolicyContext, SchedulingPolicy};
pub use quota::{
    KubernetesQuotaProvider, LocalQuotaProvider, QuotaProvider, QuotaSnapshot, SlurmQuotaProvider,
    VdcQuotaManager,
};
pub use scheduler::{DriverRegistry, Scheduler};
pub use selector::select_cluster;
pub use store::{MemoryStore, SqliteStore, StateStore};
