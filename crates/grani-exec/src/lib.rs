//! Backend drivers for the Grani job scheduler.
//!
//! A [`Driver`] presents one uniform surface over a compute backend:
//! submit a job, read its status, cancel it, fetch logs and metrics.
//! Two drivers are provided:
//!
//! - [`KubernetesDriver`] — talks to the cluster API server; training
//!   jobs become batch/v1 Jobs, inference jobs become Deployments
//!   (plus an optional Service), workflows become a ConfigMap and a
//!   controller Job.
//! - [`SlurmDriver`] — talks to slurmrestd (v0.0.40); jobs are
//!   submitted as sbatch documents with inline scripts.
//!
//! Both drivers carry a mock mode for tests: deterministic external
//! ids and scriptable statuses, no backend contact.

pub mod driver;
pub mod error;
pub mod kubernetes;
pub mod slurm;
pub mod validate;

// Re-exports
pub use driver::{Driver, JobMetrics};
pub use error::{ExecError, ExecResult};
pub use kubernetes::{KubernetesConfig, KubernetesDriver};
pub use slurm::{SlurmConfig, SlurmDriver};
