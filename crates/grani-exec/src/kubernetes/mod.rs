//! Kubernetes backend integration.

mod driver;
pub mod spec;

pub use driver::{KubernetesConfig, KubernetesDriver};
