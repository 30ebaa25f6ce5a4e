//! Quota provider backed by Kubernetes ResourceQuota objects.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use grani_exec::KubernetesDriver;
use grani_types::{JobType, Resources, format_cpu, format_memory, parse_cpu, parse_gpu, parse_memory};

use crate::error::SchedResult;
use crate::quota::{QuotaProvider, QuotaSnapshot};

/// Kubernetes provider: quota state lives in the cluster.
///
/// Reserve and release are no-ops — the API server accounts usage as
/// pods are admitted and terminated. Admission here is a read-only
/// capacity check against the quota projection.
pub struct KubernetesQuotaProvider {
    driver: Arc<KubernetesDriver>,
}

impl KubernetesQuotaProvider {
    pub fn new(driver: Arc<KubernetesDriver>) -> Self {
        Self { driver }
    }

    fn quota_name(project_id: Uuid) -> String {
        format!("project-{project_id}")
    }

    /// Provision a ResourceQuota for a project. Hard `limits.*` are set
    /// at twice the requests to leave burst headroom.
    pub async fn create_resource_quota(
        &self,
        project_id: Uuid,
        limits: &Resources,
    ) -> SchedResult<()> {
        let name = Self::quota_name(project_id);
        let object = json!({
            "apiVersion": "v1",
            "kind": "ResourceQuota",
            "metadata": {
                "name": name,
                "labels": {"project-id": project_id.to_string()},
            },
            "spec": {
                "hard": {
                    "requests.cpu": format_cpu(limits.cpu),
                    "requests.memory": format_memory(limits.memory),
                    "requests.nvidia.com/gpu": limits.gpu.to_string(),
                    "limits.cpu": format_cpu(limits.cpu * 2.0),
                    "limits.memory": format_memory(limits.memory * 2.0),
                }
            }
        });

        self.driver.create_resource_quota(&object).await?;
        tracing::info!(%project_id, "created kubernetes resource quota");
        Ok(())
    }
}

/// Parse the `requests.*` quantities of a quota block into resources.
/// Unparseable quantities read as zero rather than failing admission.
fn parse_quota_block(block: &Value) -> Resources {
    let get = |key: &str| block.get(key).and_then(Value::as_str).unwrap_or("0");

    Resources {
        cpu: parse_cpu(get("requests.cpu")).unwrap_or(0.0),
        memory: parse_memory(get("requests.memory")).unwrap_or(0.0),
        gpu: parse_gpu(get("requests.nvidia.com/gpu")).unwrap_or(0),
    }
}

/// Project a ResourceQuota object onto a quota snapshot.
fn parse_resource_quota(object: &Value) -> QuotaSnapshot {
    let hard = object.pointer("/spec/hard").unwrap_or(&Value::Null);
    let used = object.pointer("/status/used").unwrap_or(&Value::Null);

    QuotaSnapshot {
        limits: parse_quota_block(hard),
        used: parse_quota_block(used),
    }
}

#[async_trait]
impl QuotaProvider for KubernetesQuotaProvider {
    async fn snapshot(&self, project_id: Uuid) -> SchedResult<Option<QuotaSnapshot>> {
        let name = Self::quota_name(project_id);
        match self.driver.read_resource_quota(&name).await {
            Ok(Some(object)) => Ok(Some(parse_resource_quota(&object))),
            Ok(None) => Ok(None),
            Err(e) => {
                tracing::warn!(%project_id, error = %e, "failed to read kubernetes quota");
                Ok(None)
            }
        }
    }

    async fn check(
        &self,
        project_id: Uuid,
        request: &Resources,
        _job_type: JobType,
    ) -> SchedResult<bool> {
        // No quota object means the project is unconstrained.
        match self.snapshot(project_id).await? {
            Some(snapshot) => Ok(snapshot.has_capacity(request)),
            None => Ok(true),
        }
    }

    async fn reserve(
        &self,
        project_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<bool> {
        // The API server tracks usage when pods are admitted; this is
        // an availability check only.
        self.check(project_id, request, job_type).await
    }

    async fn release(
        &self,
        _project_id: Uuid,
        _request: &Resources,
        _job_type: JobType,
    ) -> SchedResult<()> {
        // Released automatically when pods terminate.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grani_exec::KubernetesConfig;

    #[test]
    fn test_parse_resource_quota() {
        let object = json!({
            "spec": {"hard": {
                "requests.cpu": "10",
                "requests.memory": "20Gi",
                "requests.nvidia.com/gpu": "2",
            }},
            "status": {"used": {
                "requests.cpu": "2500m",
                "requests.memory": "4096Mi",
                "requests.nvidia.com/gpu": "1",
            }},
        });

        let snapshot = parse_resource_quota(&object);
        assert_eq!(snapshot.limits, Resources::new(10.0, 20.0, 2));
        assert_eq!(snapshot.used, Resources::new(2.5, 4.0, 1));
    }

    #[test]
    fn test_parse_resource_quota_missing_fields() {
        let snapshot = parse_resource_quota(&json!({}));
        assert_eq!(snapshot.limits, Resources::zero());
        assert_eq!(snapshot.used, Resources::zero());
    }

    #[tokio::test]
    async fn test_no_quota_admits() {
        // Mock driver reports no quota object: admission is open.
        let driver = Arc::new(KubernetesDriver::mock(KubernetesConfig::default()));
        let provider = KubernetesQuotaProvider::new(driver);
        let project = Uuid::new_v4();

        assert!(provider.snapshot(project).await.unwrap().is_none());
        assert!(
            provider
                .check(project, &Resources::new(100.0, 100.0, 8), JobType::Training)
                .await
                .unwrap()
        );
        assert!(
            provider
                .reserve(project, &Resources::new(100.0, 100.0, 8), JobType::Training)
                .await
                .unwrap()
        );
    }
}
