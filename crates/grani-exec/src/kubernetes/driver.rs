//! Kubernetes driver: REST client over the cluster API server.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use grani_types::{Job, JobStatus, JobType};

use crate::driver::{Driver, JobMetrics};
use crate::error::{ExecError, ExecResult};
use crate::kubernetes::spec;
use crate::validate;

/// Path to the in-cluster service-account token.
const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Configuration for the Kubernetes driver.
#[derive(Debug, Clone)]
pub struct KubernetesConfig {
    /// Path to a kubeconfig file. When unset, in-cluster discovery via
    /// the service-account token is attempted.
    pub kubeconfig_path: Option<PathBuf>,

    /// Direct API server override (takes precedence over kubeconfig).
    pub api_server: Option<String>,

    /// Direct bearer token override.
    pub token: Option<String>,

    /// Namespace jobs are created in unless the job config overrides it.
    pub default_namespace: String,

    /// Service account assigned to job pods.
    pub default_service_account: String,

    /// Pull secrets attached to every pod spec.
    pub image_pull_secrets: Vec<String>,

    /// Skip TLS verification (self-signed cluster CAs).
    pub insecure_skip_tls_verify: bool,

    /// Timeout for status/log reads.
    pub read_timeout: Duration,

    /// Timeout for submits and cancels.
    pub submit_timeout: Duration,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            kubeconfig_path: None,
            api_server: None,
            token: None,
            default_namespace: "grani-jobs".to_string(),
            default_service_account: "default".to_string(),
            image_pull_secrets: Vec::new(),
            insecure_skip_tls_verify: false,
            read_timeout: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(30),
        }
    }
}

/// Minimal kubeconfig shape: enough to resolve the current context's
/// server and user token.
#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(rename = "current-context", default)]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: KubeconfigCluster,
}

#[derive(Debug, Deserialize)]
struct KubeconfigCluster {
    server: String,
    #[serde(rename = "insecure-skip-tls-verify", default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: KubeconfigUser,
}

#[derive(Debug, Default, Deserialize)]
struct KubeconfigUser {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: KubeconfigContext,
}

#[derive(Debug, Deserialize)]
struct KubeconfigContext {
    cluster: String,
    #[serde(default)]
    user: Option<String>,
}

/// Scriptable state backing mock mode.
struct MockState {
    counter: AtomicU64,
    statuses: Mutex<rustc_hash::FxHashMap<String, JobStatus>>,
}

/// Outcome of a create call.
enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Driver for Kubernetes clusters.
pub struct KubernetesDriver {
    config: KubernetesConfig,
    client: Client,
    base_url: String,
    mock: Option<MockState>,
}

impl KubernetesDriver {
    /// Connect to the API server resolved from the configuration.
    pub async fn connect(config: KubernetesConfig) -> ExecResult<Self> {
        let (server, token, skip_verify) = Self::resolve_auth(&config).await?;

        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        if let Some(token) = &token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| ExecError::Auth("token contains invalid header characters".into()))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(skip_verify || config.insecure_skip_tls_verify)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            config,
            client,
            base_url: server.trim_end_matches('/').to_string(),
            mock: None,
        })
    }

    /// Create a driver in mock mode (for tests): no cluster is
    /// contacted, submits hand out deterministic names, and statuses
    /// are scripted via [`KubernetesDriver::set_mock_status`].
    pub fn mock(config: KubernetesConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            base_url: String::new(),
            mock: Some(MockState {
                counter: AtomicU64::new(0),
                statuses: Mutex::new(rustc_hash::FxHashMap::default()),
            }),
        }
    }

    /// Script the status a mocked job reports.
    pub async fn set_mock_status(&self, external_id: &str, status: JobStatus) {
        if let Some(mock) = &self.mock {
            mock.statuses.lock().await.insert(external_id.to_string(), status);
        }
    }

    async fn resolve_auth(config: &KubernetesConfig) -> ExecResult<(String, Option<String>, bool)> {
        if let Some(server) = &config.api_server {
            return Ok((server.clone(), config.token.clone(), false));
        }

        if let Some(path) = &config.kubeconfig_path {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ExecError::Auth(format!("cannot read kubeconfig {}: {e}", path.display())))?;
            let kubeconfig: Kubeconfig = serde_yaml_ng::from_str(&text)
                .map_err(|e| ExecError::Auth(format!("malformed kubeconfig: {e}")))?;
            return Self::resolve_kubeconfig(&kubeconfig);
        }

        // In-cluster: service host/port from the environment, token from
        // the mounted service account.
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| ExecError::Auth("no kubeconfig and not running in-cluster".into()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
        let token = tokio::fs::read_to_string(SERVICE_ACCOUNT_TOKEN)
            .await
            .map_err(|e| ExecError::Auth(format!("cannot read service account token: {e}")))?;

        Ok((format!("https://{host}:{port}"), Some(token.trim().to_string()), true))
    }

    fn resolve_kubeconfig(kubeconfig: &Kubeconfig) -> ExecResult<(String, Option<String>, bool)> {
        let context_name = kubeconfig
            .current_context
            .as_deref()
            .or_else(|| kubeconfig.contexts.first().map(|c| c.name.as_str()))
            .ok_or_else(|| ExecError::Auth("kubeconfig has no contexts".into()))?;

        let context = kubeconfig
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .map(|c| &c.context)
            .ok_or_else(|| ExecError::Auth(format!("kubeconfig context '{context_name}' not found")))?;

        let cluster = kubeconfig
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| ExecError::Auth(format!("kubeconfig cluster '{}' not found", context.cluster)))?;

        let token = context.user.as_ref().and_then(|user_name| {
            kubeconfig
                .users
                .iter()
                .find(|u| &u.name == user_name)
                .and_then(|u| u.user.token.clone())
        });

        Ok((cluster.server.clone(), token, cluster.insecure_skip_tls_verify))
    }

    fn namespace(&self, job: &Job) -> String {
        job.executor_config
            .get("namespace")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.config.default_namespace.clone())
    }

    fn jobs_path(&self, namespace: &str) -> String {
        format!("{}/apis/batch/v1/namespaces/{namespace}/jobs", self.base_url)
    }

    fn deployments_path(&self, namespace: &str) -> String {
        format!("{}/apis/apps/v1/namespaces/{namespace}/deployments", self.base_url)
    }

    fn core_path(&self, namespace: &str, kind: &str) -> String {
        format!("{}/api/v1/namespaces/{namespace}/{kind}", self.base_url)
    }

    async fn create_object(&self, url: &str, body: &Value) -> ExecResult<CreateOutcome> {
        let response = self
            .client
            .post(url)
            .json(body)
            .timeout(self.config.submit_timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(CreateOutcome::Created);
        }
        if status == StatusCode::CONFLICT {
            // Already exists: the earlier submit won; idempotent success.
            return Ok(CreateOutcome::AlreadyExists);
        }

        let message = response.text().await.unwrap_or_default();
        Err(ExecError::from_status(status.as_u16(), message))
    }

    /// GET an object, mapping 404 to `None`.
    async fn read_object(&self, url: &str) -> ExecResult<Option<Value>> {
        let response = self
            .client
            .get(url)
            .timeout(self.config.read_timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExecError::from_status(status.as_u16(), message));
        }

        Ok(Some(response.json().await?))
    }

    /// DELETE an object with background propagation; `false` on 404.
    async fn delete_object(&self, url: &str) -> ExecResult<bool> {
        let response = self
            .client
            .delete(url)
            .json(&serde_json::json!({"propagationPolicy": "Background"}))
            .timeout(self.config.submit_timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExecError::from_status(status.as_u16(), message));
        }
        Ok(true)
    }

    fn parse_job_status(object: &Value) -> JobStatus {
        let status = &object["status"];
        let count = |key: &str| status.get(key).and_then(Value::as_i64).unwrap_or(0);

        if count("succeeded") > 0 {
            JobStatus::Succeeded
        } else if count("failed") > 0 {
            JobStatus::Failed
        } else if count("active") > 0 {
            JobStatus::Running
        } else {
            JobStatus::Pending
        }
    }

    fn parse_deployment_status(object: &Value) -> JobStatus {
        let ready = object
            .pointer("/status/readyReplicas")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let unavailable = object
            .pointer("/status/unavailableReplicas")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let desired = object
            .pointer("/spec/replicas")
            .and_then(Value::as_i64)
            .unwrap_or(0);

        if ready > 0 && ready == desired {
            JobStatus::Running
        } else if unavailable > 0 {
            JobStatus::Pending
        } else {
            JobStatus::Queued
        }
    }

    async fn submit_training(&self, job: &Job) -> ExecResult<String> {
        let namespace = self.namespace(job);
        let name = spec::generate_name(job);
        let object = spec::build_training_job(
            job,
            &self.config.default_service_account,
            &self.config.image_pull_secrets,
        );

        match self.create_object(&self.jobs_path(&namespace), &object).await? {
            CreateOutcome::Created => {
                tracing::info!(job = %job.id, name, namespace, "created kubernetes job");
            }
            CreateOutcome::AlreadyExists => {
                tracing::warn!(job = %job.id, name, "kubernetes job already exists");
            }
        }
        Ok(name)
    }

    async fn submit_inference(&self, job: &Job) -> ExecResult<String> {
        let namespace = self.namespace(job);
        let name = spec::generate_name(job);

        let deployment = spec::build_inference_deployment(job, &self.config.image_pull_secrets);
        self.create_object(&self.deployments_path(&namespace), &deployment)
            .await?;
        tracing::info!(job = %job.id, name, namespace, "created kubernetes deployment");

        if let Some(service) = spec::build_service(job, &name) {
            self.create_object(&self.core_path(&namespace, "services"), &service)
                .await?;
            tracing::info!(job = %job.id, name, "created kubernetes service");
        }

        Ok(name)
    }

    async fn submit_workflow(&self, job: &Job) -> ExecResult<String> {
        let namespace = self.namespace(job);
        let name = spec::generate_name(job);

        let configmap = spec::build_workflow_configmap(job, &name);
        self.create_object(&self.core_path(&namespace, "configmaps"), &configmap)
            .await?;

        let controller = spec::build_workflow_controller(job, &name);
        self.create_object(&self.jobs_path(&namespace), &controller)
            .await?;

        tracing::info!(job = %job.id, name, namespace, "created workflow controller");
        Ok(name)
    }

    /// Read a namespaced ResourceQuota object; `None` on 404.
    ///
    /// Used by the quota provider; mock mode reports no quota.
    pub async fn read_resource_quota(&self, name: &str) -> ExecResult<Option<Value>> {
        if self.mock.is_some() {
            return Ok(None);
        }
        let url = format!(
            "{}/{name}",
            self.core_path(&self.config.default_namespace, "resourcequotas")
        );
        self.read_object(&url).await
    }

    /// Provision a ResourceQuota with the given hard limits.
    pub async fn create_resource_quota(&self, object: &Value) -> ExecResult<()> {
        if self.mock.is_some() {
            return Ok(());
        }
        let url = self.core_path(&self.config.default_namespace, "resourcequotas");
        self.create_object(&url, object).await?;
        Ok(())
    }

    async fn read_pod_logs(&self, namespace: &str, external_id: &str) -> ExecResult<String> {
        // Job pods carry the job-name label; deployment pods carry app.
        let mut pods = self
            .list_pods(namespace, &format!("job-name={external_id}"))
            .await?;
        if pods.is_empty() {
            pods = self.list_pods(namespace, &format!("app={external_id}")).await?;
        }

        let Some(pod_name) = pods.first() else {
            return Ok("No pods found".to_string());
        };

        let url = format!(
            "{}/{pod_name}/log?tailLines=1000",
            self.core_path(namespace, "pods")
        );
        let response = self
            .client
            .get(&url)
            .timeout(self.config.read_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExecError::from_status(status.as_u16(), message));
        }
        Ok(response.text().await?)
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> ExecResult<Vec<String>> {
        let url = format!(
            "{}?labelSelector={}",
            self.core_path(namespace, "pods"),
            label_selector
        );
        let Some(list) = self.read_object(&url).await? else {
            return Ok(Vec::new());
        };

        Ok(list["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|p| p.pointer("/metadata/name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl Driver for KubernetesDriver {
    fn name(&self) -> &str {
        "kubernetes"
    }

    async fn submit(&self, job: &Job) -> ExecResult<String> {
        validate::validate(job)?;

        if let Some(mock) = &self.mock {
            mock.counter.fetch_add(1, Ordering::SeqCst);
            let name = spec::generate_name(job);
            mock.statuses
                .lock()
                .await
                .entry(name.clone())
                .or_insert(JobStatus::Running);
            return Ok(name);
        }

        match job.job_type {
            JobType::Training => self.submit_training(job).await,
            JobType::Inference => self.submit_inference(job).await,
            JobType::Workflow => self.submit_workflow(job).await,
        }
    }

    async fn status(&self, external_id: &str) -> ExecResult<JobStatus> {
        if let Some(mock) = &self.mock {
            return mock
                .statuses
                .lock()
                .await
                .get(external_id)
                .copied()
                .ok_or_else(|| ExecError::NotFound(external_id.to_string()));
        }

        let namespace = &self.config.default_namespace;

        let job_url = format!("{}/{external_id}", self.jobs_path(namespace));
        if let Some(object) = self.read_object(&job_url).await? {
            return Ok(Self::parse_job_status(&object));
        }

        let deployment_url = format!("{}/{external_id}", self.deployments_path(namespace));
        if let Some(object) = self.read_object(&deployment_url).await? {
            return Ok(Self::parse_deployment_status(&object));
        }

        Err(ExecError::NotFound(external_id.to_string()))
    }

    async fn cancel(&self, external_id: &str) -> ExecResult<()> {
        if let Some(mock) = &self.mock {
            mock.statuses
                .lock()
                .await
                .insert(external_id.to_string(), JobStatus::Cancelled);
            return Ok(());
        }

        let namespace = &self.config.default_namespace;

        let job_url = format!("{}/{external_id}", self.jobs_path(namespace));
        if self.delete_object(&job_url).await? {
            tracing::info!(external_id, "cancelled kubernetes job");
            return Ok(());
        }

        let deployment_url = format!("{}/{external_id}", self.deployments_path(namespace));
        if self.delete_object(&deployment_url).await? {
            tracing::info!(external_id, "cancelled kubernetes deployment");
            return Ok(());
        }

        Err(ExecError::NotFound(external_id.to_string()))
    }

    async fn logs(&self, external_id: &str) -> ExecResult<String> {
        if self.mock.is_some() {
            return Ok("No pods found".to_string());
        }
        self.read_pod_logs(&self.config.default_namespace, external_id)
            .await
    }

    async fn metrics(&self, external_id: &str) -> ExecResult<JobMetrics> {
        // Resource metrics need a metrics-server, which is not assumed.
        let mut metrics = JobMetrics::new();
        metrics.insert("external_id".into(), Value::String(external_id.to_string()));
        metrics.insert("metrics_available".into(), Value::Bool(false));
        Ok(metrics)
    }
}
