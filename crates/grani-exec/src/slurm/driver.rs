//! Slurm driver: client for the Slurm REST API (v0.0.40).

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
use crate::slurm::spec::{self, SlurmDefaults};
use crate::validate;

/// REST API version prefix.
const API_PREFIX: &str = "/slurm/v0.0.40";

/// Configuration for the Slurm driver.
#[derive(Debug, Clone)]
pub struct SlurmConfig {
    /// Base URL of slurmrestd (e.g. `http://slurm-controller:6820`).
    pub rest_api_url: String,

    /// Credential in `user:token` form.
    pub credential: String,

    /// Partition used when the job config does not name one.
    pub default_partition: String,

    /// Account used when the job config does not name one.
    pub default_account: Option<String>,

    /// Directory job stdout is written to on the cluster; only used to
    /// produce log path hints.
    pub log_directory: String,

    pub read_timeout: Duration,
    pub submit_timeout: Duration,
}

impl Default for SlurmConfig {
    fn default() -> Self {
        Self {
            rest_api_url: "http://localhost:6820".to_string(),
            credential: String::new(),
            default_partition: "compute".to_string(),
            default_account: None,
            log_directory: "/var/log/slurm/jobs".to_string(),
            read_timeout: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    job_id: Option<u64>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct JobsResponse {
    #[serde(default)]
    jobs: Vec<Value>,
}

struct MockState {
    counter: AtomicU64,
    statuses: Mutex<rustc_hash::FxHashMap<String, JobStatus>>,
}

/// Driver for Slurm clusters over slurmrestd.
pub struct SlurmDriver {
    config: SlurmConfig,
    client: Client,
    base_url: String,
    defaults: SlurmDefaults,
    mock: Option<MockState>,
}

impl SlurmDriver {
    /// Build a driver from configuration. The credential is split into
    /// the user-name and token headers every request carries.
    pub fn connect(config: SlurmConfig) -> ExecResult<Self> {
        let (user, token) = match config.credential.split_once(':') {
            Some((user, token)) => (user.to_string(), token.to_string()),
            None if !config.credential.is_empty() => {
                ("grani".to_string(), config.credential.clone())
            }
            None => {
                return Err(ExecError::Auth("slurm credential is required".into()));
            }
        };

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::HeaderName::from_static("x-slurm-user-name"),
            header::HeaderValue::from_str(&user)
                .map_err(|_| ExecError::Auth("invalid slurm user name".into()))?,
        );
        headers.insert(
            header::HeaderName::from_static("x-slurm-user-token"),
            header::HeaderValue::from_str(&token)
                .map_err(|_| ExecError::Auth("invalid slurm token".into()))?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let defaults = SlurmDefaults {
            partition: config.default_partition.clone(),
            account: config.default_account.clone(),
        };
        let base_url = config.rest_api_url.trim_end_matches('/').to_string();

        Ok(Self {
            config,
            client,
            base_url,
            defaults,
            mock: None,
        })
    }

    /// Create a driver in mock mode (for tests): deterministic numeric
    /// job ids, scriptable statuses, no REST calls.
    pub fn mock(config: SlurmConfig) -> Self {
        let defaults = SlurmDefaults {
            partition: config.default_partition.clone(),
            account: config.default_account.clone(),
        };
        Self {
            config,
            client: Client::new(),
            base_url: String::new(),
            defaults,
            mock: Some(MockState {
                counter: AtomicU64::new(1000),
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

    fn job_url(&self, external_id: &str) -> String {
        format!("{}{API_PREFIX}/job/{external_id}", self.base_url)
    }

    /// Map a Slurm job state string onto the scheduler's lifecycle.
    fn map_state(state: &str) -> JobStatus {
        match state {
            "PENDING" => JobStatus::Pending,
            "CONFIGURING" => JobStatus::Queued,
            "RUNNING" | "COMPLETING" => JobStatus::Running,
            "COMPLETED" => JobStatus::Succeeded,
            "FAILED" | "NODE_FAIL" | "OUT_OF_MEMORY" => JobStatus::Failed,
            "CANCELLED" | "PREEMPTED" => JobStatus::Cancelled,
            "TIMEOUT" => JobStatus::Timeout,
            other => {
                tracing::warn!(state = other, "unknown slurm job state");
                JobStatus::Pending
            }
        }
    }

    /// v0.0.40 reports `job_state` as an array of state flags; older
    /// revisions used a bare string. Accept both.
    fn extract_state(record: &Value) -> Option<&str> {
        match record.get("job_state") {
            Some(Value::String(s)) => Some(s),
            Some(Value::Array(flags)) => flags.first().and_then(Value::as_str),
            _ => None,
        }
    }

    /// Read an account record (association limits); `None` when the
    /// account does not exist. Used by the quota provider; mock mode
    /// reports no account.
    pub async fn get_account(&self, account: &str) -> ExecResult<Option<Value>> {
        if self.mock.is_some() {
            return Ok(None);
        }

        let url = format!("{}{API_PREFIX}/accounts/{account}", self.base_url);
        let response = self
            .client
            .get(&url)
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

        let body: Value = response.json().await?;
        Ok(body
            .get("accounts")
            .and_then(Value::as_array)
            .and_then(|accounts| accounts.first())
            .cloned())
    }

    async fn submit_document(&self, job: &Job, doc: &Value) -> ExecResult<String> {
        let url = format!("{}{API_PREFIX}/job/submit", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(doc)
            .timeout(self.config.submit_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExecError::from_status(status.as_u16(), message));
        }

        let parsed: SubmitResponse = response.json().await?;
        match parsed.job_id {
            Some(job_id) => {
                tracing::info!(job = %job.id, slurm_job = job_id, "submitted slurm job");
                Ok(job_id.to_string())
            }
            None => Err(ExecError::Protocol(format!(
                "submit response carried no job_id: {:?}",
                parsed.errors
            ))),
        }
    }
}

#[async_trait]
impl Driver for SlurmDriver {
    fn name(&self) -> &str {
        "slurm"
    }

    async fn submit(&self, job: &Job) -> ExecResult<String> {
        validate::validate(job)?;

        if let Some(mock) = &self.mock {
            let id = mock.counter.fetch_add(1, Ordering::SeqCst).to_string();
            mock.statuses.lock().await.insert(id.clone(), JobStatus::Running);
            return Ok(id);
        }

        let doc = match job.job_type {
            JobType::Training => spec::build_training_doc(job, &self.defaults)?,
            JobType::Inference => spec::build_inference_doc(job, &self.defaults)?,
            JobType::Workflow => spec::build_workflow_doc(job, &self.defaults)?,
        };

        self.submit_document(job, &doc).await
    }

    async fn status(&self, external_id: &str) -> ExecResult<JobStatus> {
        if let Some(mock) = &self.mock {
            // Unknown ids read as Succeeded, mirroring Slurm's purge of
            // completed jobs from the live queue.
            return Ok(mock
                .statuses
                .lock()
                .await
                .get(external_id)
                .copied()
                .unwrap_or(JobStatus::Succeeded));
        }

        let response = self
            .client
            .get(self.job_url(external_id))
            .timeout(self.config.read_timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // Completed jobs are purged from the live queue.
            return Ok(JobStatus::Succeeded);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExecError::from_status(status.as_u16(), message));
        }

        let parsed: JobsResponse = response.json().await?;
        let Some(record) = parsed.jobs.first() else {
            return Ok(JobStatus::Succeeded);
        };

        Ok(Self::extract_state(record)
            .map(Self::map_state)
            .unwrap_or(JobStatus::Pending))
    }

    async fn cancel(&self, external_id: &str) -> ExecResult<()> {
        if let Some(mock) = &self.mock {
            mock.statuses
                .lock()
                .await
                .insert(external_id.to_string(), JobStatus::Cancelled);
            return Ok(());
        }

        let response = self
            .client
            .delete(self.job_url(external_id))
            .timeout(self.config.submit_timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::warn!(external_id, "slurm job already gone on cancel");
            return Ok(());
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExecError::from_status(status.as_u16(), message));
        }

        tracing::info!(external_id, "cancelled slurm job");
        Ok(())
    }

    async fn logs(&self, external_id: &str) -> ExecResult<String> {
        // slurmrestd does not stream log bodies; hand back the
        // deterministic path the batch script writes to.
        Ok(format!("{}/{external_id}.out", self.config.log_directory))
    }

    async fn metrics(&self, external_id: &str) -> ExecResult<JobMetrics> {
        let mut metrics = JobMetrics::new();
        metrics.insert("job_id".into(), Value::String(external_id.to_string()));

        if self.mock.is_some() {
            return Ok(metrics);
        }

        let response = self
            .client
            .get(self.job_url(external_id))
            .timeout(self.config.read_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(metrics);
        }

        let parsed: JobsResponse = response.json().await?;
        if let Some(record) = parsed.jobs.first() {
            for key in ["job_state", "elapsed_time", "nodes", "cpus", "partition"] {
                if let Some(value) = record.get(key) {
                    metrics.insert(key.to_string(), value.clone());
                }
            }
        }

        Ok(metrics)
    }
}
