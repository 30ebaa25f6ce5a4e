//! Quota provider backed by Slurm account associations.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use grani_exec::SlurmDriver;
use grani_types::{JobType, Resources, parse_tres};

use crate::error::SchedResult;
use crate::quota::{QuotaProvider, QuotaSnapshot};

/// Slurm provider: limits come from the project account's GrpTRES
/// association. Slurm enforces them itself at submission time, so
/// reserve and release are no-ops; admission only verifies that the
/// account exists.
pub struct SlurmQuotaProvider {
    driver: Arc<SlurmDriver>,
    account_prefix: String,
}

impl SlurmQuotaProvider {
    pub fn new(driver: Arc<SlurmDriver>, account_prefix: impl Into<String>) -> Self {
        Self {
            driver,
            account_prefix: account_prefix.into(),
        }
    }

    fn account_name(&self, project_id: Uuid) -> String {
        format!("{}{project_id}", self.account_prefix)
    }
}

/// Pull the GrpTRES limits out of an account record.
fn parse_account_limits(account: &Value) -> Resources {
    account
        .get("grp_tres")
        .and_then(Value::as_str)
        .and_then(|tres| parse_tres(tres).ok())
        .unwrap_or_default()
}

#[async_trait]
impl QuotaProvider for SlurmQuotaProvider {
    async fn snapshot(&self, project_id: Uuid) -> SchedResult<Option<QuotaSnapshot>> {
        let account = self.account_name(project_id);
        match self.driver.get_account(&account).await {
            Ok(Some(record)) => Ok(Some(QuotaSnapshot {
                limits: parse_account_limits(&record),
                // Live usage would come from accounting queries; the
                // association limits are what admission needs.
                used: Resources::zero(),
            })),
            Ok(None) => Ok(None),
            Err(e) => {
                tracing::warn!(%project_id, account, error = %e, "failed to read slurm account");
                Ok(None)
            }
        }
    }

    async fn check(
        &self,
        project_id: Uuid,
        _request: &Resources,
        _job_type: JobType,
    ) -> SchedResult<bool> {
        // Enforcement is Slurm's; admission verifies the account exists.
        Ok(self.snapshot(project_id).await?.is_some())
    }

    async fn reserve(
        &self,
        _project_id: Uuid,
        _request: &Resources,
        _job_type: JobType,
    ) -> SchedResult<bool> {
        // Association limits are enforced by Slurm on submission.
        Ok(true)
    }

    async fn release(
        &self,
        _project_id: Uuid,
        _request: &Resources,
        _job_type: JobType,
    ) -> SchedResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grani_exec::SlurmConfig;
    use serde_json::json;

    #[test]
    fn test_parse_account_limits() {
        let account = json!({"name": "project-x", "grp_tres": "cpu=1000,mem=500G,gres/gpu=10"});
        let limits = parse_account_limits(&account);
        assert_eq!(limits, Resources::new(1000.0, 500.0, 10));

        assert_eq!(parse_account_limits(&json!({})), Resources::zero());
        assert_eq!(
            parse_account_limits(&json!({"grp_tres": ""})),
            Resources::zero()
        );
    }

    #[tokio::test]
    async fn test_missing_account_blocks_admission() {
        // Mock driver knows no accounts.
        let driver = Arc::new(SlurmDriver::mock(SlurmConfig::default()));
        let provider = SlurmQuotaProvider::new(driver, "project-");
        let project = Uuid::new_v4();

        assert!(provider.snapshot(project).await.unwrap().is_none());
        assert!(
            !provider
                .check(project, &Resources::new(1.0, 1.0, 0), JobType::Training)
                .await
                .unwrap()
        );
        // Reserve itself stays permissive; Slurm rejects at submit.
        assert!(
            provider
                .reserve(project, &Resources::new(1.0, 1.0, 0), JobType::Training)
                .await
                .unwrap()
        );
    }

    #[test]
    fn test_account_name() {
        let driver = Arc::new(SlurmDriver::mock(SlurmConfig::default()));
        let provider = SlurmQuotaProvider::new(driver, "project-");
        let id = Uuid::new_v4();
        assert_eq!(provider.account_name(id), format!("project-{id}"));
    }
}
