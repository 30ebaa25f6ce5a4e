//! SQLite-backed state store for production use.
//!
//! Entities are stored as JSON documents alongside the columns the
//! hot queries filter on. One connection behind a mutex serializes
//! every transaction, which is the row-locking guarantee the quota
//! reserve path relies on.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use grani_types::{
    Cluster, Job, JobFilter, JobId, JobQueue, JobType, ProjectQuota, ProjectVdcQuota, Resources,
    Run, Vdc,
};

use crate::error::{SchedError, SchedResult};
use crate::store::StateStore;

/// SQLite-based [`StateStore`] implementation.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn new(path: impl AsRef<Path>) -> SchedResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (tests and ephemeral deployments).
    pub fn in_memory() -> SchedResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> SchedResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                queue_id TEXT,
                vdc_id TEXT,
                cluster_id TEXT,
                status TEXT NOT NULL,
                external_id TEXT,
                queue_position INTEGER,
                submitted_at TEXT NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_queue_status ON jobs(queue_id, status);
            CREATE INDEX IF NOT EXISTS idx_jobs_status_external ON jobs(status, external_id);
            CREATE INDEX IF NOT EXISTS idx_jobs_project ON jobs(project_id);

            CREATE TABLE IF NOT EXISTS job_queues (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                enabled INTEGER NOT NULL,
                priority INTEGER NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_queues_project ON job_queues(project_id);

            CREATE TABLE IF NOT EXISTS project_quotas (
                project_id TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS vdcs (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS clusters (
                id TEXT PRIMARY KEY,
                vdc_id TEXT NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_clusters_vdc ON clusters(vdc_id);

            CREATE TABLE IF NOT EXISTS project_vdc_quotas (
                project_id TEXT NOT NULL,
                vdc_id TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (project_id, vdc_id)
            );

            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> SchedResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| SchedError::Store(e.to_string()))
    }

    fn encode<T: Serialize>(value: &T) -> SchedResult<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode<T: DeserializeOwned>(data: &str) -> SchedResult<T> {
        Ok(serde_json::from_str(data)?)
    }

    fn write_job(conn: &Connection, job: &Job) -> SchedResult<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO jobs
                (id, project_id, user_id, queue_id, vdc_id, cluster_id, status,
                 external_id, queue_position, submitted_at, data)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                job.id.to_string(),
                job.project_id.to_string(),
                job.user_id.to_string(),
                job.queue_id.map(|id| id.to_string()),
                job.vdc_id.map(|id| id.to_string()),
                job.cluster_id.map(|id| id.to_string()),
                job.status.as_str(),
                job.external_id,
                job.queue_position,
                job.submitted_at.to_rfc3339(),
                Self::encode(job)?,
            ],
        )?;
        Ok(())
    }

    fn write_queue(conn: &Connection, queue: &JobQueue) -> SchedResult<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO job_queues (id, project_id, enabled, priority, data)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                queue.id.to_string(),
                queue.project_id.to_string(),
                queue.enabled,
                queue.priority,
                Self::encode(queue)?,
            ],
        )?;
        Ok(())
    }

    fn read_vdc(conn: &Connection, vdc_id: Uuid) -> SchedResult<Option<Vdc>> {
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM vdcs WHERE id = ?1",
                params![vdc_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        data.as_deref().map(Self::decode).transpose()
    }

    fn read_vdc_clusters(conn: &Connection, vdc_id: Uuid) -> SchedResult<Vec<Cluster>> {
        let mut stmt = conn.prepare("SELECT data FROM clusters WHERE vdc_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![vdc_id.to_string()], |row| row.get::<_, String>(0))?;

        let mut clusters = Vec::new();
        for data in rows {
            clusters.push(Self::decode(&data?)?);
        }
        Ok(clusters)
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn insert_job(&self, job: &Job) -> SchedResult<()> {
        let conn = self.lock()?;
        Self::write_job(&conn, job)
    }

    async fn update_job(&self, job: &Job) -> SchedResult<()> {
        let conn = self.lock()?;
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM jobs WHERE id = ?1",
                params![job.id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(SchedError::JobNotFound(job.id.to_string()));
        }
        Self::write_job(&conn, job)
    }

    async fn get_job(&self, id: JobId) -> SchedResult<Option<Job>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM jobs WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        data.as_deref().map(Self::decode).transpose()
    }

    async fn list_jobs(&self, filter: &JobFilter) -> SchedResult<Vec<Job>> {
        let conn = self.lock()?;

        // Narrow by the indexed columns, then apply the rest of the
        // filter on the decoded entities.
        let mut sql = String::from("SELECT data FROM jobs WHERE 1=1");
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(queue_id) = filter.queue_id {
            bound.push(Box::new(queue_id.to_string()));
            sql.push_str(&format!(" AND queue_id = ?{}", bound.len()));
        }
        if let Some(project_id) = filter.project_id {
            bound.push(Box::new(project_id.to_string()));
            sql.push_str(&format!(" AND project_id = ?{}", bound.len()));
        }
        if filter.active_only {
            sql.push_str(" AND status = 'running'");
        }
        if let Some(ref statuses) = filter.status {
            let placeholders: Vec<String> = statuses
                .iter()
                .map(|s| {
                    bound.push(Box::new(s.as_str().to_string()));
                    format!("?{}", bound.len())
                })
                .collect();
            sql.push_str(&format!(" AND status IN ({})", placeholders.join(", ")));
        }
        sql.push_str(" ORDER BY submitted_at, id");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(bound.iter().map(|p| p.as_ref())),
            |row| row.get::<_, String>(0),
        )?;

        let mut jobs = Vec::new();
        for data in rows {
            let job: Job = Self::decode(&data?)?;
            if filter.matches(&job) {
                jobs.push(job);
            }
        }
        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    async fn max_queue_position(&self, queue_id: Uuid) -> SchedResult<i64> {
        let conn = self.lock()?;
        let max: Option<i64> = conn.query_row(
            r#"
            SELECT MAX(queue_position) FROM jobs
            WHERE queue_id = ?1 AND status IN ('pending', 'queued')
            "#,
            params![queue_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }

    async fn count_running_for_user(&self, cluster_id: Uuid, user_id: Uuid) -> SchedResult<u32> {
        let conn = self.lock()?;
        let count: u32 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE cluster_id = ?1 AND user_id = ?2 AND status = 'running'
            "#,
            params![cluster_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    async fn get_queue(&self, id: Uuid) -> SchedResult<Option<JobQueue>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM job_queues WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        data.as_deref().map(Self::decode).transpose()
    }

    async fn get_or_create_default_queue(&self, project_id: Uuid) -> SchedResult<JobQueue> {
        let conn = self.lock()?;

        let data: Option<String> = conn
            .query_row(
                r#"
                SELECT data FROM job_queues
                WHERE project_id = ?1 AND enabled = 1
                ORDER BY priority DESC, id DESC
                LIMIT 1
                "#,
                params![project_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(data) = data {
            return Self::decode(&data);
        }

        // All existing queues disabled: hand one back and let the
        // caller refuse the enqueue.
        let data: Option<String> = conn
            .query_row(
                r#"
                SELECT data FROM job_queues
                WHERE project_id = ?1
                ORDER BY priority DESC, id DESC
                LIMIT 1
                "#,
                params![project_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(data) = data {
            return Self::decode(&data);
        }

        let queue = JobQueue::default_for_project(project_id);
        Self::write_queue(&conn, &queue)?;
        Ok(queue)
    }

    async fn update_queue(&self, queue: &JobQueue) -> SchedResult<()> {
        let conn = self.lock()?;
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM job_queues WHERE id = ?1",
                params![queue.id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(SchedError::QueueNotFound(queue.id.to_string()));
        }
        Self::write_queue(&conn, queue)
    }

    async fn list_enabled_queues(&self) -> SchedResult<Vec<JobQueue>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM job_queues WHERE enabled = 1 ORDER BY priority DESC, id",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut queues = Vec::new();
        for data in rows {
            queues.push(Self::decode(&data?)?);
        }
        Ok(queues)
    }

    async fn refresh_queue_stats(&self, queue_id: Uuid) -> SchedResult<JobQueue> {
        let conn = self.lock()?;

        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM job_queues WHERE id = ?1",
                params![queue_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let mut queue: JobQueue = data
            .as_deref()
            .map(Self::decode)
            .transpose()?
            .ok_or_else(|| SchedError::QueueNotFound(queue_id.to_string()))?;

        let (total, running, pending): (u32, u32, u32) = conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(status = 'running'), 0),
                COALESCE(SUM(status IN ('pending', 'queued')), 0)
            FROM jobs WHERE queue_id = ?1
            "#,
            params![queue_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        queue.total_jobs = total;
        queue.running_jobs = running;
        queue.pending_jobs = pending;
        queue.updated_at = chrono::Utc::now();
        Self::write_queue(&conn, &queue)?;
        Ok(queue)
    }

    async fn get_or_create_project_quota(&self, project_id: Uuid) -> SchedResult<ProjectQuota> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM project_quotas WHERE project_id = ?1",
                params![project_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(data) = data {
            return Self::decode(&data);
        }

        let quota = ProjectQuota::default_for_project(project_id);
        conn.execute(
            "INSERT INTO project_quotas (project_id, data) VALUES (?1, ?2)",
            params![project_id.to_string(), Self::encode(&quota)?],
        )?;
        Ok(quota)
    }

    async fn upsert_project_quota(&self, quota: &ProjectQuota) -> SchedResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO project_quotas (project_id, data) VALUES (?1, ?2)",
            params![quota.project_id.to_string(), Self::encode(quota)?],
        )?;
        Ok(())
    }

    async fn try_reserve_project_quota(
        &self,
        project_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let data: Option<String> = tx
            .query_row(
                "SELECT data FROM project_quotas WHERE project_id = ?1",
                params![project_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let mut quota: ProjectQuota = match data {
            Some(data) => Self::decode(&data)?,
            None => ProjectQuota::default_for_project(project_id),
        };

        let reserved = quota.account.try_reserve(request, job_type);
        if reserved {
            quota.updated_at = chrono::Utc::now();
        }
        // Write back even on a miss so first-use provisioning sticks.
        tx.execute(
            "INSERT OR REPLACE INTO project_quotas (project_id, data) VALUES (?1, ?2)",
            params![project_id.to_string(), Self::encode(&quota)?],
        )?;
        tx.commit()?;
        Ok(reserved)
    }

    async fn release_project_quota(
        &self,
        project_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let data: Option<String> = tx
            .query_row(
                "SELECT data FROM project_quotas WHERE project_id = ?1",
                params![project_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(data) = data {
            let mut quota: ProjectQuota = Self::decode(&data)?;
            quota.account.release(request, job_type);
            quota.updated_at = chrono::Utc::now();
            tx.execute(
                "UPDATE project_quotas SET data = ?2 WHERE project_id = ?1",
                params![project_id.to_string(), Self::encode(&quota)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn get_vdc(&self, id: Uuid) -> SchedResult<Option<Vdc>> {
        let conn = self.lock()?;
        Self::read_vdc(&conn, id)
    }

    async fn upsert_vdc(&self, vdc: &Vdc) -> SchedResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO vdcs (id, data) VALUES (?1, ?2)",
            params![vdc.id.to_string(), Self::encode(vdc)?],
        )?;
        Ok(())
    }

    async fn get_cluster(&self, id: Uuid) -> SchedResult<Option<Cluster>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM clusters WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        data.as_deref().map(Self::decode).transpose()
    }

    async fn upsert_cluster(&self, cluster: &Cluster) -> SchedResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO clusters (id, vdc_id, data) VALUES (?1, ?2, ?3)",
            params![
                cluster.id.to_string(),
                cluster.vdc_id.to_string(),
                Self::encode(cluster)?
            ],
        )?;
        Ok(())
    }

    async fn list_clusters(&self, vdc_id: Uuid) -> SchedResult<Vec<Cluster>> {
        let conn = self.lock()?;
        Self::read_vdc_clusters(&conn, vdc_id)
    }

    async fn reserve_cluster(&self, cluster_id: Uuid, request: &Resources) -> SchedResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let data: String = tx
            .query_row(
                "SELECT data FROM clusters WHERE id = ?1",
                params![cluster_id.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| SchedError::Store(format!("cluster {cluster_id} not found")))?;
        let mut cluster: Cluster = Self::decode(&data)?;
        cluster.reserve(request);
        cluster.updated_at = chrono::Utc::now();

        tx.execute(
            "UPDATE clusters SET data = ?2 WHERE id = ?1",
            params![cluster_id.to_string(), Self::encode(&cluster)?],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn release_cluster(&self, cluster_id: Uuid, request: &Resources) -> SchedResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let data: Option<String> = tx
            .query_row(
                "SELECT data FROM clusters WHERE id = ?1",
                params![cluster_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(data) = data {
            let mut cluster: Cluster = Self::decode(&data)?;
            cluster.release(request);
            cluster.updated_at = chrono::Utc::now();
            tx.execute(
                "UPDATE clusters SET data = ?2 WHERE id = ?1",
                params![cluster_id.to_string(), Self::encode(&cluster)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn get_project_vdc_quota(
        &self,
        project_id: Uuid,
        vdc_id: Uuid,
    ) -> SchedResult<Option<ProjectVdcQuota>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM project_vdc_quotas WHERE project_id = ?1 AND vdc_id = ?2",
                params![project_id.to_string(), vdc_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        data.as_deref().map(Self::decode).transpose()
    }

    async fn upsert_project_vdc_quota(&self, quota: &ProjectVdcQuota) -> SchedResult<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO project_vdc_quotas (project_id, vdc_id, data)
            VALUES (?1, ?2, ?3)
            "#,
            params![
                quota.project_id.to_string(),
                quota.vdc_id.to_string(),
                Self::encode(quota)?
            ],
        )?;
        Ok(())
    }

    async fn try_reserve_vdc_quota(
        &self,
        project_id: Uuid,
        vdc_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let Some(mut vdc) = ({
            let data: Option<String> = tx
                .query_row(
                    "SELECT data FROM vdcs WHERE id = ?1",
                    params![vdc_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            data.as_deref().map(Self::decode::<Vdc>).transpose()?
        }) else {
            return Ok(false);
        };

        let clusters = {
            let mut stmt = tx.prepare("SELECT data FROM clusters WHERE vdc_id = ?1")?;
            let rows = stmt.query_map(params![vdc_id.to_string()], |row| row.get::<_, String>(0))?;
            let mut clusters: Vec<Cluster> = Vec::new();
            for data in rows {
                clusters.push(Self::decode(&data?)?);
            }
            clusters
        };

        if !vdc.enabled || !request.fits(&vdc.available(&clusters)) {
            return Ok(false);
        }

        let data: Option<String> = tx
            .query_row(
                "SELECT data FROM project_vdc_quotas WHERE project_id = ?1 AND vdc_id = ?2",
                params![project_id.to_string(), vdc_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(mut quota) = data.as_deref().map(Self::decode::<ProjectVdcQuota>).transpose()?
        else {
            tracing::warn!(%project_id, %vdc_id, "no project allocation in vdc");
            return Ok(false);
        };

        if !quota.account.try_reserve(request, job_type) {
            return Ok(false);
        }
        quota.updated_at = chrono::Utc::now();
        vdc.reserve(request);
        vdc.updated_at = chrono::Utc::now();

        tx.execute(
            "UPDATE project_vdc_quotas SET data = ?3 WHERE project_id = ?1 AND vdc_id = ?2",
            params![
                project_id.to_string(),
                vdc_id.to_string(),
                Self::encode(&quota)?
            ],
        )?;
        tx.execute(
            "UPDATE vdcs SET data = ?2 WHERE id = ?1",
            params![vdc_id.to_string(), Self::encode(&vdc)?],
        )?;
        tx.commit()?;
        Ok(true)
    }

    async fn release_vdc_quota(
        &self,
        project_id: Uuid,
        vdc_id: Uuid,
        request: &Resources,
        job_type: JobType,
    ) -> SchedResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let data: Option<String> = tx
            .query_row(
                "SELECT data FROM vdcs WHERE id = ?1",
                params![vdc_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(data) = data {
            let mut vdc: Vdc = Self::decode(&data)?;
            vdc.release(request);
            vdc.updated_at = chrono::Utc::now();
            tx.execute(
                "UPDATE vdcs SET data = ?2 WHERE id = ?1",
                params![vdc_id.to_string(), Self::encode(&vdc)?],
            )?;
        }

        let data: Option<String> = tx
            .query_row(
                "SELECT data FROM project_vdc_quotas WHERE project_id = ?1 AND vdc_id = ?2",
                params![project_id.to_string(), vdc_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(data) = data {
            let mut quota: ProjectVdcQuota = Self::decode(&data)?;
            quota.account.release(request, job_type);
            quota.updated_at = chrono::Utc::now();
            tx.execute(
                "UPDATE project_vdc_quotas SET data = ?3 WHERE project_id = ?1 AND vdc_id = ?2",
                params![
                    project_id.to_string(),
                    vdc_id.to_string(),
                    Self::encode(&quota)?
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> SchedResult<Option<Run>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM runs WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        data.as_deref().map(Self::decode).transpose()
    }

    async fn upsert_run(&self, run: &Run) -> SchedResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO runs (id, data) VALUES (?1, ?2)",
            params![run.id.to_string(), Self::encode(run)?],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grani_types::{ExecutorKind, JobStatus, JobType};
    use serde_json::json;

    fn make_job(project: Uuid, queue: Uuid) -> Job {
        let mut job = Job::new(
            "j",
            JobType::Training,
            ExecutorKind::Kubernetes,
            project,
            Uuid::new_v4(),
            json!({"image": "x"}),
        );
        job.queue_id = Some(queue);
        job.status = JobStatus::Queued;
        job
    }

    #[tokio::test]
    async fn test_job_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let queue = store.get_or_create_default_queue(Uuid::new_v4()).await.unwrap();
        let job = make_job(queue.project_id, queue.id);

        store.insert_job(&job).await.unwrap();
        let loaded = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.executor_config, job.executor_config);

        let queued = store.list_jobs(&JobFilter::queued_in(queue.id)).await.unwrap();
        assert_eq!(queued.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_job_fails() {
        let store = SqliteStore::in_memory().unwrap();
        let job = make_job(Uuid::new_v4(), Uuid::new_v4());
        assert!(matches!(
            store.update_job(&job).await,
            Err(SchedError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let project = Uuid::new_v4();

        let job_id = {
            let store = SqliteStore::new(&path).unwrap();
            let queue = store.get_or_create_default_queue(project).await.unwrap();
            let job = make_job(project, queue.id);
            store.insert_job(&job).await.unwrap();
            job.id
        };

        let store = SqliteStore::new(&path).unwrap();
        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.project_id, project);
    }

    #[tokio::test]
    async fn test_quota_reserve_is_transactional() {
        let store = SqliteStore::in_memory().unwrap();
        let project = Uuid::new_v4();
        let request = Resources::new(2.0, 4.0, 0);

        assert!(
            store
                .try_reserve_project_quota(project, &request, JobType::Training)
                .await
                .unwrap()
        );

        // Failed reserve leaves counters untouched.
        let huge = Resources::new(1e6, 1e6, 0);
        assert!(
            !store
                .try_reserve_project_quota(project, &huge, JobType::Training)
                .await
                .unwrap()
        );
        let quota = store.get_or_create_project_quota(project).await.unwrap();
        assert_eq!(quota.account.used, request);
        assert_eq!(quota.account.current_jobs, 1);
    }

    #[tokio::test]
    async fn test_max_queue_position_and_stats() {
        let store = SqliteStore::in_memory().unwrap();
        let queue = store.get_or_create_default_queue(Uuid::new_v4()).await.unwrap();

        let mut first = make_job(queue.project_id, queue.id);
        first.queue_position = Some(1);
        store.insert_job(&first).await.unwrap();

        let mut second = make_job(queue.project_id, queue.id);
        second.queue_position = Some(2);
        second.status = JobStatus::Running;
        store.insert_job(&second).await.unwrap();

        // Running jobs vacate their position.
        assert_eq!(store.max_queue_position(queue.id).await.unwrap(), 1);

        let stats = store.refresh_queue_stats(queue.id).await.unwrap();
        assert_eq!(stats.total_jobs, 2);
        assert_eq!(stats.running_jobs, 1);
        assert_eq!(stats.pending_jobs, 1);
    }

    #[tokio::test]
    async fn test_vdc_quota_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let project = Uuid::new_v4();
        let vdc = Vdc::new("v");
        let vdc_id = vdc.id;
        store.upsert_vdc(&vdc).await.unwrap();
        store
            .upsert_cluster(&Cluster::new(
                vdc_id,
                "c1",
                ExecutorKind::Slurm,
                Resources::new(64.0, 256.0, 8),
            ))
            .await
            .unwrap();
        store
            .upsert_project_vdc_quota(&ProjectVdcQuota::new(
                project,
                vdc_id,
                Resources::new(8.0, 16.0, 2),
                5,
            ))
            .await
            .unwrap();

        let request = Resources::new(4.0, 8.0, 1);
        assert!(
            store
                .try_reserve_vdc_quota(project, vdc_id, &request, JobType::Training)
                .await
                .unwrap()
        );
        assert_eq!(store.get_vdc(vdc_id).await.unwrap().unwrap().used, request);

        store
            .release_vdc_quota(project, vdc_id, &request, JobType::Training)
            .await
            .unwrap();
        assert_eq!(
            store.get_vdc(vdc_id).await.unwrap().unwrap().used,
            Resources::zero()
        );
    }
}
