use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::{SqliteConnection, SqlitePool};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use super::WorkflowStore;
use crate::error::{LaunchpadError, Result};
use crate::model::{Job, JobId, JobStatus, Lifecycle, NewJob, NewWorkflow, Workflow, WorkflowId};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS workflows (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workflow_id INTEGER NOT NULL REFERENCES workflows(id),
        name TEXT NOT NULL,
        status TEXT NOT NULL,
        tasks TEXT NOT NULL,
        retry TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        outputs TEXT NOT NULL DEFAULT '[]',
        failures TEXT NOT NULL DEFAULT '[]',
        worker TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS jobs_by_status ON jobs (status, workflow_id)",
    r#"
    CREATE TABLE IF NOT EXISTS job_links (
        parent_id INTEGER NOT NULL REFERENCES jobs(id),
        child_id INTEGER NOT NULL REFERENCES jobs(id),
        PRIMARY KEY (parent_id, child_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS job_links_by_child ON job_links (child_id)",
];

const JOB_COLUMNS: &str = "id, workflow_id, name, status, tasks, retry, attempts, outputs, \
                           failures, worker, created_at, updated_at, started_at, completed_at";

/// Promote the WAITING children of a parent once none of their parents is
/// anything but COMPLETED.
const PROMOTE_CHILDREN: &str = r#"
    UPDATE jobs SET status = ?, updated_at = ?
    WHERE status = ?
      AND id IN (SELECT child_id FROM job_links WHERE parent_id = ?)
      AND NOT EXISTS (
          SELECT 1 FROM job_links l JOIN jobs p ON p.id = l.parent_id
          WHERE l.child_id = jobs.id AND p.status != ?
      )
    RETURNING id
"#;

/// SQLite-backed store. Several launcher processes may share one database
/// file; claims and completions are single conditional updates.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database file at `path` and make sure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        debug!(path = %path.display(), "opened sqlite store");
        Ok(store)
    }

    /// Create tables and indexes that do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn load_jobs(&self, workflow_id: WorkflowId) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE workflow_id = ? ORDER BY id"
        ))
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        let mut jobs = rows.iter().map(job_from_row).collect::<Result<Vec<_>>>()?;

        let links: Vec<(JobId, JobId)> = sqlx::query_as(
            r#"
            SELECT l.parent_id, l.child_id
            FROM job_links l JOIN jobs j ON j.id = l.child_id
            WHERE j.workflow_id = ?
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        let position: HashMap<JobId, usize> =
            jobs.iter().enumerate().map(|(i, j)| (j.id, i)).collect();
        for (parent, child) in links {
            if let Some(&c) = position.get(&child) {
                jobs[c].parents.insert(parent);
            }
            if let Some(&p) = position.get(&parent) {
                jobs[p].children.insert(child);
            }
        }
        Ok(jobs)
    }
}

fn decode_err(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let status: String = row.try_get("status")?;
    let tasks: String = row.try_get("tasks")?;
    let retry: String = row.try_get("retry")?;
    let outputs: String = row.try_get("outputs")?;
    let failures: String = row.try_get("failures")?;

    let mut job = Job::new(
        row.try_get("id")?,
        row.try_get("workflow_id")?,
        row.try_get("name")?,
        serde_json::from_str(&tasks)?,
        serde_json::from_str(&retry)?,
    );
    job.status = status.parse().map_err(decode_err)?;
    job.attempts = row.try_get("attempts")?;
    job.outputs = serde_json::from_str(&outputs)?;
    job.failures = serde_json::from_str(&failures)?;
    job.worker = row.try_get("worker")?;
    job.created_at = row.try_get("created_at")?;
    job.updated_at = row.try_get("updated_at")?;
    job.started_at = row.try_get("started_at")?;
    job.completed_at = row.try_get("completed_at")?;
    Ok(job)
}

async fn insert_job(
    conn: &mut SqliteConnection,
    workflow_id: WorkflowId,
    job: &NewJob,
    now: DateTime<Utc>,
) -> Result<JobId> {
    let id = sqlx::query(
        r#"
        INSERT INTO jobs (workflow_id, name, status, tasks, retry, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(workflow_id)
    .bind(&job.name)
    .bind(job.initial_status().as_str())
    .bind(serde_json::to_string(&job.tasks)?)
    .bind(serde_json::to_string(&job.retry)?)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

impl WorkflowStore for SqliteStore {
    async fn insert_workflow(&self, workflow: &NewWorkflow) -> Result<WorkflowId> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let workflow_id = sqlx::query("INSERT INTO workflows (name, created_at) VALUES (?, ?)")
            .bind(&workflow.name)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        let mut ids = Vec::with_capacity(workflow.jobs.len());
        for job in &workflow.jobs {
            ids.push(insert_job(&mut tx, workflow_id, job, now).await?);
        }

        for (i, job) in workflow.jobs.iter().enumerate() {
            for parent in &job.parents {
                sqlx::query("INSERT INTO job_links (parent_id, child_id) VALUES (?, ?)")
                    .bind(ids[*parent])
                    .bind(ids[i])
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(workflow_id)
    }

    async fn get_workflow(&self, id: WorkflowId) -> Result<Workflow> {
        let row: Option<(String, DateTime<Utc>)> =
            sqlx::query_as("SELECT name, created_at FROM workflows WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        let (name, created_at) = row.ok_or_else(|| LaunchpadError::workflow_not_found(id))?;

        Ok(Workflow {
            id,
            name,
            created_at,
            jobs: self.load_jobs(id).await?,
        })
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let ids: Vec<WorkflowId> = sqlx::query_scalar("SELECT id FROM workflows ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let mut workflows = Vec::with_capacity(ids.len());
        for id in ids {
            workflows.push(self.get_workflow(id).await?);
        }
        Ok(workflows)
    }

    async fn get_job(&self, id: JobId) -> Result<Job> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LaunchpadError::job_not_found(id))?;
        let mut job = job_from_row(&row)?;

        let parents: Vec<JobId> =
            sqlx::query_scalar("SELECT parent_id FROM job_links WHERE child_id = ?")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        let children: Vec<JobId> =
            sqlx::query_scalar("SELECT child_id FROM job_links WHERE parent_id = ?")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        job.parents = parents.into_iter().collect();
        job.children = children.into_iter().collect();
        Ok(job)
    }

    async fn next_ready_job(&self, scope: Option<WorkflowId>) -> Result<Option<Job>> {
        let id: Option<JobId> = sqlx::query_scalar(
            r#"
            SELECT id FROM jobs
            WHERE status = ? AND (? IS NULL OR workflow_id = ?)
            ORDER BY created_at, id
            LIMIT 1
            "#,
        )
        .bind(JobStatus::Ready.as_str())
        .bind(scope)
        .bind(scope)
        .fetch_optional(&self.pool)
        .await?;

        match id {
            Some(id) => Ok(Some(self.get_job(id).await?)),
            None => Ok(None),
        }
    }

    async fn count_jobs(&self, scope: Option<WorkflowId>, status: JobStatus) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE status = ? AND (? IS NULL OR workflow_id = ?)",
        )
        .bind(status.as_str())
        .bind(scope)
        .bind(scope)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }

    async fn count_active(&self, scope: Option<WorkflowId>) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE status IN (?, ?) AND (? IS NULL OR workflow_id = ?)",
        )
        .bind(JobStatus::Ready.as_str())
        .bind(JobStatus::Running.as_str())
        .bind(scope)
        .bind(scope)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }

    async fn claim_job(&self, id: JobId, worker: &str) -> Result<Job> {
        let now = Utc::now();
        let claimed = sqlx::query(
            r#"
            UPDATE jobs SET status = ?, worker = ?, started_at = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(JobStatus::Running.as_str())
        .bind(worker)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(JobStatus::Ready.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if claimed == 0 {
            // Surface NotFound for unknown ids, ClaimConflict otherwise.
            self.get_job(id).await?;
            return Err(LaunchpadError::ClaimConflict(id));
        }
        self.get_job(id).await
    }

    async fn finish_job(&self, job: &Job) -> Result<Vec<JobId>> {
        Lifecycle::check(job.id, JobStatus::Running, job.status)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, attempts = ?, outputs = ?, failures = ?,
                completed_at = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.attempts)
        .bind(serde_json::to_string(&job.outputs)?)
        .bind(serde_json::to_string(&job.failures)?)
        .bind(job.completed_at.unwrap_or(now))
        .bind(now)
        .bind(job.id)
        .bind(JobStatus::Running.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
                    .bind(job.id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let current = current.ok_or_else(|| LaunchpadError::job_not_found(job.id))?;
            return Err(LaunchpadError::InvalidTransition {
                job_id: job.id,
                from: current.parse().map_err(decode_err)?,
                to: job.status,
            });
        }

        let promoted: Vec<JobId> = if job.status == JobStatus::Completed {
            sqlx::query_scalar(PROMOTE_CHILDREN)
                .bind(JobStatus::Ready.as_str())
                .bind(now)
                .bind(JobStatus::Waiting.as_str())
                .bind(job.id)
                .bind(JobStatus::Completed.as_str())
                .fetch_all(&mut *tx)
                .await?
        } else {
            Vec::new()
        };

        tx.commit().await?;
        Ok(promoted)
    }

    async fn reset(&self) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM job_links").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM jobs").execute(&mut *tx).await?;
        let removed = sqlx::query("DELETE FROM workflows")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(removed as usize)
    }
}
