use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::JobStatus;
use super::task::{Task, TaskFailure, TaskOutput};
use super::workflow::WorkflowId;

pub type JobId = i64;

/// Configuration for retry behavior. Retries are opt-in: the default is none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries before marking a job as failed.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given retry attempt using exponential backoff.
    /// delay = base_delay_ms * 2^(attempt - 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// A job ("firework"): one schedulable unit made of an ordered task sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub workflow_id: WorkflowId,
    pub name: String,
    pub tasks: Vec<Task>,
    pub status: JobStatus,
    pub parents: BTreeSet<JobId>,
    pub children: BTreeSet<JobId>,
    pub retry: RetryConfig,
    pub attempts: u32,
    /// Outputs of the most recent attempt.
    pub outputs: Vec<TaskOutput>,
    /// One entry per failed attempt.
    pub failures: Vec<TaskFailure>,
    /// Worker that claimed the job.
    pub worker: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        id: JobId,
        workflow_id: WorkflowId,
        name: String,
        tasks: Vec<Task>,
        retry: RetryConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            workflow_id,
            name,
            tasks,
            status: JobStatus::Ready,
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            retry,
            attempts: 0,
            outputs: Vec::new(),
            failures: Vec::new(),
            worker: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// The most recent failure, if any attempt failed.
    pub fn last_failure(&self) -> Option<&TaskFailure> {
        self.failures.last()
    }
}

/// A job as submitted, before the store assigns identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub name: String,
    pub tasks: Vec<Task>,
    /// Indices into [`NewWorkflow::jobs`](super::NewWorkflow).
    pub parents: Vec<usize>,
    pub retry: RetryConfig,
}

impl NewJob {
    /// Starting status: READY without parents, WAITING otherwise.
    pub fn initial_status(&self) -> JobStatus {
        if self.parents.is_empty() {
            JobStatus::Ready
        } else {
            JobStatus::Waiting
        }
    }
}

/// Record produced by a launcher once a job reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchReport {
    pub job_id: JobId,
    pub workflow_id: WorkflowId,
    pub name: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub failure: Option<TaskFailure>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl LaunchReport {
    /// Generate a report from a completed or failed job.
    pub fn from_job(job: &Job) -> Self {
        let completed_at = job.completed_at.unwrap_or_else(Utc::now);
        let started_at = job.started_at.unwrap_or(completed_at);
        Self {
            job_id: job.id,
            workflow_id: job.workflow_id,
            name: job.name.clone(),
            status: job.status,
            attempts: job.attempts,
            failure: job.last_failure().cloned(),
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds(),
        }
    }
}
