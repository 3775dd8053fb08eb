use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::job::{Job, JobId};
use super::task::{TaskFailure, TaskOutput};
use crate::error::{LaunchpadError, Result};

/// The five states of a job.
///
/// Each job flows through: WAITING → READY → RUNNING → COMPLETED | FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Waiting,
    Ready,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Waiting => "WAITING",
            JobStatus::Ready => "READY",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Whether `self → next` is an edge of the job state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Waiting, JobStatus::Ready)
                | (JobStatus::Ready, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(JobStatus::Waiting),
            "READY" => Ok(JobStatus::Ready),
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// The result of running a job's task sequence once.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(Vec<TaskOutput>),
    /// `outputs` holds what the tasks before the failing one produced.
    Failure {
        outputs: Vec<TaskOutput>,
        failure: TaskFailure,
    },
}

/// What the launcher should do after an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Run the task sequence again after `delay_ms`.
    Retry {
        attempt: u32,
        delay_ms: u64,
        reason: TaskFailure,
    },
    /// The job reached a terminal status.
    Complete(JobStatus),
}

/// Drives a RUNNING [`Job`] to a terminal status.
pub struct Lifecycle;

impl Lifecycle {
    /// Reject any status change that is not an edge of the state machine.
    pub fn check(job_id: JobId, from: JobStatus, to: JobStatus) -> Result<()> {
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(LaunchpadError::InvalidTransition { job_id, from, to })
        }
    }

    /// Fold one attempt into the job record and compute the next transition.
    ///
    /// - Success completes the job.
    /// - Failure retries while `attempts <= retry.max_retries`, otherwise the
    ///   job fails. Every failure is appended to `job.failures`.
    pub fn settle(job: &mut Job, outcome: AttemptOutcome) -> Transition {
        job.attempts += 1;
        match outcome {
            AttemptOutcome::Success(outputs) => {
                job.outputs = outputs;
                Self::finish(job, JobStatus::Completed)
            }
            AttemptOutcome::Failure { outputs, failure } => {
                job.outputs = outputs;
                job.failures.push(failure.clone());
                if job.attempts <= job.retry.max_retries {
                    Transition::Retry {
                        attempt: job.attempts,
                        delay_ms: job.retry.delay_for_attempt(job.attempts),
                        reason: failure,
                    }
                } else {
                    Self::finish(job, JobStatus::Failed)
                }
            }
        }
    }

    fn finish(job: &mut Job, status: JobStatus) -> Transition {
        job.status = status;
        job.completed_at = Some(Utc::now());
        Transition::Complete(status)
    }
}
