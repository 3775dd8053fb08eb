use thiserror::Error;

use crate::model::{JobId, JobStatus};

pub type Result<T, E = LaunchpadError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LaunchpadError {
    #[error("Invalid workflow: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: i64 },

    #[error("Job {0} is no longer READY, claim rejected")]
    ClaimConflict(JobId),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl LaunchpadError {
    pub fn workflow_not_found(id: i64) -> Self {
        Self::NotFound { kind: "Workflow", id }
    }

    pub fn job_not_found(id: i64) -> Self {
        Self::NotFound { kind: "Job", id }
    }

    /// True when the error means the caller asked for something that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
