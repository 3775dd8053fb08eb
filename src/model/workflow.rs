use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};

use super::job::{Job, JobId, NewJob, RetryConfig};
use super::state::JobStatus;
use super::task::{Task, TaskOutput};
use crate::error::{LaunchpadError, Result};

pub type WorkflowId = i64;

/// A job as written in a workflow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub tasks: Vec<Task>,
    /// Names of the jobs that must complete first.
    #[serde(default)]
    pub parents: Vec<String>,
    /// Overrides the launch pad's default retry count.
    #[serde(default)]
    pub retries: Option<u32>,
}

/// A workflow document, loaded from JSON or TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    #[serde(default = "default_workflow_name")]
    pub name: String,
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

fn default_workflow_name() -> String {
    "unnamed".to_string()
}

impl WorkflowSpec {
    /// Read a workflow document. `.toml` files are parsed as TOML, anything
    /// else as JSON.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let spec = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&contents)?,
            _ => serde_json::from_str(&contents)?,
        };
        Ok(spec)
    }

    /// Check the document and resolve parent names to indices.
    ///
    /// Rejects empty workflows, blank or duplicate job names, jobs without
    /// tasks, unknown or self-referencing parents and dependency cycles.
    pub fn validate(&self, default_retry: &RetryConfig) -> Result<NewWorkflow> {
        if self.jobs.is_empty() {
            return Err(invalid(format!("workflow '{}' has no jobs", self.name)));
        }

        let mut index_by_name: HashMap<&str, usize> = HashMap::new();
        for (i, job) in self.jobs.iter().enumerate() {
            if job.name.trim().is_empty() {
                return Err(invalid(format!("job #{i} has an empty name")));
            }
            if index_by_name.insert(job.name.as_str(), i).is_some() {
                return Err(invalid(format!("duplicate job name '{}'", job.name)));
            }
            if job.tasks.is_empty() {
                return Err(invalid(format!("job '{}' has no tasks", job.name)));
            }
        }

        let mut graph = DiGraph::<usize, ()>::new();
        let nodes: Vec<_> = (0..self.jobs.len()).map(|i| graph.add_node(i)).collect();

        let mut jobs = Vec::with_capacity(self.jobs.len());
        for (i, job) in self.jobs.iter().enumerate() {
            let mut parents = Vec::new();
            for parent in &job.parents {
                let p = *index_by_name.get(parent.as_str()).ok_or_else(|| {
                    invalid(format!(
                        "job '{}' depends on unknown job '{parent}'",
                        job.name
                    ))
                })?;
                if p == i {
                    return Err(invalid(format!("job '{}' depends on itself", job.name)));
                }
                if !parents.contains(&p) {
                    parents.push(p);
                    graph.add_edge(nodes[p], nodes[i], ());
                }
            }

            let mut retry = default_retry.clone();
            if let Some(retries) = job.retries {
                retry.max_retries = retries;
            }

            jobs.push(NewJob {
                name: job.name.clone(),
                tasks: job.tasks.clone(),
                parents,
                retry,
            });
        }

        if let Err(cycle) = toposort(&graph, None) {
            let name = &self.jobs[graph[cycle.node_id()]].name;
            return Err(invalid(format!("dependency cycle involving job '{name}'")));
        }

        Ok(NewWorkflow {
            name: self.name.clone(),
            jobs,
        })
    }
}

fn invalid(message: String) -> LaunchpadError {
    LaunchpadError::Validation(message)
}

/// A validated workflow, ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkflow {
    pub name: String,
    pub jobs: Vec<NewJob>,
}

/// Overall status, derived from the statuses of the jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Ready,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            WorkflowStatus::Ready => "READY",
            WorkflowStatus::Running => "RUNNING",
            WorkflowStatus::Completed => "COMPLETED",
            WorkflowStatus::Failed => "FAILED",
        })
    }
}

/// A persisted workflow with all of its jobs, ordered by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub jobs: Vec<Job>,
}

impl Workflow {
    pub fn status(&self) -> WorkflowStatus {
        let all = |s: JobStatus| self.jobs.iter().all(|j| j.status == s);
        let any = |s: JobStatus| self.jobs.iter().any(|j| j.status == s);

        if all(JobStatus::Completed) {
            WorkflowStatus::Completed
        } else if any(JobStatus::Failed) {
            WorkflowStatus::Failed
        } else if any(JobStatus::Running) || any(JobStatus::Completed) {
            WorkflowStatus::Running
        } else {
            WorkflowStatus::Ready
        }
    }

    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id,
            name: self.name.clone(),
            status: self.status(),
            created_at: self.created_at,
            jobs: self.jobs.iter().map(JobSummary::from_job).collect(),
        }
    }
}

/// Per-job view returned by `get_workflow_summary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    pub parents: Vec<JobId>,
    pub attempts: u32,
    pub worker: Option<String>,
    pub error: Option<String>,
    pub outputs: Vec<TaskOutput>,
}

impl JobSummary {
    fn from_job(job: &Job) -> Self {
        Self {
            id: job.id,
            name: job.name.clone(),
            status: job.status,
            parents: job.parents.iter().copied().collect(),
            attempts: job.attempts,
            worker: job.worker.clone(),
            error: job.last_failure().map(ToString::to_string),
            outputs: job.outputs.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub name: String,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub jobs: Vec<JobSummary>,
}

#[cfg(test)]
impl WorkflowSummary {
    /// Look a job up by name.
    pub fn job(&self, name: &str) -> Option<&JobSummary> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Status of the named job, if it exists.
    pub fn status_of(&self, name: &str) -> Option<JobStatus> {
        self.job(name).map(|j| j.status)
    }
}
