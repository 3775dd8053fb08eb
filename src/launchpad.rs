//! The launch pad: the only surface callers use to submit and inspect
//! workflows. It validates input and forwards to an explicit store handle.

use tracing::{info, warn};

use crate::error::Result;
use crate::model::{Job, JobId, RetryConfig, WorkflowId, WorkflowSpec, WorkflowSummary};
use crate::store::WorkflowStore;

pub struct LaunchPad<S> {
    store: S,
    default_retry: RetryConfig,
}

impl<S: WorkflowStore> LaunchPad<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            default_retry: RetryConfig::default(),
        }
    }

    /// Jobs that do not set `retries` get `default_retry`.
    pub fn with_retry(mut self, default_retry: RetryConfig) -> Self {
        self.default_retry = default_retry;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate and persist a workflow. Nothing is written when validation fails.
    pub async fn add_workflow(&self, spec: &WorkflowSpec) -> Result<WorkflowId> {
        let workflow = spec.validate(&self.default_retry)?;
        let id = self.store.insert_workflow(&workflow).await?;
        info!(
            workflow_id = id,
            name = %workflow.name,
            jobs = workflow.jobs.len(),
            "added workflow"
        );
        Ok(id)
    }

    pub async fn get_workflow_summary(&self, id: WorkflowId) -> Result<WorkflowSummary> {
        Ok(self.store.get_workflow(id).await?.summary())
    }

    pub async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>> {
        let workflows = self.store.list_workflows().await?;
        Ok(workflows.iter().map(|wf| wf.summary()).collect())
    }

    pub async fn get_job(&self, id: JobId) -> Result<Job> {
        self.store.get_job(id).await
    }

    /// Remove every workflow and job. Destructive; only ever called explicitly.
    pub async fn reset(&self) -> Result<usize> {
        let removed = self.store.reset().await?;
        warn!(removed, "launch pad reset");
        Ok(removed)
    }
}
