//! Workflow store
//!
//! The [`WorkflowStore`] trait is the persistence seam of the launch pad. It
//! defines operations for:
//! - Persisting validated workflows and assigning identifiers
//! - Point queries for workflows and jobs
//! - Selecting and atomically claiming READY jobs
//! - Recording terminal job results and promoting children
//! - Clearing everything with [`reset`](WorkflowStore::reset)
//!
//! Callers always hold an explicit store handle; there is no process-wide
//! connection.

#[cfg(test)]
mod memory;
mod sqlite;

use std::future::Future;
use std::sync::Arc;

#[cfg(test)]
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::model::{Job, JobId, JobStatus, NewWorkflow, Workflow, WorkflowId};

pub trait WorkflowStore: Send + Sync {
    /// Persist a validated workflow. Job ids are assigned in submission
    /// order and every job starts READY or WAITING depending on its parents.
    fn insert_workflow(
        &self,
        workflow: &NewWorkflow,
    ) -> impl Future<Output = Result<WorkflowId>> + Send;

    /// Get a workflow with all of its jobs.
    fn get_workflow(&self, id: WorkflowId) -> impl Future<Output = Result<Workflow>> + Send;

    /// All workflows, oldest first.
    fn list_workflows(&self) -> impl Future<Output = Result<Vec<Workflow>>> + Send;

    /// Get a job by id.
    fn get_job(&self, id: JobId) -> impl Future<Output = Result<Job>> + Send;

    /// The oldest READY job (ties broken by id), optionally limited to one workflow.
    fn next_ready_job(
        &self,
        scope: Option<WorkflowId>,
    ) -> impl Future<Output = Result<Option<Job>>> + Send;

    /// Number of jobs with `status`, optionally limited to one workflow.
    fn count_jobs(
        &self,
        scope: Option<WorkflowId>,
        status: JobStatus,
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Number of jobs that are READY or RUNNING, read as one snapshot.
    fn count_active(
        &self,
        scope: Option<WorkflowId>,
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Atomically move a job from READY to RUNNING on behalf of `worker`.
    ///
    /// Fails with `ClaimConflict` when the job is no longer READY.
    fn claim_job(&self, id: JobId, worker: &str) -> impl Future<Output = Result<Job>> + Send;

    /// Persist a RUNNING job that reached COMPLETED or FAILED.
    ///
    /// On COMPLETED every WAITING child whose parents are all COMPLETED
    /// becomes READY in the same step; the promoted ids are returned.
    fn finish_job(&self, job: &Job) -> impl Future<Output = Result<Vec<JobId>>> + Send;

    /// Remove every workflow. Returns how many were removed.
    fn reset(&self) -> impl Future<Output = Result<usize>> + Send;
}

/// A shared handle is a store too, so launchers in several tasks can use one
/// backend.
impl<T: WorkflowStore> WorkflowStore for Arc<T> {
    fn insert_workflow(
        &self,
        workflow: &NewWorkflow,
    ) -> impl Future<Output = Result<WorkflowId>> + Send {
        (**self).insert_workflow(workflow)
    }

    fn get_workflow(&self, id: WorkflowId) -> impl Future<Output = Result<Workflow>> + Send {
        (**self).get_workflow(id)
    }

    fn list_workflows(&self) -> impl Future<Output = Result<Vec<Workflow>>> + Send {
        (**self).list_workflows()
    }

    fn get_job(&self, id: JobId) -> impl Future<Output = Result<Job>> + Send {
        (**self).get_job(id)
    }

    fn next_ready_job(
        &self,
        scope: Option<WorkflowId>,
    ) -> impl Future<Output = Result<Option<Job>>> + Send {
        (**self).next_ready_job(scope)
    }

    fn count_jobs(
        &self,
        scope: Option<WorkflowId>,
        status: JobStatus,
    ) -> impl Future<Output = Result<usize>> + Send {
        (**self).count_jobs(scope, status)
    }

    fn count_active(
        &self,
        scope: Option<WorkflowId>,
    ) -> impl Future<Output = Result<usize>> + Send {
        (**self).count_active(scope)
    }

    fn claim_job(&self, id: JobId, worker: &str) -> impl Future<Output = Result<Job>> + Send {
        (**self).claim_job(id, worker)
    }

    fn finish_job(&self, job: &Job) -> impl Future<Output = Result<Vec<JobId>>> + Send {
        (**self).finish_job(job)
    }

    fn reset(&self) -> impl Future<Output = Result<usize>> + Send {
        (**self).reset()
    }
}
