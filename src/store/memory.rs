use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::WorkflowStore;
use crate::error::{LaunchpadError, Result};
use crate::model::{Job, JobId, JobStatus, Lifecycle, NewWorkflow, Workflow, WorkflowId};

#[derive(Debug, Clone)]
struct WorkflowRecord {
    name: String,
    created_at: DateTime<Utc>,
    jobs: Vec<JobId>,
}

#[derive(Debug, Default)]
struct Inner {
    next_workflow_id: WorkflowId,
    next_job_id: JobId,
    workflows: BTreeMap<WorkflowId, WorkflowRecord>,
    jobs: BTreeMap<JobId, Job>,
}

impl Inner {
    fn job(&self, id: JobId) -> Result<&Job> {
        self.jobs
            .get(&id)
            .ok_or_else(|| LaunchpadError::job_not_found(id))
    }

    fn job_mut(&mut self, id: JobId) -> Result<&mut Job> {
        self.jobs
            .get_mut(&id)
            .ok_or_else(|| LaunchpadError::job_not_found(id))
    }

    fn workflow(&self, id: WorkflowId) -> Result<Workflow> {
        let record = self
            .workflows
            .get(&id)
            .ok_or_else(|| LaunchpadError::workflow_not_found(id))?;
        let jobs = record
            .jobs
            .iter()
            .map(|job_id| self.job(*job_id).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Workflow {
            id,
            name: record.name.clone(),
            created_at: record.created_at,
            jobs,
        })
    }

    fn in_scope(job: &Job, scope: Option<WorkflowId>) -> bool {
        scope.is_none_or(|wf| job.workflow_id == wf)
    }
}

/// In-process store backing the launcher and launch pad tests. All operations
/// run under one mutex, which makes claim and finish atomic for launchers
/// sharing the store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WorkflowStore for MemoryStore {
    async fn insert_workflow(&self, workflow: &NewWorkflow) -> Result<WorkflowId> {
        let mut inner = self.lock();
        let now = Utc::now();

        inner.next_workflow_id += 1;
        let workflow_id = inner.next_workflow_id;
        let first_job_id = inner.next_job_id + 1;
        inner.next_job_id += workflow.jobs.len() as JobId;

        let ids: Vec<JobId> = (0..workflow.jobs.len() as JobId)
            .map(|i| first_job_id + i)
            .collect();

        let mut jobs: Vec<Job> = workflow
            .jobs
            .iter()
            .zip(&ids)
            .map(|(new_job, id)| {
                let mut job = Job::new(
                    *id,
                    workflow_id,
                    new_job.name.clone(),
                    new_job.tasks.clone(),
                    new_job.retry.clone(),
                );
                job.status = new_job.initial_status();
                job.created_at = now;
                job.updated_at = now;
                job.parents = new_job.parents.iter().map(|p| ids[*p]).collect();
                job
            })
            .collect();

        for (i, new_job) in workflow.jobs.iter().enumerate() {
            for parent in &new_job.parents {
                jobs[*parent].children.insert(ids[i]);
            }
        }

        for job in jobs {
            inner.jobs.insert(job.id, job);
        }
        inner.workflows.insert(
            workflow_id,
            WorkflowRecord {
                name: workflow.name.clone(),
                created_at: now,
                jobs: ids,
            },
        );

        Ok(workflow_id)
    }

    async fn get_workflow(&self, id: WorkflowId) -> Result<Workflow> {
        self.lock().workflow(id)
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let inner = self.lock();
        inner
            .workflows
            .keys()
            .map(|id| inner.workflow(*id))
            .collect()
    }

    async fn get_job(&self, id: JobId) -> Result<Job> {
        self.lock().job(id).cloned()
    }

    async fn next_ready_job(&self, scope: Option<WorkflowId>) -> Result<Option<Job>> {
        let inner = self.lock();
        let next = inner
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Ready && Inner::in_scope(job, scope))
            .min_by_key(|job| (job.created_at, job.id))
            .cloned();
        Ok(next)
    }

    async fn count_jobs(&self, scope: Option<WorkflowId>, status: JobStatus) -> Result<usize> {
        let inner = self.lock();
        Ok(inner
            .jobs
            .values()
            .filter(|job| job.status == status && Inner::in_scope(job, scope))
            .count())
    }

    async fn count_active(&self, scope: Option<WorkflowId>) -> Result<usize> {
        let inner = self.lock();
        Ok(inner
            .jobs
            .values()
            .filter(|job| matches!(job.status, JobStatus::Ready | JobStatus::Running))
            .filter(|job| Inner::in_scope(job, scope))
            .count())
    }

    async fn claim_job(&self, id: JobId, worker: &str) -> Result<Job> {
        let mut inner = self.lock();
        let job = inner.job_mut(id)?;
        if job.status != JobStatus::Ready {
            return Err(LaunchpadError::ClaimConflict(id));
        }

        let now = Utc::now();
        job.status = JobStatus::Running;
        job.worker = Some(worker.to_string());
        job.started_at = Some(now);
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn finish_job(&self, finished: &Job) -> Result<Vec<JobId>> {
        let mut inner = self.lock();
        let current = inner.job(finished.id)?.status;
        Lifecycle::check(finished.id, current, finished.status)?;

        let now = Utc::now();
        let mut record = finished.clone();
        record.updated_at = now;
        let children = record.children.clone();
        inner.jobs.insert(record.id, record);

        if finished.status != JobStatus::Completed {
            return Ok(Vec::new());
        }

        let mut promoted = Vec::new();
        for child_id in children {
            let child = inner.job(child_id)?;
            if child.status != JobStatus::Waiting {
                continue;
            }
            let parents_done = child
                .parents
                .iter()
                .map(|p| inner.job(*p).map(|j| j.status == JobStatus::Completed))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .all(|done| done);
            if parents_done {
                let child = inner.job_mut(child_id)?;
                child.status = JobStatus::Ready;
                child.updated_at = now;
                promoted.push(child_id);
            }
        }
        Ok(promoted)
    }

    async fn reset(&self) -> Result<usize> {
        let mut inner = self.lock();
        let removed = inner.workflows.len();
        inner.workflows.clear();
        inner.jobs.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewJob, RetryConfig, Task};

    fn chain(names: &[&str]) -> NewWorkflow {
        NewWorkflow {
            name: "chain".into(),
            jobs: names
                .iter()
                .enumerate()
                .map(|(i, name)| NewJob {
                    name: name.to_string(),
                    tasks: vec![Task::Echo {
                        message: name.to_string(),
                    }],
                    parents: if i == 0 { Vec::new() } else { vec![i - 1] },
                    retry: RetryConfig::default(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_links() {
        let store = MemoryStore::new();
        let wf_id = store.insert_workflow(&chain(&["a", "b", "c"])).await.unwrap();
        let wf = store.get_workflow(wf_id).await.unwrap();

        let ids: Vec<JobId> = wf.jobs.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(wf.jobs[0].status, JobStatus::Ready);
        assert_eq!(wf.jobs[1].status, JobStatus::Waiting);
        assert!(wf.jobs[0].children.contains(&2));
        assert!(wf.jobs[2].parents.contains(&2));
    }

    #[tokio::test]
    async fn second_claim_is_rejected() {
        let store = MemoryStore::new();
        store.insert_workflow(&chain(&["a"])).await.unwrap();

        let job = store.claim_job(1, "w1").await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.worker.as_deref(), Some("w1"));

        let err = store.claim_job(1, "w2").await.unwrap_err();
        assert!(matches!(err, LaunchpadError::ClaimConflict(1)));
    }

    #[tokio::test]
    async fn finish_rejects_jobs_that_were_not_running() {
        let store = MemoryStore::new();
        store.insert_workflow(&chain(&["a", "b"])).await.unwrap();

        let mut waiting = store.get_job(2).await.unwrap();
        waiting.status = JobStatus::Completed;
        let err = store.finish_job(&waiting).await.unwrap_err();
        assert!(matches!(err, LaunchpadError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn completion_promotes_child() {
        let store = MemoryStore::new();
        store.insert_workflow(&chain(&["a", "b", "c"])).await.unwrap();

        let mut job = store.claim_job(1, "w").await.unwrap();
        job.status = JobStatus::Completed;
        let promoted = store.finish_job(&job).await.unwrap();
        assert_eq!(promoted, vec![2]);
        assert_eq!(store.get_job(3).await.unwrap().status, JobStatus::Waiting);
    }

    #[tokio::test]
    async fn next_ready_respects_scope_and_order() {
        let store = MemoryStore::new();
        let first = store.insert_workflow(&chain(&["a"])).await.unwrap();
        let second = store.insert_workflow(&chain(&["b"])).await.unwrap();

        let next = store.next_ready_job(None).await.unwrap().unwrap();
        assert_eq!(next.workflow_id, first);

        let scoped = store.next_ready_job(Some(second)).await.unwrap().unwrap();
        assert_eq!(scoped.name, "b");
        assert_eq!(
            store.count_jobs(Some(second), JobStatus::Ready).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn reset_forgets_everything() {
        let store = MemoryStore::new();
        let id = store.insert_workflow(&chain(&["a", "b"])).await.unwrap();
        assert_eq!(store.reset().await.unwrap(), 1);
        assert!(store.get_workflow(id).await.unwrap_err().is_not_found());
        assert!(store.get_job(1).await.unwrap_err().is_not_found());
        assert_eq!(store.reset().await.unwrap(), 0);

        // Identifiers are never reused.
        let next = store.insert_workflow(&chain(&["c"])).await.unwrap();
        assert!(next > id);
    }
}
