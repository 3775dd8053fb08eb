use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LaunchpadError, Result};
use crate::executor::TaskExecutor;
use crate::model::{Job, JobStatus, LaunchReport, Lifecycle, Transition, WorkflowId};
use crate::store::WorkflowStore;

/// Result of a single launch attempt.
#[derive(Debug, Clone)]
pub enum LaunchResult {
    Launched(LaunchReport),
    /// No READY job in scope. Not an error.
    NothingToRun,
}

/// Why rapid-fire mode stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Nothing READY or RUNNING remains in scope.
    #[default]
    Drained,
    /// The requested number of launches was reached.
    LimitReached,
    /// Only jobs held by other launchers remained and none finished in time.
    GaveUpWaiting,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RapidfireReport {
    pub launches: Vec<LaunchReport>,
    pub stopped: StopReason,
}

impl RapidfireReport {
    pub fn completed(&self) -> usize {
        self.count(JobStatus::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(JobStatus::Failed)
    }

    fn count(&self, status: JobStatus) -> usize {
        self.launches.iter().filter(|l| l.status == status).count()
    }
}

/// Claims READY jobs from a store and runs them one at a time.
pub struct Launcher<'a, S> {
    store: &'a S,
    executor: TaskExecutor,
    worker_id: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl<'a, S: WorkflowStore> Launcher<'a, S> {
    pub fn new(store: &'a S, executor: TaskExecutor) -> Self {
        Self {
            store,
            executor,
            worker_id: format!("launcher-{}", Uuid::new_v4()),
            poll_interval: Duration::from_millis(250),
            max_wait: Duration::from_secs(60),
        }
    }

    /// How often rapid-fire re-checks while other launchers hold RUNNING
    /// jobs, and how long it waits without progress before giving up.
    pub fn with_polling(mut self, poll_interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.max_wait = max_wait;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Claim and run exactly one READY job.
    ///
    /// A lost claim (another launcher got there first) triggers a fresh
    /// selection; it is never reported to the caller.
    pub async fn launch_one(&self, scope: Option<WorkflowId>) -> Result<LaunchResult> {
        loop {
            let Some(candidate) = self.store.next_ready_job(scope).await? else {
                return Ok(LaunchResult::NothingToRun);
            };

            match self.store.claim_job(candidate.id, &self.worker_id).await {
                Ok(job) => return self.run(job).await.map(LaunchResult::Launched),
                Err(LaunchpadError::ClaimConflict(id)) => {
                    debug!(job_id = id, "claim lost to another launcher, reselecting");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Launch until nothing is READY or RUNNING in scope, or `max_jobs`
    /// launches have happened.
    pub async fn rapidfire(
        &self,
        scope: Option<WorkflowId>,
        max_jobs: Option<usize>,
    ) -> Result<RapidfireReport> {
        self.rapidfire_with(scope, max_jobs, |_| {}).await
    }

    /// Like [`rapidfire`](Self::rapidfire), calling `on_launch` after every launch.
    pub async fn rapidfire_with<F>(
        &self,
        scope: Option<WorkflowId>,
        max_jobs: Option<usize>,
        mut on_launch: F,
    ) -> Result<RapidfireReport>
    where
        F: FnMut(&LaunchReport) + Send,
    {
        debug!(
            worker = %self.worker_id,
            launch_dir = %self.executor.launch_dir().display(),
            "rapid-fire started"
        );
        let mut report = RapidfireReport::default();
        let mut idle_since: Option<Instant> = None;

        loop {
            if max_jobs.is_some_and(|max| report.launches.len() >= max) {
                report.stopped = StopReason::LimitReached;
                break;
            }

            match self.launch_one(scope).await? {
                LaunchResult::Launched(launch) => {
                    idle_since = None;
                    on_launch(&launch);
                    report.launches.push(launch);
                }
                LaunchResult::NothingToRun => {
                    // A job finishing elsewhere may have promoted children since
                    // the selection came back empty.
                    let ready = self.store.count_jobs(scope, JobStatus::Ready).await?;
                    if ready > 0 {
                        idle_since = None;
                        continue;
                    }
                    let active = self.store.count_active(scope).await?;
                    if active == 0 {
                        report.stopped = StopReason::Drained;
                        break;
                    }
                    let waited = idle_since.get_or_insert_with(Instant::now).elapsed();
                    if waited >= self.max_wait {
                        warn!(
                            active,
                            waited_ms = waited.as_millis() as u64,
                            "giving up on jobs held by other launchers"
                        );
                        report.stopped = StopReason::GaveUpWaiting;
                        break;
                    }
                    debug!(active, "waiting for jobs held by other launchers");
                    sleep(self.poll_interval).await;
                }
            }
        }

        info!(
            launched = report.launches.len(),
            completed = report.completed(),
            failed = report.failed(),
            stopped = ?report.stopped,
            "rapid-fire finished"
        );
        Ok(report)
    }

    /// Run a claimed job to a terminal status and persist it.
    async fn run(&self, mut job: Job) -> Result<LaunchReport> {
        info!(job_id = job.id, workflow_id = job.workflow_id, name = %job.name, "launching job");

        loop {
            let outcome = self
                .executor
                .run_sequence(&job.tasks, job.attempts + 1)
                .await;

            match Lifecycle::settle(&mut job, outcome) {
                Transition::Retry {
                    attempt,
                    delay_ms,
                    reason,
                } => {
                    warn!(
                        job_id = job.id,
                        attempt,
                        max_retries = job.retry.max_retries,
                        delay_ms,
                        %reason,
                        "retrying job"
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                }
                Transition::Complete(status) => {
                    let promoted = self.store.finish_job(&job).await?;
                    match status {
                        JobStatus::Completed => {
                            info!(job_id = job.id, ?promoted, "job completed");
                        }
                        _ => {
                            let reason = job.last_failure().map(ToString::to_string);
                            warn!(job_id = job.id, reason = reason.as_deref(), "job failed");
                        }
                    }
                    return Ok(LaunchReport::from_job(&job));
                }
            }
        }
    }
}
