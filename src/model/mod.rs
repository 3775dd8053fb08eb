mod job;
mod state;
mod task;
mod workflow;

pub use job::{Job, JobId, LaunchReport, NewJob, RetryConfig};
pub use state::{AttemptOutcome, JobStatus, Lifecycle, Transition};
pub use task::{Task, TaskFailure, TaskOutput};
pub use workflow::{
    JobSpec, JobSummary, NewWorkflow, Workflow, WorkflowId, WorkflowSpec, WorkflowStatus,
    WorkflowSummary,
};
