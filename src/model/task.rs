use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One executable step of a job.
///
/// The set of task kinds is closed; each kind carries its own typed parameters
/// and is tagged by `kind` in JSON and TOML documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    /// Produce `message` as the task output.
    Echo { message: String },
    /// Run an external program in the launch directory.
    Script {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    /// Write `contents` to `path`, creating parent directories.
    FileWrite { path: PathBuf, contents: String },
    /// Remove files.
    FileDelete {
        paths: Vec<PathBuf>,
        #[serde(default)]
        ignore_missing: bool,
    },
    Sleep { millis: u64 },
    /// Always fails with `reason`.
    Fail { reason: String },
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::Echo { .. } => "echo",
            Task::Script { .. } => "script",
            Task::FileWrite { .. } => "file_write",
            Task::FileDelete { .. } => "file_delete",
            Task::Sleep { .. } => "sleep",
            Task::Fail { .. } => "fail",
        }
    }
}

/// Output of a successful task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    /// Position of the task in the job's sequence.
    pub task: usize,
    pub output: String,
}

/// A failed task, recorded on the job it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task: usize,
    pub attempt: u32,
    pub message: String,
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "task {} failed on attempt {}: {}",
            self.task, self.attempt, self.message
        )
    }
}
