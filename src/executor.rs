use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tokio::time::{Duration, sleep, timeout};
use tracing::debug;

use crate::model::{AttemptOutcome, Task, TaskFailure, TaskOutput};

/// Why a task failed. Recorded on the job; never aborts a launcher.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    NonZeroExit {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("'{command}' timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Runs tasks relative to a launch directory.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    launch_dir: PathBuf,
}

impl TaskExecutor {
    pub fn new(launch_dir: impl Into<PathBuf>) -> Self {
        Self {
            launch_dir: launch_dir.into(),
        }
    }

    pub fn launch_dir(&self) -> &Path {
        &self.launch_dir
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.launch_dir.join(path)
        }
    }

    /// Run `tasks` in order, stopping at the first failure.
    pub async fn run_sequence(&self, tasks: &[Task], attempt: u32) -> AttemptOutcome {
        let mut outputs = Vec::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            match self.execute(task).await {
                Ok(output) => outputs.push(TaskOutput { task: i, output }),
                Err(e) => {
                    return AttemptOutcome::Failure {
                        outputs,
                        failure: TaskFailure {
                            task: i,
                            attempt,
                            message: e.to_string(),
                        },
                    };
                }
            }
        }
        AttemptOutcome::Success(outputs)
    }

    /// Execute a single task and return its output.
    pub async fn execute(&self, task: &Task) -> Result<String, TaskError> {
        debug!(kind = task.kind(), "executing task");
        match task {
            Task::Echo { message } => Ok(message.clone()),

            Task::Script {
                command,
                args,
                timeout_secs,
            } => self.run_script(command, args, *timeout_secs).await,

            Task::FileWrite { path, contents } => {
                let path = self.resolve(path);
                let io_err = |source| TaskError::Io {
                    path: path.clone(),
                    source,
                };
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
                }
                tokio::fs::write(&path, contents).await.map_err(io_err)?;
                Ok(format!("wrote {} bytes to {}", contents.len(), path.display()))
            }

            Task::FileDelete {
                paths,
                ignore_missing,
            } => {
                let mut deleted = 0;
                for path in paths {
                    let path = self.resolve(path);
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => deleted += 1,
                        Err(e) if e.kind() == io::ErrorKind::NotFound && *ignore_missing => {}
                        Err(source) => return Err(TaskError::Io { path, source }),
                    }
                }
                Ok(format!("deleted {deleted} file(s)"))
            }

            Task::Sleep { millis } => {
                sleep(Duration::from_millis(*millis)).await;
                Ok(format!("slept for {millis}ms"))
            }

            Task::Fail { reason } => Err(TaskError::Failed(reason.clone())),
        }
    }

    async fn run_script(
        &self,
        command: &str,
        args: &[String],
        timeout_secs: Option<u64>,
    ) -> Result<String, TaskError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(&self.launch_dir)
            .kill_on_drop(true);
        let child = cmd.output();

        let output = match timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), child)
                .await
                .map_err(|_elapsed| TaskError::Timeout {
                    command: command.to_string(),
                    secs,
                })?,
            None => child.await,
        }
        .map_err(|source| TaskError::Spawn {
            command: command.to_string(),
            source,
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
        } else {
            Err(TaskError::NonZeroExit {
                command: command.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            })
        }
    }
}
