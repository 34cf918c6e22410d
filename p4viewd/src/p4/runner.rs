use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;

use super::command::CommandJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Code(i32),
    /// Killed by a signal or otherwise without an exit code.
    Abnormal,
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitKind::Code(code) => write!(f, "exited with code {code}"),
            ExitKind::Abnormal => f.write_str("terminated abnormally"),
        }
    }
}

impl From<std::process::ExitStatus> for ExitKind {
    fn from(status: std::process::ExitStatus) -> Self {
        status.code().map(ExitKind::Code).unwrap_or(ExitKind::Abnormal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub kind: ExitKind,
    pub stderr: String,
}

impl ProcessExit {
    pub fn success() -> Self {
        Self::code(0)
    }

    pub fn code(code: i32) -> Self {
        Self {
            kind: ExitKind::Code(code),
            stderr: String::new(),
        }
    }

    pub fn abnormal(stderr: impl Into<String>) -> Self {
        Self {
            kind: ExitKind::Abnormal,
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == ExitKind::Code(0)
    }

    pub fn into_result(self, job: &CommandJob) -> Result<(), ExecutionError> {
        if self.is_success() {
            return Ok(());
        }
        Err(ExecutionError {
            command_line: job.command_line(),
            exit: self.kind,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

#[derive(Debug, Error)]
#[error("failed to launch {program}: {source}")]
pub struct LaunchError {
    pub program: String,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("`{command_line}` {exit}")]
pub struct ExecutionError {
    pub command_line: String,
    pub exit: ExitKind,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutTarget {
    Discard,
    File(PathBuf),
}

/// Live output of a running status query.
pub struct QueryOutput {
    pub stdout: Box<dyn AsyncBufRead + Send + Unpin>,
    pub exit: oneshot::Receiver<ProcessExit>,
}

/// Launches external processes on behalf of the pipelines.
pub trait ProcessRunner: Send + Sync {
    /// Runs `job` to completion.
    fn run(
        &self,
        job: &CommandJob,
        stdout: StdoutTarget,
    ) -> BoxFuture<'static, Result<ProcessExit, LaunchError>>;

    /// Starts `job` and streams its stdout.
    fn query(&self, job: &CommandJob) -> Result<QueryOutput, LaunchError>;

    /// Starts `job` detached; the receiver resolves once it exits.
    fn spawn(&self, job: &CommandJob) -> Result<oneshot::Receiver<ProcessExit>, LaunchError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

impl TokioRunner {
    fn command(job: &CommandJob) -> Command {
        let mut command = Command::new(&job.program);
        command
            .args(&job.args)
            .current_dir(&job.working_dir)
            .stdin(Stdio::null());
        command
    }

    fn launch_error(job: &CommandJob, source: io::Error) -> LaunchError {
        LaunchError {
            program: job.program.clone(),
            source,
        }
    }
}

impl ProcessRunner for TokioRunner {
    fn run(
        &self,
        job: &CommandJob,
        stdout: StdoutTarget,
    ) -> BoxFuture<'static, Result<ProcessExit, LaunchError>> {
        let job = job.clone();
        async move {
            let mut command = Self::command(&job);
            command.stderr(Stdio::piped());
            match stdout {
                StdoutTarget::Discard => {
                    command.stdout(Stdio::null());
                }
                StdoutTarget::File(path) => {
                    let file = tokio::fs::File::create(&path)
                        .await
                        .map_err(|err| Self::launch_error(&job, err))?;
                    command.stdout(Stdio::from(file.into_std().await));
                }
            }
            let child = command
                .spawn()
                .map_err(|err| Self::launch_error(&job, err))?;
            Ok(match child.wait_with_output().await {
                Ok(output) => ProcessExit {
                    kind: output.status.into(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                },
                Err(err) => ProcessExit::abnormal(err.to_string()),
            })
        }
        .boxed()
    }

    fn query(&self, job: &CommandJob) -> Result<QueryOutput, LaunchError> {
        let mut child = Self::command(job)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| Self::launch_error(job, err))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            Self::launch_error(job, io::Error::other("stdout was not captured"))
        })?;

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let exit = match child.wait_with_output().await {
                Ok(output) => ProcessExit {
                    kind: output.status.into(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                },
                Err(err) => ProcessExit::abnormal(err.to_string()),
            };
            let _ = tx.send(exit);
        });

        Ok(QueryOutput {
            stdout: Box::new(BufReader::new(stdout)),
            exit: rx,
        })
    }

    fn spawn(&self, job: &CommandJob) -> Result<oneshot::Receiver<ProcessExit>, LaunchError> {
        let mut child = Self::command(job)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| Self::launch_error(job, err))?;

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let exit = match child.wait().await {
                Ok(status) => ProcessExit {
                    kind: status.into(),
                    stderr: String::new(),
                },
                Err(err) => ProcessExit::abnormal(err.to_string()),
            };
            let _ = tx.send(exit);
        });
        Ok(rx)
    }
}
