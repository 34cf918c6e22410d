use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use super::command::{BatchTarget, CommandJob, DiffRevision, diff_job};
use super::flight::FlightGuard;
use super::runner::{ExecutionError, LaunchError, ProcessRunner, StdoutTarget};
use crate::events::EventSink;

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("a diff is already being produced")]
    Busy,
    #[error("no targets selected")]
    NoTargets,
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("diff artifact error: {0}")]
    Artifact(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    NoDifferences,
    /// The viewer owns the artifact; it is removed when the viewer exits.
    Shown { artifact: PathBuf },
}

/// Produces one diff for a whole selection and hands it to a viewer.
///
/// Independent of the batch executor; single-flight on its own.
/// No timeout is applied: a hung `p4` or viewer process keeps it busy.
pub struct DiffPipeline {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    viewer: String,
    in_flight: Arc<AtomicBool>,
    events: EventSink,
}

impl DiffPipeline {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        program: impl Into<String>,
        viewer: impl Into<String>,
        events: EventSink,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            viewer: viewer.into(),
            in_flight: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn begin(
        &self,
        workspace_root: PathBuf,
        targets: Vec<BatchTarget>,
        revision: DiffRevision,
    ) -> Result<PendingDiff, DiffError> {
        if targets.is_empty() {
            return Err(DiffError::NoTargets);
        }
        let guard = FlightGuard::acquire(&self.in_flight).ok_or(DiffError::Busy)?;
        self.events.info("Creating diff...");
        Ok(PendingDiff {
            runner: Arc::clone(&self.runner),
            job: diff_job(&self.program, &workspace_root, &targets, revision),
            viewer: CommandJob::new(&self.viewer, workspace_root),
            events: self.events.clone(),
            guard,
        })
    }

    pub async fn show(
        &self,
        workspace_root: PathBuf,
        targets: Vec<BatchTarget>,
        revision: DiffRevision,
    ) -> Result<DiffOutcome, DiffError> {
        self.begin(workspace_root, targets, revision)?.run().await
    }
}

pub struct PendingDiff {
    runner: Arc<dyn ProcessRunner>,
    job: CommandJob,
    viewer: CommandJob,
    events: EventSink,
    guard: FlightGuard,
}

impl PendingDiff {
    pub async fn run(mut self) -> Result<DiffOutcome, DiffError> {
        let result = self.produce().await;
        self.guard.release();
        match &result {
            Ok(DiffOutcome::NoDifferences) => {
                log::info!("no differences for `{}`", self.job.command_line());
                self.events.completed("No differences found.");
            }
            Ok(DiffOutcome::Shown { artifact }) => {
                log::info!("diff opened from {}", artifact.display());
                self.events.completed("Diff opened.");
            }
            Err(err) => {
                log::error!("diff failed: {err}");
                self.events.error("Creating the diff failed.");
            }
        }
        result
    }

    async fn produce(&self) -> Result<DiffOutcome, DiffError> {
        let artifact = tempfile::Builder::new()
            .prefix("p4view-")
            .suffix(".diff")
            .tempfile()?
            .into_temp_path();
        log::debug!("running {}", self.job.command_line());
        self.runner
            .run(&self.job, StdoutTarget::File(artifact.to_path_buf()))
            .await?
            .into_result(&self.job)?;

        if tokio::fs::metadata(&artifact).await?.len() == 0 {
            return Ok(DiffOutcome::NoDifferences);
        }

        let path = artifact.to_path_buf();
        let viewer = self
            .viewer
            .clone()
            .arg(path.to_string_lossy().into_owned());
        let exited = self.runner.spawn(&viewer)?;
        tokio::spawn(async move {
            let _ = exited.await;
            if let Err(err) = artifact.close() {
                log::warn!("failed to remove diff artifact: {err}");
            }
        });
        Ok(DiffOutcome::Shown { artifact: path })
    }
}
