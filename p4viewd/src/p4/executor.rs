use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use super::command::{BatchOperation, BatchTarget, batch_job};
use super::flight::FlightGuard;
use super::queue::CommandQueue;
use super::runner::{ExecutionError, LaunchError, ProcessRunner, StdoutTarget};
use crate::events::EventSink;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("a batch operation is already running")]
    Busy,
    #[error("no targets selected")]
    NoTargets,
    #[error("{}: {source}", .target.display())]
    Launch {
        target: PathBuf,
        #[source]
        source: LaunchError,
    },
    #[error("{}: {source}", .target.display())]
    Execution {
        target: PathBuf,
        #[source]
        source: ExecutionError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub operation: BatchOperation,
    pub completed: usize,
}

/// Runs batch operations one external invocation at a time.
///
/// Only one batch may be in flight; `begin` fails fast otherwise.
/// No timeout is applied: a hung `p4` process stalls the batch indefinitely.
pub struct BatchExecutor {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    in_flight: Arc<AtomicBool>,
    events: EventSink,
}

impl BatchExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: impl Into<String>, events: EventSink) -> Self {
        Self {
            runner,
            program: program.into(),
            in_flight: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Claims the executor for a batch. Targets run in reverse order.
    pub fn begin(
        &self,
        operation: BatchOperation,
        workspace_root: PathBuf,
        targets: Vec<BatchTarget>,
    ) -> Result<RunningBatch, BatchError> {
        if targets.is_empty() {
            return Err(BatchError::NoTargets);
        }
        let guard = FlightGuard::acquire(&self.in_flight).ok_or(BatchError::Busy)?;
        log::info!(
            "starting {} on {} target(s) in {}",
            operation.id(),
            targets.len(),
            workspace_root.display()
        );
        self.events.info(operation.info_message());
        Ok(RunningBatch {
            runner: Arc::clone(&self.runner),
            program: self.program.clone(),
            workspace_root,
            operation,
            queue: CommandQueue::new(targets),
            events: self.events.clone(),
            guard,
        })
    }

    pub async fn execute(
        &self,
        operation: BatchOperation,
        workspace_root: PathBuf,
        targets: Vec<BatchTarget>,
    ) -> Result<BatchSummary, BatchError> {
        self.begin(operation, workspace_root, targets)?.drive().await
    }
}

/// A claimed batch; dropping it without driving releases the executor.
pub struct RunningBatch {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    workspace_root: PathBuf,
    operation: BatchOperation,
    queue: CommandQueue,
    events: EventSink,
    guard: FlightGuard,
}

impl RunningBatch {
    pub fn operation(&self) -> BatchOperation {
        self.operation
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub async fn drive(mut self) -> Result<BatchSummary, BatchError> {
        let mut completed = 0;
        while let Ok(target) = self.queue.dequeue() {
            let job = batch_job(&self.program, &self.workspace_root, self.operation, &target);
            log::debug!("running {}", job.command_line());
            let exit = match self.runner.run(&job, StdoutTarget::Discard).await {
                Ok(exit) => exit,
                Err(source) => {
                    return Err(self.abort(BatchError::Launch {
                        target: target.path,
                        source,
                    }));
                }
            };
            if let Err(source) = exit.into_result(&job) {
                return Err(self.abort(BatchError::Execution {
                    target: target.path,
                    source,
                }));
            }
            completed += 1;
        }

        self.guard.release();
        log::info!("{} finished for {completed} target(s)", self.operation.id());
        self.events.completed(self.operation.completed_message());
        self.events.versions_changed();
        Ok(BatchSummary {
            operation: self.operation,
            completed,
        })
    }

    fn abort(&mut self, err: BatchError) -> BatchError {
        let discarded = self.queue.clear();
        self.guard.release();
        log::error!(
            "{} failed, {discarded} queued target(s) dropped: {err}",
            self.operation.id()
        );
        if let BatchError::Execution { source, .. } = &err
            && !source.stderr.is_empty()
        {
            log::error!("{}", source.stderr);
        }
        self.events.error(self.operation.error_message());
        err
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
