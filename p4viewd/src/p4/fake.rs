use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::io::AsyncBufRead;
use tokio::sync::oneshot;

use super::command::CommandJob;
use super::runner::{LaunchError, ProcessExit, ProcessRunner, QueryOutput, StdoutTarget};

enum Outcome {
    Exit(ProcessExit),
    LaunchFails,
}

#[derive(Default)]
struct State {
    runs: Vec<CommandJob>,
    outcomes: VecDeque<Outcome>,
    outputs: VecDeque<String>,
    queries: VecDeque<(Box<dyn AsyncBufRead + Send + Unpin>, ProcessExit)>,
    query_jobs: Vec<CommandJob>,
    spawned: Vec<(CommandJob, String)>,
    spawn_fails: bool,
}

/// Replays scripted exits and output; unscripted runs succeed silently.
#[derive(Default)]
pub struct ScriptedRunner {
    state: Mutex<State>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_exit(&self, exit: ProcessExit) {
        self.state.lock().unwrap().outcomes.push_back(Outcome::Exit(exit));
    }

    pub fn push_launch_failure(&self) {
        self.state.lock().unwrap().outcomes.push_back(Outcome::LaunchFails);
    }

    /// Stdout written to the file target of the next run.
    pub fn push_output(&self, stdout: &str) {
        self.state.lock().unwrap().outputs.push_back(stdout.to_string());
    }

    pub fn push_query(&self, stdout: &str, exit: ProcessExit) {
        self.push_query_reader(io::Cursor::new(stdout.as_bytes().to_vec()), exit);
    }

    /// Query whose stdout is read from `reader` as it becomes available.
    pub fn push_query_reader<R>(&self, reader: R, exit: ProcessExit)
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        self.state
            .lock()
            .unwrap()
            .queries
            .push_back((Box::new(reader), exit));
    }

    pub fn fail_spawns(&self) {
        self.state.lock().unwrap().spawn_fails = true;
    }

    pub fn runs(&self) -> Vec<CommandJob> {
        self.state.lock().unwrap().runs.clone()
    }

    pub fn query_jobs(&self) -> Vec<CommandJob> {
        self.state.lock().unwrap().query_jobs.clone()
    }

    /// Spawned jobs with the content of their last argument at spawn time.
    pub fn spawned(&self) -> Vec<(CommandJob, String)> {
        self.state.lock().unwrap().spawned.clone()
    }
}

fn not_found(job: &CommandJob) -> LaunchError {
    LaunchError {
        program: job.program.clone(),
        source: io::Error::from(io::ErrorKind::NotFound),
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(
        &self,
        job: &CommandJob,
        stdout: StdoutTarget,
    ) -> BoxFuture<'static, Result<ProcessExit, LaunchError>> {
        let mut state = self.state.lock().unwrap();
        state.runs.push(job.clone());
        let outcome = state
            .outcomes
            .pop_front()
            .unwrap_or(Outcome::Exit(ProcessExit::success()));
        let output = state.outputs.pop_front().unwrap_or_default();
        let result = match outcome {
            Outcome::Exit(exit) => {
                if let StdoutTarget::File(path) = stdout {
                    std::fs::write(path, output).unwrap();
                }
                Ok(exit)
            }
            Outcome::LaunchFails => Err(not_found(job)),
        };
        async move { result }.boxed()
    }

    fn query(&self, job: &CommandJob) -> Result<QueryOutput, LaunchError> {
        let mut state = self.state.lock().unwrap();
        state.query_jobs.push(job.clone());
        let Some((stdout, exit)) = state.queries.pop_front() else {
            return Err(not_found(job));
        };
        let (tx, rx) = oneshot::channel();
        tx.send(exit).unwrap();
        Ok(QueryOutput {
            stdout,
            exit: rx,
        })
    }

    fn spawn(&self, job: &CommandJob) -> Result<oneshot::Receiver<ProcessExit>, LaunchError> {
        let mut state = self.state.lock().unwrap();
        if state.spawn_fails {
            return Err(not_found(job));
        }
        let content = job
            .args
            .last()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .unwrap_or_default();
        state.spawned.push((job.clone(), content));
        let (tx, rx) = oneshot::channel();
        tx.send(ProcessExit::success()).unwrap();
        Ok(rx)
    }
}
