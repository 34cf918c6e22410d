use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use p4view_core::{BlockParser, ItemVersion, ParseError, VersionTree};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{Mutex, RwLock};

use super::command::status_query_job;
use super::runner::{ExecutionError, LaunchError, ProcessExit, ProcessRunner};
use crate::events::EventSink;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("failed to read status output: {0}")]
    Read(#[from] io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Feeds every line of `reader` through a [`BlockParser`] into `tree`.
///
/// Returns the number of records applied.
pub async fn ingest_lines<R>(reader: &mut R, tree: &mut VersionTree) -> Result<usize, ScanError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut parser = BlockParser::new();
    let mut line = String::new();
    let mut applied = 0;
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        if let Some(record) = parser.push_line(&line)? {
            tree.apply_record(&record);
            applied += 1;
        }
    }
    if let Some(record) = parser.finish()? {
        tree.apply_record(&record);
        applied += 1;
    }
    Ok(applied)
}

/// Owns the published version tree and refreshes it from status queries.
pub struct StatusService {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    tree: RwLock<VersionTree>,
    scan_lock: Mutex<()>,
    events: EventSink,
}

impl StatusService {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: impl Into<String>, events: EventSink) -> Self {
        Self {
            runner,
            program: program.into(),
            tree: RwLock::new(VersionTree::default()),
            scan_lock: Mutex::new(()),
            events,
        }
    }

    /// Rebuilds the tree for `directory`. Lookups keep seeing the previous
    /// tree until the scan ends; on failure the tree is left empty.
    pub async fn scan(&self, directory: &Path) -> Result<usize, ScanError> {
        let _scanning = self.scan_lock.lock().await;
        log::info!("scanning {}", directory.display());

        let mut fresh = VersionTree::new(directory);
        match self.collect(directory, &mut fresh).await {
            Ok(records) => {
                log::info!(
                    "scan of {} finished: {records} record(s), {} directories",
                    directory.display(),
                    fresh.directory_count()
                );
                *self.tree.write().await = fresh;
                Ok(records)
            }
            Err(err) => {
                log::error!("scan of {} failed: {err}", directory.display());
                *self.tree.write().await = VersionTree::new(directory);
                if let ScanError::Execution(exec) = &err
                    && !exec.stderr.is_empty()
                {
                    log::error!("{}", exec.stderr);
                }
                self.events.error(format!("p4 error: {err}"));
                Err(err)
            }
        }
    }

    async fn collect(&self, directory: &Path, tree: &mut VersionTree) -> Result<usize, ScanError> {
        let job = status_query_job(&self.program, directory);
        log::debug!("running {}", job.command_line());
        let mut output = self.runner.query(&job)?;
        let records = ingest_lines(&mut output.stdout, tree).await?;
        let exit = output
            .exit
            .await
            .unwrap_or_else(|_| ProcessExit::abnormal("status query was lost"));
        exit.into_result(&job)?;
        Ok(records)
    }

    pub async fn lookup(&self, path: &Path) -> ItemVersion {
        self.tree.read().await.lookup(path)
    }

    /// The last scanned directory, used as cwd for batch commands.
    pub async fn workspace_root(&self) -> Option<PathBuf> {
        let tree = self.tree.read().await;
        let root = tree.root();
        (!root.as_os_str().is_empty()).then(|| root.to_path_buf())
    }

    pub async fn snapshot(&self) -> VersionTree {
        self.tree.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PluginEvent;
    use crate::p4::fake::ScriptedRunner;
    use tokio::io::AsyncWriteExt;

    const EDITED: &str = "... clientFile /ws/a.txt\n\
                          ... headRev 3\n\
                          ... haveRev 3\n\
                          ... action edit\n\
                          \n";

    fn service(runner: &Arc<ScriptedRunner>) -> (StatusService, tokio::sync::mpsc::UnboundedReceiver<PluginEvent>) {
        let (events, rx) = EventSink::channel();
        let runner: Arc<dyn ProcessRunner> = runner.clone();
        (StatusService::new(runner, "p4", events), rx)
    }

    #[tokio::test]
    async fn scan_publishes_files_and_directories() {
        let runner = ScriptedRunner::new();
        runner.push_query(EDITED, ProcessExit::success());
        let (status, _rx) = service(&runner);

        assert_eq!(status.scan(Path::new("/ws")).await.unwrap(), 1);
        assert_eq!(
            status.lookup(Path::new("/ws/a.txt")).await,
            ItemVersion::LocallyModified
        );
        assert_eq!(
            status.lookup(Path::new("/ws")).await,
            ItemVersion::LocallyModified
        );
        assert_eq!(
            status.lookup(Path::new("/elsewhere")).await,
            ItemVersion::Unversioned
        );
        assert_eq!(status.workspace_root().await, Some(PathBuf::from("/ws")));
        assert!(status.snapshot().await.contains_directory(Path::new("/ws")));

        let jobs = runner.query_jobs();
        assert_eq!(jobs[0].working_dir, PathBuf::from("/ws"));
        assert_eq!(jobs[0].args[..4], ["-d", "/ws", "fstat", "-T"]);
    }

    #[tokio::test]
    async fn rescan_replaces_previous_results() {
        let runner = ScriptedRunner::new();
        runner.push_query(EDITED, ProcessExit::success());
        runner.push_query(
            "... clientFile /ws/b.txt\n... headRev 1\n... haveRev 1\n",
            ProcessExit::success(),
        );
        let (status, _rx) = service(&runner);

        status.scan(Path::new("/ws")).await.unwrap();
        status.scan(Path::new("/ws")).await.unwrap();
        let tree = status.snapshot().await;
        assert_eq!(tree.file_count(), 1);
        assert_eq!(tree.lookup(Path::new("/ws/a.txt")), ItemVersion::Unversioned);
        assert_eq!(tree.lookup(Path::new("/ws/b.txt")), ItemVersion::Normal);
    }

    #[tokio::test]
    async fn malformed_block_discards_everything() {
        let runner = ScriptedRunner::new();
        runner.push_query(
            "... clientFile /ws/a.txt\n... headRev 1\n\n... headRev 2\n\n",
            ProcessExit::success(),
        );
        let (status, mut rx) = service(&runner);

        let err = status.scan(Path::new("/ws")).await.unwrap_err();
        assert!(matches!(err, ScanError::Parse(ParseError::MissingPath { .. })));
        assert_eq!(status.snapshot().await.file_count(), 0);
        assert_eq!(
            status.lookup(Path::new("/ws/a.txt")).await,
            ItemVersion::Unversioned
        );
        let Ok(PluginEvent::Error(text)) = rx.try_recv() else {
            panic!("expected an error event");
        };
        assert!(text.starts_with("p4 error: "));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn lookups_see_previous_tree_while_scanning() {
        let runner = ScriptedRunner::new();
        runner.push_query(EDITED, ProcessExit::success());
        let (mut writer, reader) = tokio::io::duplex(1024);
        runner.push_query_reader(tokio::io::BufReader::new(reader), ProcessExit::success());
        let (status, _rx) = service(&runner);
        let status = Arc::new(status);
        status.scan(Path::new("/ws")).await.unwrap();

        let scanning = tokio::spawn({
            let status = Arc::clone(&status);
            async move { status.scan(Path::new("/ws")).await }
        });
        writer
            .write_all(b"... clientFile /ws/b.txt\n... headRev 1\n... haveRev 1\n\n")
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert_eq!(
            status.lookup(Path::new("/ws/a.txt")).await,
            ItemVersion::LocallyModified
        );
        assert_eq!(
            status.lookup(Path::new("/ws/b.txt")).await,
            ItemVersion::Unversioned
        );

        drop(writer);
        assert_eq!(scanning.await.unwrap().unwrap(), 1);
        assert_eq!(
            status.lookup(Path::new("/ws/a.txt")).await,
            ItemVersion::Unversioned
        );
        assert_eq!(status.lookup(Path::new("/ws/b.txt")).await, ItemVersion::Normal);
    }

    #[tokio::test]
    async fn failed_rescan_clears_previous_tree() {
        let runner = ScriptedRunner::new();
        runner.push_query(EDITED, ProcessExit::success());
        runner.push_query(EDITED, ProcessExit::code(1));
        let (status, _rx) = service(&runner);

        status.scan(Path::new("/ws")).await.unwrap();
        assert!(status.scan(Path::new("/ws")).await.is_err());
        assert_eq!(
            status.lookup(Path::new("/ws/a.txt")).await,
            ItemVersion::Unversioned
        );
        assert_eq!(status.workspace_root().await, Some(PathBuf::from("/ws")));
    }

    #[tokio::test]
    async fn failing_query_is_an_execution_error() {
        let runner = ScriptedRunner::new();
        runner.push_query(EDITED, ProcessExit::code(1));
        let (status, _rx) = service(&runner);

        let err = status.scan(Path::new("/ws")).await.unwrap_err();
        assert!(matches!(err, ScanError::Execution(_)));
        assert_eq!(status.snapshot().await.file_count(), 0);
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let runner = ScriptedRunner::new();
        let (status, mut rx) = service(&runner);
        let err = status.scan(Path::new("/ws")).await.unwrap_err();
        assert!(matches!(err, ScanError::Launch(_)));
        assert!(matches!(rx.try_recv(), Ok(PluginEvent::Error(_))));
    }

    #[tokio::test]
    async fn ingest_flushes_unterminated_block() {
        let mut reader: &[u8] = b"... clientFile /ws/a.txt\r\n... haveRev 1\r\n... headRev 2\r\n";
        let mut tree = VersionTree::new("/ws");
        assert_eq!(ingest_lines(&mut reader, &mut tree).await.unwrap(), 1);
        assert_eq!(
            tree.lookup(Path::new("/ws/a.txt")),
            ItemVersion::UpdateRequired
        );
    }
}
