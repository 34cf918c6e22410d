use std::path::{Path, PathBuf};

use p4view_core::STATUS_FIELDS;

/// One external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandJob {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl CommandJob {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    Sync,
    Add,
    Delete,
    Edit,
    Revert,
    RevertUnchanged,
    Resolve,
}

impl BatchOperation {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sync" => Some(Self::Sync),
            "add" => Some(Self::Add),
            "delete" => Some(Self::Delete),
            "edit" => Some(Self::Edit),
            "revert" => Some(Self::Revert),
            "revert_unchanged" => Some(Self::RevertUnchanged),
            "resolve" => Some(Self::Resolve),
            _ => None,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Edit => "edit",
            Self::Revert => "revert",
            Self::RevertUnchanged => "revert_unchanged",
            Self::Resolve => "resolve",
        }
    }

    pub fn command(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Edit => "edit",
            Self::Revert | Self::RevertUnchanged => "revert",
            Self::Resolve => "resolve",
        }
    }

    pub fn extra_args(self) -> &'static [&'static str] {
        match self {
            Self::RevertUnchanged => &["-a"],
            Self::Resolve => &["-am"],
            _ => &[],
        }
    }

    pub fn info_message(self) -> &'static str {
        match self {
            Self::Sync => "Syncing Perforce workspace...",
            Self::Add => "Adding files to Perforce depot...",
            Self::Delete => "Deleting files from Perforce depot...",
            Self::Edit => "Opening files for edit...",
            Self::Revert => "Reverting files...",
            Self::RevertUnchanged => "Reverting unchanged files...",
            Self::Resolve => "Resolving files...",
        }
    }

    pub fn error_message(self) -> &'static str {
        match self {
            Self::Sync => "Syncing of Perforce workspace failed.",
            Self::Add => "Adding of files to Perforce depot failed.",
            Self::Delete => "Deleting of files from Perforce depot failed.",
            Self::Edit => "Opening files for edit failed.",
            Self::Revert => "Reverting of files failed.",
            Self::RevertUnchanged => "Reverting of unchanged files failed.",
            Self::Resolve => "Resolving of files failed.",
        }
    }

    pub fn completed_message(self) -> &'static str {
        match self {
            Self::Sync => "Synced Perforce workspace.",
            Self::Add => "Added files to Perforce depot.",
            Self::Delete => "Deleted files from Perforce depot.",
            Self::Edit => "Opened files for edit.",
            Self::Revert => "Reverted files.",
            Self::RevertUnchanged => "Reverted unchanged files.",
            Self::Resolve => "Resolved files.",
        }
    }
}

/// A selected path; directories are addressed recursively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTarget {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl BatchTarget {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }

    /// Stats `path`; anything that is not a readable directory is a file.
    pub async fn resolve(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_dir = tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        Self { path, is_dir }
    }

    pub fn argument(&self) -> String {
        let path = self.path.to_string_lossy();
        if self.is_dir {
            format!("{}/...", path.trim_end_matches('/'))
        } else {
            path.into_owned()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffRevision {
    Have,
    Head,
}

impl DiffRevision {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "have" => Some(Self::Have),
            "head" => Some(Self::Head),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Have => "#have",
            Self::Head => "#head",
        }
    }
}

pub fn status_query_job(program: &str, directory: &Path) -> CommandJob {
    let dir = directory.to_string_lossy().into_owned();
    CommandJob::new(program, directory)
        .args(["-d", dir.as_str(), "fstat", "-T", STATUS_FIELDS, "..."])
}

pub fn batch_job(
    program: &str,
    workspace_root: &Path,
    operation: BatchOperation,
    target: &BatchTarget,
) -> CommandJob {
    CommandJob::new(program, workspace_root)
        .arg(operation.command())
        .args(operation.extra_args().iter().copied())
        .arg(target.argument())
}

pub fn diff_job(
    program: &str,
    workspace_root: &Path,
    targets: &[BatchTarget],
    revision: DiffRevision,
) -> CommandJob {
    CommandJob::new(program, workspace_root)
        .args(["diff", "-du"])
        .args(
            targets
                .iter()
                .map(|target| format!("{}{}", target.argument(), revision.label())),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_targets_get_recursive_suffix() {
        let job = batch_job(
            "p4",
            Path::new("/ws"),
            BatchOperation::Sync,
            &BatchTarget::dir("/ws/src/"),
        );
        assert_eq!(job.args, vec!["sync", "/ws/src/..."]);
        assert_eq!(job.working_dir, PathBuf::from("/ws"));
    }

    #[test]
    fn extra_args_precede_target() {
        let job = batch_job(
            "p4",
            Path::new("/ws"),
            BatchOperation::RevertUnchanged,
            &BatchTarget::file("/ws/a.txt"),
        );
        assert_eq!(job.command_line(), "p4 revert -a /ws/a.txt");
    }

    #[test]
    fn status_query_requests_tagged_fields() {
        let job = status_query_job("p4", Path::new("/ws/"));
        assert_eq!(
            job.args,
            vec!["-d", "/ws/", "fstat", "-T", STATUS_FIELDS, "..."]
        );
    }

    #[test]
    fn diff_covers_all_targets_in_one_invocation() {
        let job = diff_job(
            "p4",
            Path::new("/ws"),
            &[BatchTarget::file("/ws/a.txt"), BatchTarget::dir("/ws/lib")],
            DiffRevision::Head,
        );
        assert_eq!(
            job.args,
            vec!["diff", "-du", "/ws/a.txt#head", "/ws/lib/...#head"]
        );
    }

    #[test]
    fn operation_ids_round_trip() {
        for op in [
            BatchOperation::Sync,
            BatchOperation::Add,
            BatchOperation::Delete,
            BatchOperation::Edit,
            BatchOperation::Revert,
            BatchOperation::RevertUnchanged,
            BatchOperation::Resolve,
        ] {
            assert_eq!(BatchOperation::parse(op.id()), Some(op));
        }
        assert_eq!(BatchOperation::parse("submit"), None);
    }

    #[tokio::test]
    async fn resolve_detects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        tokio::fs::write(&file, b"x").await.unwrap();
        assert!(BatchTarget::resolve(dir.path()).await.is_dir);
        assert!(!BatchTarget::resolve(&file).await.is_dir);
        assert!(!BatchTarget::resolve(dir.path().join("missing")).await.is_dir);
    }
}
