use std::path::{Path, PathBuf};

use p4view_core::ItemVersion;
use p4view_integrations::ids::{
    DBUS_INTERFACE_STATUS, DBUS_NAME_STATUS, DBUS_OBJECT_PATH_STATUS, DIFF_REVISION_HAVE,
    DIFF_REVISION_HEAD,
};
use thiserror::Error;
use zbus::Message;
use zbus::blocking::{Connection, Proxy, proxy::SignalIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Edit,
    Sync,
    Add,
    Delete,
    Revert,
    RevertUnchanged,
    DiffHave,
    DiffHead,
}

impl FileAction {
    pub fn id(self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Sync => "sync",
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Revert => "revert",
            Self::RevertUnchanged => "revert_unchanged",
            Self::DiffHave => "diff_have",
            Self::DiffHead => "diff_head",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Edit => "Perforce Edit",
            Self::Sync => "Perforce Update",
            Self::Add => "Perforce Add",
            Self::Delete => "Perforce Delete",
            Self::Revert => "Perforce Revert",
            Self::RevertUnchanged => "Perforce Revert Unchanged Files",
            Self::DiffHave => "Perforce Diff Against Have Revision",
            Self::DiffHead => "Perforce Diff Against Head Revision",
        }
    }

    /// Revision label for the diff actions.
    pub fn diff_revision(self) -> Option<&'static str> {
        match self {
            Self::DiffHave => Some(DIFF_REVISION_HAVE),
            Self::DiffHead => Some(DIFF_REVISION_HEAD),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItemSpec {
    pub id: &'static str,
    pub label: &'static str,
    pub action: FileAction,
    pub enabled: bool,
}

impl MenuItemSpec {
    fn new(action: FileAction, enabled: bool) -> Self {
        Self {
            id: action.id(),
            label: action.label(),
            action,
            enabled,
        }
    }
}

/// In-flight state of the daemon's two independent pipelines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pending {
    pub batch: bool,
    pub diff: bool,
}

/// Menu for a selection of files (or several directories).
///
/// Batch actions follow the batch state, diff actions the diff state.
pub fn file_actions(versions: &[ItemVersion], pending: Pending) -> Vec<MenuItemSpec> {
    let total = versions.len();
    let versioned = versions
        .iter()
        .filter(|version| **version != ItemVersion::Unversioned)
        .count();
    let editing = versions
        .iter()
        .filter(|version| version.is_being_edited())
        .count();
    let idle = !pending.batch;

    let mut menu = vec![
        MenuItemSpec::new(FileAction::Edit, idle && editing < total),
        MenuItemSpec::new(FileAction::Sync, idle),
        MenuItemSpec::new(FileAction::Add, idle && versioned == 0),
        MenuItemSpec::new(
            FileAction::Delete,
            idle && versioned == total && editing == 0,
        ),
        MenuItemSpec::new(FileAction::Revert, idle && editing > 0),
        MenuItemSpec::new(FileAction::RevertUnchanged, idle && editing > 0),
    ];
    if !pending.diff && editing > 0 {
        menu.push(MenuItemSpec::new(FileAction::DiffHave, true));
        menu.push(MenuItemSpec::new(FileAction::DiffHead, true));
    }
    menu
}

/// Menu for a single selected directory; empty when it holds no entry.
pub fn directory_actions(has_entry: bool, pending: Pending) -> Vec<MenuItemSpec> {
    if !has_entry {
        return Vec::new();
    }
    [
        FileAction::Edit,
        FileAction::Sync,
        FileAction::Revert,
        FileAction::RevertUnchanged,
    ]
    .into_iter()
    .map(|action| MenuItemSpec::new(action, !pending.batch))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusSignalEvent {
    Info(String),
    Error(String),
    OperationCompleted(String),
    ItemVersionsChanged,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("dbus error: {0}")]
    Dbus(#[from] zbus::Error),
    #[error("fdo error: {0}")]
    Fdo(#[from] zbus::fdo::Error),
    #[error("unsupported signal payload: {0}")]
    UnsupportedSignal(String),
    #[error("empty selection")]
    EmptySelection,
}

fn path_strings(paths: &[PathBuf]) -> Result<Vec<String>, ClientError> {
    if paths.is_empty() {
        return Err(ClientError::EmptySelection);
    }
    Ok(paths
        .iter()
        .map(|path| path.to_string_lossy().into_owned())
        .collect())
}

pub struct StatusDbusClient {
    connection: Connection,
}

impl StatusDbusClient {
    pub fn connect_session() -> Result<Self, ClientError> {
        Ok(Self {
            connection: Connection::session()?,
        })
    }

    fn proxy(&self) -> Result<Proxy<'_>, ClientError> {
        Ok(Proxy::new(
            &self.connection,
            DBUS_NAME_STATUS,
            DBUS_OBJECT_PATH_STATUS,
            DBUS_INTERFACE_STATUS,
        )?)
    }

    pub fn config_file_name(&self) -> Result<String, ClientError> {
        Ok(self.proxy()?.call("ConfigFileName", &())?)
    }

    /// Rescans `directory`; returns the number of records seen.
    pub fn scan(&self, directory: &Path) -> Result<u32, ClientError> {
        let directory = directory.to_string_lossy();
        Ok(self.proxy()?.call("Scan", &(&*directory,))?)
    }

    pub fn version_of(&self, path: &Path) -> Result<ItemVersion, ClientError> {
        let path = path.to_string_lossy();
        let version: String = self.proxy()?.call("GetVersion", &(&*path,))?;
        Ok(ItemVersion::parse(&version))
    }

    pub fn run_batch(&self, operation: &str, paths: &[PathBuf]) -> Result<(), ClientError> {
        let paths = path_strings(paths)?;
        self.proxy()?.call_method("RunBatch", &(operation, paths))?;
        Ok(())
    }

    pub fn diff(&self, paths: &[PathBuf], revision: &str) -> Result<(), ClientError> {
        let paths = path_strings(paths)?;
        self.proxy()?.call_method("Diff", &(paths, revision))?;
        Ok(())
    }

    pub fn is_busy(&self) -> Result<bool, ClientError> {
        Ok(self.proxy()?.call("IsBusy", &())?)
    }

    pub fn pending(&self) -> Result<Pending, ClientError> {
        let proxy = self.proxy()?;
        Ok(Pending {
            batch: proxy.call("IsBatchRunning", &())?,
            diff: proxy.call("IsDiffRunning", &())?,
        })
    }

    pub fn perform_action(&self, action: FileAction, paths: &[PathBuf]) -> Result<(), ClientError> {
        match action.diff_revision() {
            Some(revision) => self.diff(paths, revision),
            None => self.run_batch(action.id(), paths),
        }
    }

    pub fn menu_for_files(&self, paths: &[PathBuf]) -> Result<Vec<MenuItemSpec>, ClientError> {
        let versions = paths
            .iter()
            .map(|path| self.version_of(path))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(file_actions(&versions, self.pending()?))
    }

    pub fn menu_for_directory(&self, directory: &Path) -> Result<Vec<MenuItemSpec>, ClientError> {
        let has_entry = self.version_of(directory)? != ItemVersion::Unversioned;
        Ok(directory_actions(has_entry, self.pending()?))
    }

    pub fn subscribe_signals(&self) -> Result<SignalListener, ClientError> {
        let proxy = self.proxy()?;
        let iter = proxy.receive_all_signals()?;
        Ok(SignalListener { iter })
    }
}

pub struct SignalListener {
    iter: SignalIterator<'static>,
}

impl SignalListener {
    pub fn next_event(&mut self) -> Result<Option<StatusSignalEvent>, ClientError> {
        let Some(message) = self.iter.next() else {
            return Ok(None);
        };
        parse_signal_event(&message).map(Some)
    }
}

fn parse_signal_event(message: &Message) -> Result<StatusSignalEvent, ClientError> {
    let member = message
        .header()
        .member()
        .map(|member| member.as_str().to_string())
        .unwrap_or_default();

    match member.as_str() {
        "InfoMessage" => {
            let text: String = message.body().deserialize()?;
            Ok(StatusSignalEvent::Info(text))
        }
        "ErrorMessage" => {
            let text: String = message.body().deserialize()?;
            Ok(StatusSignalEvent::Error(text))
        }
        "OperationCompleted" => {
            let text: String = message.body().deserialize()?;
            Ok(StatusSignalEvent::OperationCompleted(text))
        }
        "ItemVersionsChanged" => Ok(StatusSignalEvent::ItemVersionsChanged),
        other => Err(ClientError::UnsupportedSignal(other.to_string())),
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
