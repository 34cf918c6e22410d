use std::path::{Path, PathBuf};
use std::sync::Arc;

use p4view_integrations::ids::{
    DBUS_ERROR_BUSY, DBUS_ERROR_FAILED, DBUS_ERROR_INVALID_OPERATION, DBUS_ERROR_INVALID_PATH,
};
use thiserror::Error;
use zbus::{interface, object_server::SignalEmitter};

use crate::events::PluginEvent;
use crate::p4::command::{BatchOperation, BatchTarget, DiffRevision};
use crate::p4::diff::{DiffError, DiffPipeline};
use crate::p4::executor::{BatchError, BatchExecutor};
use crate::p4::scan::StatusService;

#[derive(Debug, Error)]
pub enum DbusServiceError {
    #[error("operation in progress")]
    Busy,
    #[error("invalid path")]
    InvalidPath,
    #[error("unknown operation")]
    InvalidOperation,
    #[error("no workspace has been scanned")]
    NotScanned,
    #[error("operation failed")]
    Failed,
}

pub fn dbus_error_name(err: &DbusServiceError) -> &'static str {
    match err {
        DbusServiceError::Busy => DBUS_ERROR_BUSY,
        DbusServiceError::InvalidPath => DBUS_ERROR_INVALID_PATH,
        DbusServiceError::InvalidOperation => DBUS_ERROR_INVALID_OPERATION,
        DbusServiceError::NotScanned | DbusServiceError::Failed => DBUS_ERROR_FAILED,
    }
}

fn map_to_fdo(err: DbusServiceError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(format!("{}: {}", dbus_error_name(&err), err))
}

fn map_batch_error(err: BatchError) -> zbus::fdo::Error {
    match err {
        BatchError::Busy => map_to_fdo(DbusServiceError::Busy),
        BatchError::NoTargets => map_to_fdo(DbusServiceError::InvalidPath),
        _ => map_to_fdo(DbusServiceError::Failed),
    }
}

fn map_diff_error(err: DiffError) -> zbus::fdo::Error {
    match err {
        DiffError::Busy => map_to_fdo(DbusServiceError::Busy),
        DiffError::NoTargets => map_to_fdo(DbusServiceError::InvalidPath),
        _ => map_to_fdo(DbusServiceError::Failed),
    }
}

fn absolute_path(path: &str) -> Result<PathBuf, DbusServiceError> {
    let path = Path::new(path);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Err(DbusServiceError::InvalidPath)
    }
}

pub struct StatusDbusService {
    status: Arc<StatusService>,
    executor: Arc<BatchExecutor>,
    diff: Arc<DiffPipeline>,
    config_file_name: String,
}

impl StatusDbusService {
    pub fn new(
        status: Arc<StatusService>,
        executor: Arc<BatchExecutor>,
        diff: Arc<DiffPipeline>,
        config_file_name: impl Into<String>,
    ) -> Self {
        Self {
            status,
            executor,
            diff,
            config_file_name: config_file_name.into(),
        }
    }

    async fn targets(paths: &[String]) -> Result<Vec<BatchTarget>, DbusServiceError> {
        if paths.is_empty() {
            return Err(DbusServiceError::InvalidPath);
        }
        let mut targets = Vec::with_capacity(paths.len());
        for path in paths {
            targets.push(BatchTarget::resolve(absolute_path(path)?).await);
        }
        Ok(targets)
    }

    async fn workspace_root(&self) -> Result<PathBuf, DbusServiceError> {
        self.status
            .workspace_root()
            .await
            .ok_or(DbusServiceError::NotScanned)
    }
}

#[interface(name = "org.p4view.Status1")]
impl StatusDbusService {
    async fn config_file_name(&self) -> String {
        self.config_file_name.clone()
    }

    async fn scan(&self, directory: &str) -> zbus::fdo::Result<u32> {
        let directory = absolute_path(directory).map_err(map_to_fdo)?;
        log::debug!("dbus Scan directory={}", directory.display());
        let records = self
            .status
            .scan(&directory)
            .await
            .map_err(|err| zbus::fdo::Error::Failed(format!("{DBUS_ERROR_FAILED}: {err}")))?;
        Ok(u32::try_from(records).unwrap_or(u32::MAX))
    }

    async fn get_version(&self, path: &str) -> zbus::fdo::Result<String> {
        let path = absolute_path(path).map_err(map_to_fdo)?;
        Ok(self.status.lookup(&path).await.as_str().to_string())
    }

    async fn run_batch(&self, operation: &str, paths: Vec<String>) -> zbus::fdo::Result<()> {
        let operation = BatchOperation::parse(operation)
            .ok_or(DbusServiceError::InvalidOperation)
            .map_err(map_to_fdo)?;
        let targets = Self::targets(&paths).await.map_err(map_to_fdo)?;
        let root = self.workspace_root().await.map_err(map_to_fdo)?;
        log::debug!("dbus RunBatch operation={} paths={}", operation.id(), paths.len());
        let running = self
            .executor
            .begin(operation, root, targets)
            .map_err(map_batch_error)?;
        tokio::spawn(async move {
            let _ = running.drive().await;
        });
        Ok(())
    }

    async fn diff(&self, paths: Vec<String>, revision: &str) -> zbus::fdo::Result<()> {
        let revision = DiffRevision::parse(revision)
            .ok_or(DbusServiceError::InvalidOperation)
            .map_err(map_to_fdo)?;
        let targets = Self::targets(&paths).await.map_err(map_to_fdo)?;
        let root = self.workspace_root().await.map_err(map_to_fdo)?;
        log::debug!("dbus Diff revision={revision:?} paths={}", paths.len());
        let pending = self
            .diff
            .begin(root, targets, revision)
            .map_err(map_diff_error)?;
        tokio::spawn(async move {
            let _ = pending.run().await;
        });
        Ok(())
    }

    /// True while either pipeline has work in flight.
    async fn is_busy(&self) -> bool {
        self.executor.is_running() || self.diff.is_running()
    }

    async fn is_batch_running(&self) -> bool {
        self.executor.is_running()
    }

    async fn is_diff_running(&self) -> bool {
        self.diff.is_running()
    }

    #[zbus(signal)]
    pub async fn info_message(ctxt: &SignalEmitter<'_>, text: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn error_message(ctxt: &SignalEmitter<'_>, text: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn operation_completed(ctxt: &SignalEmitter<'_>, text: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn item_versions_changed(ctxt: &SignalEmitter<'_>) -> zbus::Result<()>;
}

/// Forwards one owner event as the matching D-Bus signal.
pub async fn emit_event(emitter: &SignalEmitter<'_>, event: &PluginEvent) -> zbus::Result<()> {
    match event {
        PluginEvent::Info(text) => StatusDbusService::info_message(emitter, text).await,
        PluginEvent::Error(text) => StatusDbusService::error_message(emitter, text).await,
        PluginEvent::OperationCompleted(text) => {
            StatusDbusService::operation_completed(emitter, text).await
        }
        PluginEvent::ItemVersionsChanged => StatusDbusService::item_versions_changed(emitter).await,
    }
}
