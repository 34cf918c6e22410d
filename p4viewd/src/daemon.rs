use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use p4view_core::VersionTree;
use p4view_integrations::ids::{
    DBUS_NAME_STATUS, DBUS_OBJECT_PATH_STATUS, DEFAULT_CONFIG_FILE_NAME, DEFAULT_DIFF_VIEWER,
    DEFAULT_PROGRAM,
};
use tokio::sync::mpsc;
use zbus::connection::Builder as ConnectionBuilder;
use zbus::object_server::SignalEmitter;

use crate::dbus_api::{StatusDbusService, emit_event};
use crate::events::{EventSink, PluginEvent};
use crate::p4::diff::DiffPipeline;
use crate::p4::executor::BatchExecutor;
use crate::p4::runner::{ProcessRunner, TokioRunner};
use crate::p4::scan::StatusService;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DaemonConfig {
    pub program: String,
    pub config_file_name: String,
    pub diff_viewer: String,
    pub scan_on_start: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            config_file_name: DEFAULT_CONFIG_FILE_NAME.to_string(),
            diff_viewer: DEFAULT_DIFF_VIEWER.to_string(),
            scan_on_start: None,
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let program = read_string_env("P4VIEW_PROGRAM", DEFAULT_PROGRAM);
        let config_file_name = read_string_env("P4CONFIG", DEFAULT_CONFIG_FILE_NAME);
        let diff_viewer = read_string_env("P4VIEW_DIFF_VIEWER", DEFAULT_DIFF_VIEWER);
        let scan_on_start = match std::env::var("P4VIEW_SCAN_ON_START") {
            Ok(value) if !value.trim().is_empty() => {
                let home = dirs::home_dir().context("home directory is unavailable")?;
                Some(expand_with_home(value.trim(), &home))
            }
            _ => None,
        };

        Ok(Self {
            program,
            config_file_name,
            diff_viewer,
            scan_on_start,
        })
    }
}

pub struct DaemonRuntime {
    config: DaemonConfig,
    status: Arc<StatusService>,
    executor: Arc<BatchExecutor>,
    diff: Arc<DiffPipeline>,
    events: mpsc::UnboundedReceiver<PluginEvent>,
}

impl DaemonRuntime {
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        Self::with_runner(config, Arc::new(TokioRunner))
    }

    pub fn with_runner(config: DaemonConfig, runner: Arc<dyn ProcessRunner>) -> anyhow::Result<Self> {
        if config.program.is_empty() {
            anyhow::bail!("version-control program name is empty");
        }
        if let Some(dir) = &config.scan_on_start
            && !dir.is_absolute()
        {
            anyhow::bail!("scan directory must be absolute: {}", dir.display());
        }
        let (sink, events) = EventSink::channel();
        let status = Arc::new(StatusService::new(
            Arc::clone(&runner),
            &config.program,
            sink.clone(),
        ));
        let executor = Arc::new(BatchExecutor::new(
            Arc::clone(&runner),
            &config.program,
            sink.clone(),
        ));
        let diff = Arc::new(DiffPipeline::new(
            runner,
            &config.program,
            &config.diff_viewer,
            sink,
        ));
        Ok(Self {
            config,
            status,
            executor,
            diff,
            events,
        })
    }

    pub fn status(&self) -> &Arc<StatusService> {
        &self.status
    }

    pub async fn run(self) -> anyhow::Result<()> {
        log::info!(
            "started: program={}, config_file={}, diff_viewer={}",
            self.config.program,
            self.config.config_file_name,
            self.config.diff_viewer
        );

        let service = StatusDbusService::new(
            Arc::clone(&self.status),
            Arc::clone(&self.executor),
            Arc::clone(&self.diff),
            self.config.config_file_name.clone(),
        );
        let dbus_connection = ConnectionBuilder::session()?
            .name(DBUS_NAME_STATUS)?
            .serve_at(DBUS_OBJECT_PATH_STATUS, service)?
            .build()
            .await
            .context("failed to start D-Bus object server")?;

        let signal_emitter = SignalEmitter::new(&dbus_connection, DBUS_OBJECT_PATH_STATUS)
            .context("failed to create D-Bus signal emitter")?
            .into_owned();
        let signal_handle = tokio::spawn(forward_events(signal_emitter, self.events));

        let scan_handle = self.config.scan_on_start.clone().map(|dir| {
            let status = Arc::clone(&self.status);
            tokio::spawn(async move {
                // Failures are logged and signalled by the status service.
                let _ = status.scan(&dir).await;
            })
        });

        tokio::signal::ctrl_c()
            .await
            .context("failed waiting for shutdown signal")?;
        log::info!("shutting down");

        signal_handle.abort();
        if let Some(handle) = scan_handle {
            handle.abort();
        }

        Ok(())
    }
}

/// Runs a single scan without the bus and returns the resulting tree.
pub async fn scan_once(config: &DaemonConfig, directory: &Path) -> anyhow::Result<VersionTree> {
    let runtime = DaemonRuntime::bootstrap(config.clone()).await?;
    runtime
        .status
        .scan(directory)
        .await
        .with_context(|| format!("failed to scan {}", directory.display()))?;
    Ok(runtime.status.snapshot().await)
}

include!("daemon_helpers.rs");

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
