async fn forward_events(
    emitter: SignalEmitter<'static>,
    mut events: mpsc::UnboundedReceiver<PluginEvent>,
) {
    while let Some(event) = events.recv().await {
        log::debug!("signal {event:?}");
        if let Err(err) = emit_event(&emitter, &event).await {
            log::warn!("failed to emit signal: {err}");
        }
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_string_env(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// One `version<TAB>path` line per file, sorted by path.
pub fn format_entries(tree: &VersionTree) -> Vec<String> {
    let mut files: Vec<_> = tree.files().collect();
    files.sort_by(|a, b| a.0.cmp(b.0));
    files
        .into_iter()
        .map(|(path, version)| format!("{}\t{}", version.as_str(), path.display()))
        .collect()
}
