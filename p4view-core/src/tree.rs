use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::status::StatusRecord;
use crate::version::{ItemVersion, classify};

/// Per-file versions plus the directory versions derived from them.
///
/// Directory entries are never written directly: every `apply` propagates
/// the collapsed file state to each ancestor from the nearest one up to and
/// including `root`. A directory always holds the highest-priority collapsed
/// state among its descendants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionTree {
    root: PathBuf,
    files: HashMap<PathBuf, ItemVersion>,
    directories: HashMap<PathBuf, ItemVersion>,
}

impl VersionTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: HashMap::new(),
            directories: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reset(&mut self) {
        self.files.clear();
        self.directories.clear();
    }

    /// Records the version of a file and updates its ancestors.
    pub fn apply(&mut self, path: impl Into<PathBuf>, version: ItemVersion) {
        if version == ItemVersion::Unversioned {
            return;
        }
        let path = path.into();
        let previous = self.files.insert(path.clone(), version);
        match previous {
            Some(previous) if previous == version => {}
            // A lower state could no longer be seen through a max-merge.
            Some(_) => self.rebuild_directories(),
            None => self.propagate(&path, version),
        }
    }

    /// Classifies `record` and applies the result.
    pub fn apply_record(&mut self, record: &StatusRecord) -> ItemVersion {
        let version = classify(record);
        self.apply(record.path.clone(), version);
        version
    }

    fn propagate(&mut self, path: &Path, version: ItemVersion) {
        let collapsed = version.collapsed_for_directory();
        for dir in path.ancestors().skip(1) {
            if !dir.starts_with(&self.root) {
                break;
            }
            match self.directories.get_mut(dir) {
                None => {
                    self.directories.insert(dir.to_path_buf(), collapsed);
                }
                // Every ancestor above an existing entry already holds at
                // least that entry's state.
                Some(current) if current.priority() >= collapsed.priority() => break,
                Some(current) => *current = collapsed,
            }
        }
    }

    /// Recomputes every directory entry from the file entries.
    pub fn rebuild_directories(&mut self) {
        self.directories.clear();
        let files: Vec<(PathBuf, ItemVersion)> = self
            .files
            .iter()
            .map(|(path, version)| (path.clone(), *version))
            .collect();
        for (path, version) in files {
            self.propagate(&path, version);
        }
    }

    /// File entry, else directory entry, else `Unversioned`.
    pub fn lookup(&self, path: &Path) -> ItemVersion {
        self.files
            .get(path)
            .or_else(|| self.directories.get(path))
            .copied()
            .unwrap_or(ItemVersion::Unversioned)
    }

    pub fn contains_directory(&self, path: &Path) -> bool {
        self.directories.contains_key(path)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    pub fn files(&self) -> impl Iterator<Item = (&Path, ItemVersion)> {
        self.files
            .iter()
            .map(|(path, version)| (path.as_path(), *version))
    }

    pub fn directories(&self) -> impl Iterator<Item = (&Path, ItemVersion)> {
        self.directories
            .iter()
            .map(|(path, version)| (path.as_path(), *version))
    }
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
