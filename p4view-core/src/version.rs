use crate::status::StatusRecord;

/// Synchronization state of a workspace item relative to the depot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemVersion {
    Unversioned,
    Normal,
    UpdateRequired,
    LocallyModified,
    Added,
    Removed,
    Missing,
    Conflicting,
}

impl ItemVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemVersion::Unversioned => "unversioned",
            ItemVersion::Normal => "normal",
            ItemVersion::UpdateRequired => "update_required",
            ItemVersion::LocallyModified => "locally_modified",
            ItemVersion::Added => "added",
            ItemVersion::Removed => "removed",
            ItemVersion::Missing => "missing",
            ItemVersion::Conflicting => "conflicting",
        }
    }

    /// Unknown names map to `Unversioned`.
    pub fn parse(value: &str) -> Self {
        match value {
            "normal" => ItemVersion::Normal,
            "update_required" => ItemVersion::UpdateRequired,
            "locally_modified" => ItemVersion::LocallyModified,
            "added" => ItemVersion::Added,
            "removed" => ItemVersion::Removed,
            "missing" => ItemVersion::Missing,
            "conflicting" => ItemVersion::Conflicting,
            _ => ItemVersion::Unversioned,
        }
    }

    /// State a directory inherits from a descendant holding `self`.
    pub fn collapsed_for_directory(self) -> Self {
        match self {
            ItemVersion::Added | ItemVersion::Removed => ItemVersion::LocallyModified,
            ItemVersion::Missing => ItemVersion::UpdateRequired,
            other => other,
        }
    }

    /// Merge priority of a collapsed state; higher wins.
    pub fn priority(self) -> u8 {
        match self.collapsed_for_directory() {
            ItemVersion::Conflicting => 4,
            ItemVersion::UpdateRequired => 3,
            ItemVersion::LocallyModified => 2,
            ItemVersion::Normal => 1,
            _ => 0,
        }
    }

    /// True for states that mean the item is open in a pending change.
    pub fn is_being_edited(self) -> bool {
        matches!(
            self,
            ItemVersion::LocallyModified
                | ItemVersion::Conflicting
                | ItemVersion::Added
                | ItemVersion::Removed
        )
    }
}

/// Pending change type reported in the `action` field of a status record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Edit,
    Integrate,
    Add,
    MoveAdd,
    Import,
    Branch,
    Delete,
    MoveDelete,
    Purge,
    Archive,
    Other(String),
}

impl Action {
    pub fn parse(token: &str) -> Self {
        match token {
            "edit" => Action::Edit,
            "integrate" => Action::Integrate,
            "add" => Action::Add,
            "move/add" => Action::MoveAdd,
            "import" => Action::Import,
            "branch" => Action::Branch,
            "delete" => Action::Delete,
            "move/delete" => Action::MoveDelete,
            "purge" => Action::Purge,
            "archive" => Action::Archive,
            other => Action::Other(other.to_string()),
        }
    }
}

/// Maps a parsed status record to the version shown for the file.
///
/// An unresolved marker wins over every other field. Revisions only count
/// as diverging when both are reported. Unrecognized actions are logged and
/// degrade to `Normal`.
pub fn classify(record: &StatusRecord) -> ItemVersion {
    if record.unresolved {
        return ItemVersion::Conflicting;
    }

    let needs_update = match (&record.local_revision, &record.server_revision) {
        (Some(have), Some(head)) => !have.is_empty() && !head.is_empty() && have != head,
        _ => false,
    };

    let action = match record.action.as_deref() {
        None | Some("") => {
            return if needs_update {
                ItemVersion::UpdateRequired
            } else {
                ItemVersion::Normal
            };
        }
        Some(token) => Action::parse(token),
    };

    if needs_update {
        return ItemVersion::Conflicting;
    }

    match action {
        Action::Edit | Action::Integrate => ItemVersion::LocallyModified,
        Action::Add | Action::MoveAdd | Action::Import | Action::Branch => ItemVersion::Added,
        Action::Delete | Action::MoveDelete | Action::Purge => ItemVersion::Removed,
        Action::Archive => ItemVersion::Normal,
        Action::Other(token) => {
            log::warn!(
                "unknown action {token:?} for {}, treating as normal",
                record.path.display()
            );
            ItemVersion::Normal
        }
    }
}
