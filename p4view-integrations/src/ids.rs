pub const DBUS_NAME_STATUS: &str = "org.p4view.Status1";
pub const DBUS_INTERFACE_STATUS: &str = "org.p4view.Status1";
pub const DBUS_OBJECT_PATH_STATUS: &str = "/org/p4view/Status1";

pub const DBUS_ERROR_BUSY: &str = "org.p4view.Status1.Error.Busy";
pub const DBUS_ERROR_INVALID_PATH: &str = "org.p4view.Status1.Error.InvalidPath";
pub const DBUS_ERROR_INVALID_OPERATION: &str = "org.p4view.Status1.Error.InvalidOperation";
pub const DBUS_ERROR_FAILED: &str = "org.p4view.Status1.Error.Failed";

pub const DEFAULT_PROGRAM: &str = "p4";
pub const DEFAULT_CONFIG_FILE_NAME: &str = "p4config.txt";
pub const DEFAULT_DIFF_VIEWER: &str = "kompare";

/// Revision labels accepted by the `Diff` method.
pub const DIFF_REVISION_HAVE: &str = "have";
pub const DIFF_REVISION_HEAD: &str = "head";
