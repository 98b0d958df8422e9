use std::path::PathBuf;

/// Kind of a tracked filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Symlink,
    Directory,
}

/// Metadata recorded for every tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// Modification time in milliseconds since the epoch.
    pub mtime_ms: u64,
    pub size: u64,
    pub kind: FileKind,
}

/// What happened to a path.
///
/// `Touch` subsumes both creation and modification; consumers that need to
/// tell the two apart disambiguate against their own tracking set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Touch,
    Delete,
}

/// A change delivered to file-map subscribers.
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub kind: FileEventKind,
    /// Absolute path of the affected file.
    pub path: PathBuf,
    /// The watch root the path belongs to.
    pub root: PathBuf,
    /// Present for `Touch`, absent for `Delete`.
    pub metadata: Option<FileMetadata>,
}

impl FileEvent {
    /// Path relative to its watch root, for display.
    pub fn relative_path(&self) -> &std::path::Path {
        self.path.strip_prefix(&self.root).unwrap_or(&self.path)
    }
}

/// Non-fatal watcher trouble, delivered on the error channel.
///
/// Graphs keep serving from their last known snapshot when one of these
/// arrives; the health check may decide to restart the backend.
#[derive(Debug, Clone)]
pub struct WatcherIncident {
    pub message: String,
}

impl WatcherIncident {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
