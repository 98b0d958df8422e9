//! Watch backends.
//!
//! A backend is the thinnest possible port over an OS notification API:
//! `watch(root, sink)` starts reporting paths that may have changed, and
//! `stop()` tears the registration down. The sink receives bare paths — the
//! file map classifies them by `lstat` afterwards, so backends never need to
//! interpret event kinds themselves.

use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::file_map::FileMapError;

/// Sink for raw change reports from a backend.
pub type PathSink = Box<dyn Fn(PathBuf) + Send + Sync>;

/// Port over a platform watch facility.
pub trait WatchBackend: Send {
    /// Begin watching `root` recursively, reporting changed paths to `sink`.
    fn watch(&mut self, root: &Path, sink: PathSink) -> Result<(), FileMapError>;

    /// Stop watching and release platform resources.
    ///
    /// Must not return before the backend has stopped invoking the sink:
    /// the file map relies on this handshake instead of a fixed cooldown.
    fn stop(&mut self) -> Result<(), FileMapError>;
}

/// Default backend built on the `notify` crate.
pub struct NotifyBackend {
    watcher: Option<RecommendedWatcher>,
    root: Option<PathBuf>,
}

impl NotifyBackend {
    pub fn new() -> Self {
        Self {
            watcher: None,
            root: None,
        }
    }
}

impl Default for NotifyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchBackend for NotifyBackend {
    fn watch(&mut self, root: &Path, sink: PathSink) -> Result<(), FileMapError> {
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    for path in event.paths {
                        sink(path);
                    }
                }
            })
            .map_err(FileMapError::Watch)?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(FileMapError::Watch)?;

        self.watcher = Some(watcher);
        self.root = Some(root.to_path_buf());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), FileMapError> {
        if let (Some(mut watcher), Some(root)) = (self.watcher.take(), self.root.take()) {
            let _ = watcher.unwatch(&root);
            // Dropping the watcher joins its event thread, which is the
            // shutdown handshake: after this point the sink can no longer be
            // invoked.
            drop(watcher);
        }
        Ok(())
    }
}
