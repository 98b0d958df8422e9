use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::backend::{NotifyBackend, WatchBackend};
use crate::events::{FileEvent, FileEventKind, FileKind, FileMetadata, WatcherIncident};

/// File names with this prefix bypass the extension / dot-file filters so the
/// health check probe can observe its own round trip.
pub(crate) const HEALTH_PROBE_PREFIX: &str = "ferry-watch-probe-";

/// Errors from file-map operations.
#[derive(Debug, Error)]
pub enum FileMapError {
    #[error("watch root does not exist: {}", .0.display())]
    RootMissing(PathBuf),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("file map was closed")]
    Closed,
}

/// Configuration for a [`FileMap`].
#[derive(Debug, Clone)]
pub struct FileMapConfig {
    /// Roots crawled and watched recursively.
    pub roots: Vec<PathBuf>,
    /// Tracked file extensions (without the dot). Empty tracks everything.
    pub extensions: Vec<String>,
    /// Paths whose absolute form matches are invisible to the map.
    pub ignore: Option<Regex>,
    /// Track dot-files too. Off by default.
    pub include_dotfiles: bool,
}

impl FileMapConfig {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            extensions: Vec::new(),
            ignore: None,
            include_dotfiles: false,
        }
    }
}

type EventPredicate = Box<dyn Fn(&FileEvent) -> bool + Send + Sync>;

struct Subscriber {
    predicate: EventPredicate,
    tx: mpsc::UnboundedSender<FileEvent>,
}

/// A live subscription to file events matching a predicate.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<FileEvent>,
}

impl Subscription {
    /// Next matching event, or `None` once the file map is closed.
    pub async fn recv(&mut self) -> Option<FileEvent> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<FileEvent> {
        self.rx.try_recv().ok()
    }
}

struct Shared {
    config: FileMapConfig,
    files: RwLock<FxHashMap<PathBuf, FileMetadata>>,
    subscribers: RwLock<Vec<Subscriber>>,
    incidents: broadcast::Sender<WatcherIncident>,
}

/// Live index of the files under the watched roots.
pub struct FileMap {
    shared: Arc<Shared>,
    backends: Mutex<Vec<Box<dyn WatchBackend>>>,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
    started: Mutex<bool>,
}

impl FileMap {
    pub fn new(config: FileMapConfig) -> Self {
        let (incidents, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                config,
                files: RwLock::new(FxHashMap::default()),
                subscribers: RwLock::new(Vec::new()),
                incidents,
            }),
            backends: Mutex::new(Vec::new()),
            worker: Mutex::new(None),
            started: Mutex::new(false),
        }
    }

    /// Crawl all roots, then attach the default `notify` backend to each.
    ///
    /// Resolves when the initial crawl is complete; watching continues in the
    /// background. Crawl errors below the root level are reported on the
    /// incident channel and do not fail the start.
    pub async fn start(&self) -> Result<(), FileMapError> {
        self.start_with(|| Box::new(NotifyBackend::new())).await
    }

    /// Like [`FileMap::start`], with a caller-chosen backend per root.
    pub async fn start_with(
        &self,
        mut make_backend: impl FnMut() -> Box<dyn WatchBackend>,
    ) -> Result<(), FileMapError> {
        for root in &self.shared.config.roots {
            if !root.is_dir() {
                return Err(FileMapError::RootMissing(root.clone()));
            }
        }

        {
            let mut started = self.started.lock();
            if *started {
                return Ok(());
            }
            *started = true;
        }

        // Initial crawl on the blocking pool; the index is complete before
        // any watcher event is processed.
        let shared = Arc::clone(&self.shared);
        let crawled = tokio::task::spawn_blocking(move || {
            let mut files = FxHashMap::default();
            let mut incidents = Vec::new();
            for root in &shared.config.roots {
                crawl_dir(&shared.config, root, &mut files, &mut incidents);
            }
            (files, incidents)
        })
        .await
        .expect("crawl task must not panic");

        let (files, incidents) = crawled;
        debug!(files = files.len(), "initial crawl complete");
        *self.shared.files.write() = files;
        for incident in incidents {
            let _ = self.shared.incidents.send(incident);
        }

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<PathBuf>();

        {
            let mut backends = self.backends.lock();
            for root in &self.shared.config.roots {
                let mut backend = make_backend();
                let tx = raw_tx.clone();
                backend.watch(
                    root,
                    Box::new(move |path| {
                        let _ = tx.send(path);
                    }),
                )?;
                backends.push(backend);
            }
        }

        let shared = Arc::clone(&self.shared);
        let worker = tokio::spawn(async move {
            while let Some(path) = raw_rx.recv().await {
                handle_raw_path(&shared, &path);
            }
        });
        *self.worker.lock() = Some(worker);

        Ok(())
    }

    /// Deliver future events matching `predicate`.
    pub fn subscribe(
        &self,
        predicate: impl Fn(&FileEvent) -> bool + Send + Sync + 'static,
    ) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscribers.write().push(Subscriber {
            predicate: Box::new(predicate),
            tx,
        });
        Subscription { rx }
    }

    /// Subscribe to every event.
    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe(|_| true)
    }

    /// Receiver for non-fatal watcher incidents.
    pub fn incidents(&self) -> broadcast::Receiver<WatcherIncident> {
        self.shared.incidents.subscribe()
    }

    /// Publish an incident on the error channel.
    pub fn report_incident(&self, incident: WatcherIncident) {
        warn!(message = %incident.message, "watcher incident");
        let _ = self.shared.incidents.send(incident);
    }

    /// Metadata for a tracked path, or `None` if the map does not know it.
    pub fn stat(&self, path: &Path) -> Option<FileMetadata> {
        self.shared.files.read().get(path).copied()
    }

    /// Number of tracked files.
    pub fn len(&self) -> usize {
        self.shared.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.files.read().is_empty()
    }

    /// All tracked paths. Snapshot, unordered.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.shared.files.read().keys().cloned().collect()
    }

    /// Stop all backends and the event worker.
    ///
    /// Backends acknowledge shutdown before this returns, so no sink
    /// invocation can race past `close()`.
    pub async fn close(&self) -> Result<(), FileMapError> {
        let mut backends = std::mem::take(&mut *self.backends.lock());
        for backend in &mut backends {
            backend.stop()?;
        }

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.abort();
            let _ = worker.await;
        }

        self.shared.subscribers.write().clear();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn handle_path_for_test(&self, path: &Path) {
        handle_raw_path(&self.shared, path);
    }
}

/// Classify one raw backend report and update the index.
fn handle_raw_path(shared: &Shared, path: &Path) {
    let Some(root) = shared
        .config
        .roots
        .iter()
        .find(|root| path.starts_with(root))
    else {
        return;
    };

    if !passes_filter(&shared.config, path) {
        return;
    }

    match std::fs::symlink_metadata(path) {
        Ok(meta) => {
            let Some(metadata) = to_file_metadata(&meta) else {
                return; // directories are not tracked
            };
            shared.files.write().insert(path.to_path_buf(), metadata);
            emit(
                shared,
                FileEvent {
                    kind: FileEventKind::Touch,
                    path: path.to_path_buf(),
                    root: root.clone(),
                    metadata: Some(metadata),
                },
            );
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            // Only paths we have actually seen produce a delete; spurious
            // reports about unknown paths are dropped.
            if shared.files.write().remove(path).is_some() {
                emit(
                    shared,
                    FileEvent {
                        kind: FileEventKind::Delete,
                        path: path.to_path_buf(),
                        root: root.clone(),
                        metadata: None,
                    },
                );
            }
        }
        Err(err) => {
            if shared.files.read().contains_key(path) {
                let _ = shared.incidents.send(WatcherIncident::new(format!(
                    "lstat failed for tracked path {}: {err}",
                    path.display()
                )));
            }
            // An lstat failure for an untracked path is irrelevant.
        }
    }
}

fn emit(shared: &Shared, event: FileEvent) {
    let mut subscribers = shared.subscribers.write();
    subscribers.retain(|subscriber| {
        if !(subscriber.predicate)(&event) {
            return true;
        }
        subscriber.tx.send(event.clone()).is_ok()
    });
}

fn passes_filter(config: &FileMapConfig, path: &Path) -> bool {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if file_name.starts_with(HEALTH_PROBE_PREFIX) {
        return true;
    }

    if !config.include_dotfiles && file_name.starts_with('.') {
        return false;
    }

    if let Some(ignore) = &config.ignore {
        if ignore.is_match(&path.to_string_lossy()) {
            return false;
        }
    }

    if config.extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| config.extensions.iter().any(|e| e == ext))
}

fn to_file_metadata(meta: &std::fs::Metadata) -> Option<FileMetadata> {
    let kind = if meta.file_type().is_symlink() {
        FileKind::Symlink
    } else if meta.is_file() {
        FileKind::File
    } else if meta.is_dir() {
        return None;
    } else {
        FileKind::File
    };

    let mtime_ms = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    Some(FileMetadata {
        mtime_ms,
        size: meta.len(),
        kind,
    })
}

fn crawl_dir(
    config: &FileMapConfig,
    dir: &Path,
    files: &mut FxHashMap<PathBuf, FileMetadata>,
    incidents: &mut Vec<WatcherIncident>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            incidents.push(WatcherIncident::new(format!(
                "crawl failed for {}: {err}",
                dir.display()
            )));
            return;
        }
    };

    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();

        let Ok(meta) = std::fs::symlink_metadata(&path) else {
            continue;
        };

        if meta.is_dir() {
            let dir_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !config.include_dotfiles && dir_name.starts_with('.') {
                continue;
            }
            if let Some(ignore) = &config.ignore {
                if ignore.is_match(&path.to_string_lossy()) {
                    continue;
                }
            }
            crawl_dir(config, &path, files, incidents);
            continue;
        }

        if !passes_filter(config, &path) {
            continue;
        }
        if let Some(metadata) = to_file_metadata(&meta) {
            files.insert(path, metadata);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn config_for(root: &Path) -> FileMapConfig {
        let mut config = FileMapConfig::new(vec![root.to_path_buf()]);
        config.extensions = vec!["js".into(), "json".into()];
        config
    }

    struct NullBackend;

    impl WatchBackend for NullBackend {
        fn watch(
            &mut self,
            _root: &Path,
            _sink: crate::backend::PathSink,
        ) -> Result<(), FileMapError> {
            Ok(())
        }

        fn stop(&mut self) -> Result<(), FileMapError> {
            Ok(())
        }
    }

    async fn started_map(root: &Path) -> FileMap {
        let map = FileMap::new(config_for(root));
        map.start_with(|| Box::new(NullBackend)).await.unwrap();
        map
    }

    #[tokio::test]
    async fn crawl_indexes_matching_files() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.js", "1");
        write(tmp.path(), "nested/b.js", "2");
        write(tmp.path(), "c.txt", "ignored extension");
        write(tmp.path(), ".hidden.js", "dotfile");

        let map = started_map(tmp.path()).await;

        assert_eq!(map.len(), 2);
        assert!(map.stat(&tmp.path().join("a.js")).is_some());
        assert!(map.stat(&tmp.path().join("nested/b.js")).is_some());
        assert!(map.stat(&tmp.path().join("c.txt")).is_none());
        map.close().await.unwrap();
    }

    #[tokio::test]
    async fn touch_updates_index_and_notifies() {
        let tmp = TempDir::new().unwrap();
        let map = started_map(tmp.path()).await;
        let mut sub = map.subscribe_all();

        let path = write(tmp.path(), "new.js", "fresh");
        map.handle_path_for_test(&path);

        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind, FileEventKind::Touch);
        assert_eq!(event.path, path);
        assert!(event.metadata.is_some());
        assert!(map.stat(&path).is_some());
        map.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_of_unknown_path_is_suppressed() {
        let tmp = TempDir::new().unwrap();
        let map = started_map(tmp.path()).await;
        let mut sub = map.subscribe_all();

        // Never seen by the map, then reported as gone.
        map.handle_path_for_test(&tmp.path().join("ghost.js"));

        assert!(sub.try_recv().is_none());
        map.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_of_tracked_path_is_delivered() {
        let tmp = TempDir::new().unwrap();
        let path = write(tmp.path(), "gone.js", "soon");
        let map = started_map(tmp.path()).await;
        let mut sub = map.subscribe_all();

        std::fs::remove_file(&path).unwrap();
        map.handle_path_for_test(&path);

        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind, FileEventKind::Delete);
        assert!(map.stat(&path).is_none());
        map.close().await.unwrap();
    }

    #[tokio::test]
    async fn subscription_predicate_filters_events() {
        let tmp = TempDir::new().unwrap();
        let map = started_map(tmp.path()).await;
        let mut json_only = map.subscribe(|event| {
            event
                .path
                .extension()
                .is_some_and(|ext| ext == "json")
        });

        let js = write(tmp.path(), "a.js", "1");
        let json = write(tmp.path(), "pkg.json", "{}");
        map.handle_path_for_test(&js);
        map.handle_path_for_test(&json);

        let event = json_only.recv().await.unwrap();
        assert_eq!(event.path, json);
        assert!(json_only.try_recv().is_none());
        map.close().await.unwrap();
    }

    #[tokio::test]
    async fn ignore_regex_hides_paths() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "node_modules/dep/index.js", "x");
        write(tmp.path(), "src/app.js", "y");

        let mut config = config_for(tmp.path());
        config.ignore = Some(Regex::new(r"node_modules").unwrap());
        let map = FileMap::new(config);
        map.start_with(|| Box::new(NullBackend)).await.unwrap();

        assert_eq!(map.len(), 1);
        assert!(map.stat(&tmp.path().join("src/app.js")).is_some());
        map.close().await.unwrap();
    }

    #[tokio::test]
    async fn missing_root_fails_start() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        let map = FileMap::new(FileMapConfig::new(vec![missing.clone()]));

        let err = map.start_with(|| Box::new(NullBackend)).await.unwrap_err();
        assert!(matches!(err, FileMapError::RootMissing(p) if p == missing));
    }
}
