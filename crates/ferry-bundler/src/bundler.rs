//! Revision bookkeeping over live graphs.

use std::collections::hash_map::Entry;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Weak};

use ferry_cache::LayeredCache;
use ferry_filemap::{spawn_health_check, FileMap, FileMapConfig};
use ferry_graph::{Delta, Graph, Module, ModuleIdFactory, ModulePath};
use ferry_resolver::{OsFileLookup, Resolver};
use ferry_transform::{JsTransformer, WorkerPool, WorkerPoolConfig};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::errors::BundleError;
use crate::events::EventBatch;
use crate::graph_engine::GraphEngine;
use crate::options::{normalize_options, BundlerOptions, GraphOptions, NormalizedOptions};

/// How many committed deltas each graph keeps for `get_delta(since)`.
const JOURNAL_CAPACITY: usize = 16;

/// Identity of one `(entry, options)` graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphId(String);

impl GraphId {
    fn compute(entry: &ModulePath, options: &GraphOptions) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(entry.path_string().as_bytes());
        hasher.update(&[0]);
        hasher.update(options.platform.as_deref().unwrap_or("").as_bytes());
        hasher.update(&[
            u8::from(options.dev),
            u8::from(options.hot),
            u8::from(options.minify),
            u8::from(options.inline_requires),
        ]);
        for (key, value) in &options.custom_transform_options {
            hasher.update(key.as_bytes());
            hasher.update(&[0]);
            hasher.update(value.as_bytes());
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of a (possibly deduplicated) initial build.
#[derive(Debug, Clone)]
pub struct GraphHandle {
    pub graph_id: GraphId,
    pub revision_id: u64,
}

/// Pushed to change listeners after every update attempt.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// A delta was committed under a new revision.
    Delta {
        revision_id: u64,
        delta: Arc<Delta>,
    },
    /// The batch failed; the graph still serves its previous revision.
    Failed { message: String },
}

struct RevisionState {
    graph: Graph,
    revision_id: u64,
    /// `(revision, delta)` pairs: the delta committed *at* that revision.
    journal: VecDeque<(u64, Delta)>,
}

struct GraphState {
    entry: ModulePath,
    options: GraphOptions,
    /// One writer at a time; readers snapshot under the same lock.
    revision: tokio::sync::Mutex<RevisionState>,
    changes: broadcast::Sender<ChangeEvent>,
}

type BuildOutcome = Result<GraphHandle, Arc<BundleError>>;

struct BundlerInner {
    options: Arc<NormalizedOptions>,
    engine: GraphEngine,
    file_map: Arc<FileMap>,
    graphs: RwLock<FxHashMap<GraphId, Arc<GraphState>>>,
    inflight: Mutex<FxHashMap<GraphId, Vec<oneshot::Sender<BuildOutcome>>>>,
}

/// Serves build / delta / subscription queries over a set of live graphs.
/// Cheap to clone.
///
/// Feed event batches explicitly with [`IncrementalBundler::process_batch`]
/// or call [`IncrementalBundler::watch`] to pump the file map into every
/// live graph.
#[derive(Clone)]
pub struct IncrementalBundler {
    inner: Arc<BundlerInner>,
}

impl IncrementalBundler {
    pub fn new(options: BundlerOptions) -> Self {
        let options = Arc::new(normalize_options(options));

        // `resetCache: true` means every configured store is ignored for
        // this process; the disabled cache misses on every get.
        let cache = if options.reset_cache {
            info!("resetCache is set; ignoring all cache stores");
            LayeredCache::default()
        } else {
            LayeredCache::new(options.cache_stores.clone())
        };

        let resolver = Arc::new(Resolver::new(
            options.project_root.clone(),
            options.resolver.clone(),
            Arc::new(OsFileLookup),
        ));

        let pool = WorkerPool::new(
            Arc::new(JsTransformer::new()),
            WorkerPoolConfig {
                workers: options.transformer.workers,
                sticky_workers: options.transformer.sticky_workers,
                timeout: options.transformer.timeout,
            },
        );

        let ids = Arc::new(ModuleIdFactory::new());
        let engine = GraphEngine::new(Arc::clone(&options), resolver, pool, cache, ids);

        let mut file_map_config = FileMapConfig::new(options.watch_folders.clone());
        file_map_config.extensions = options.tracked_extensions();
        let file_map = Arc::new(FileMap::new(file_map_config));

        Self {
            inner: Arc::new(BundlerInner {
                options,
                engine,
                file_map,
                graphs: RwLock::new(FxHashMap::default()),
                inflight: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    pub fn file_map(&self) -> &Arc<FileMap> {
        &self.inner.file_map
    }

    /// Build (or reuse) the graph for `(entry, options)`.
    ///
    /// Exactly one traversal runs per graph ID: concurrent callers with equal
    /// arguments share the in-flight build, and a caller that cancels simply
    /// stops waiting — the build itself keeps running for the others.
    pub async fn build_graph(&self, entry: &Path, options: GraphOptions) -> BuildOutcome {
        let entry = self.entry_path(entry).map_err(Arc::new)?;
        let graph_id = GraphId::compute(&entry, &options);

        let existing = self.inner.graphs.read().get(&graph_id).cloned();
        if let Some(state) = existing {
            let revision_id = state.revision.lock().await.revision_id;
            return Ok(GraphHandle {
                graph_id,
                revision_id,
            });
        }

        let rx = {
            let mut inflight = self.inner.inflight.lock();
            let (tx, rx) = oneshot::channel();
            match inflight.entry(graph_id.clone()) {
                Entry::Occupied(mut occupied) => {
                    occupied.get_mut().push(tx);
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(vec![tx]);
                    let bundler = self.clone();
                    let graph_id = graph_id.clone();
                    tokio::spawn(async move {
                        let outcome =
                            bundler.drive_initial_build(&graph_id, entry, options).await;
                        let waiters = bundler
                            .inner
                            .inflight
                            .lock()
                            .remove(&graph_id)
                            .unwrap_or_default();
                        for waiter in waiters {
                            let _ = waiter.send(outcome.clone());
                        }
                    });
                }
            }
            rx
        };

        rx.await
            .unwrap_or_else(|_| Err(Arc::new(BundleError::GraphClosed)))
    }

    async fn drive_initial_build(
        &self,
        graph_id: &GraphId,
        entry: ModulePath,
        options: GraphOptions,
    ) -> BuildOutcome {
        // A build that finished between the caller's registry check and the
        // in-flight registration must not be redone.
        let existing = self.inner.graphs.read().get(graph_id).cloned();
        if let Some(state) = existing {
            let revision_id = state.revision.lock().await.revision_id;
            return Ok(GraphHandle {
                graph_id: graph_id.clone(),
                revision_id,
            });
        }

        debug!(graph = %graph_id, entry = %entry, "initial build");
        let graph = self
            .inner
            .engine
            .build_graph(&entry, &options)
            .await
            .map_err(Arc::new)?;

        let (changes, _) = broadcast::channel(32);
        let state = Arc::new(GraphState {
            entry,
            options,
            revision: tokio::sync::Mutex::new(RevisionState {
                graph,
                revision_id: 0,
                journal: VecDeque::new(),
            }),
            changes,
        });
        self.inner.graphs.write().insert(graph_id.clone(), state);

        Ok(GraphHandle {
            graph_id: graph_id.clone(),
            revision_id: 0,
        })
    }

    /// Apply one coalesced batch to every live graph.
    ///
    /// Each graph commits independently: a failing graph broadcasts
    /// `ChangeEvent::Failed` and keeps its previous revision; the others
    /// proceed.
    pub async fn process_batch(&self, batch: &EventBatch) {
        if batch.is_empty() {
            return;
        }

        let graphs: Vec<(GraphId, Arc<GraphState>)> = self
            .inner
            .graphs
            .read()
            .iter()
            .map(|(id, state)| (id.clone(), Arc::clone(state)))
            .collect();

        for (graph_id, state) in graphs {
            let mut revision = state.revision.lock().await;
            match self
                .inner
                .engine
                .apply_update(&revision.graph, batch, &state.options)
                .await
            {
                Ok((staged, delta)) => {
                    if delta.is_empty() {
                        continue;
                    }
                    revision.graph = staged;
                    revision.revision_id += 1;
                    let revision_id = revision.revision_id;
                    revision.journal.push_back((revision_id, delta.clone()));
                    while revision.journal.len() > JOURNAL_CAPACITY {
                        revision.journal.pop_front();
                    }
                    debug!(
                        graph = %graph_id,
                        revision = revision.revision_id,
                        added = delta.added.len(),
                        modified = delta.modified.len(),
                        deleted = delta.deleted.len(),
                        "committed delta"
                    );
                    let _ = state.changes.send(ChangeEvent::Delta {
                        revision_id: revision.revision_id,
                        delta: Arc::new(delta),
                    });
                }
                Err(err) => {
                    warn!(graph = %graph_id, error = %err, "update failed; keeping previous revision");
                    let _ = state.changes.send(ChangeEvent::Failed {
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    /// The delta from `since` to the current revision.
    ///
    /// `None` or a revision the journal no longer covers yields a
    /// `reset = true` delta carrying the full snapshot.
    pub async fn get_delta(
        &self,
        graph_id: &GraphId,
        since: Option<u64>,
    ) -> Result<(u64, Delta), BundleError> {
        let state = self.graph_state(graph_id)?;
        let revision = state.revision.lock().await;

        let current = revision.revision_id;
        if let Some(since) = since {
            if since == current {
                return Ok((current, Delta::default()));
            }
            let oldest_available = revision.journal.front().map(|(rev, _)| *rev);
            let covered =
                since < current && oldest_available.is_some_and(|oldest| oldest <= since + 1);
            if covered {
                let mut composed = Delta::default();
                for (rev, delta) in &revision.journal {
                    if *rev > since {
                        composed = composed.compose(delta.clone());
                    }
                }
                return Ok((current, composed));
            }
        }

        let snapshot: Vec<Module> = revision.graph.modules().cloned().collect();
        Ok((current, Delta::reset_with(snapshot)))
    }

    /// Listen for committed deltas and failed updates on a graph.
    pub fn subscribe_changes(
        &self,
        graph_id: &GraphId,
    ) -> Result<broadcast::Receiver<ChangeEvent>, BundleError> {
        Ok(self.graph_state(graph_id)?.changes.subscribe())
    }

    /// Snapshot of every module in the graph, for the serializer.
    pub async fn graph_modules(&self, graph_id: &GraphId) -> Result<Vec<Module>, BundleError> {
        let state = self.graph_state(graph_id)?;
        let revision = state.revision.lock().await;
        Ok(revision.graph.modules().cloned().collect())
    }

    pub async fn revision_id(&self, graph_id: &GraphId) -> Result<u64, BundleError> {
        let state = self.graph_state(graph_id)?;
        let revision_id = state.revision.lock().await.revision_id;
        Ok(revision_id)
    }

    /// The entry path a graph was built from.
    pub fn graph_entry(&self, graph_id: &GraphId) -> Result<ModulePath, BundleError> {
        Ok(self.graph_state(graph_id)?.entry.clone())
    }

    /// Release a graph: drops its revision state and delta journal.
    pub fn end_graph(&self, graph_id: &GraphId) -> bool {
        self.inner.graphs.write().remove(graph_id).is_some()
    }

    /// Start the file map and pump debounced event batches into every live
    /// graph until the bundler is dropped.
    pub async fn watch(&self) -> Result<(), BundleError> {
        self.inner.file_map.start().await?;

        if self.inner.options.watcher.health_check.enabled {
            spawn_health_check(
                Arc::clone(&self.inner.file_map),
                self.inner.options.watcher.health_check.clone(),
                self.inner.options.watch_folders.clone(),
            );
        }

        let mut subscription = self.inner.file_map.subscribe_all();
        let debounce = self.inner.options.debounce();
        let weak: Weak<BundlerInner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            loop {
                let Some(first) = subscription.recv().await else { break };
                let mut batch = EventBatch::new();
                batch.push(&first.path, first.kind);

                // Quiet-window coalescing: keep absorbing events until the
                // stream pauses.
                loop {
                    match tokio::time::timeout(debounce, subscription.recv()).await {
                        Ok(Some(event)) => batch.push(&event.path, event.kind),
                        Ok(None) => return,
                        Err(_) => break,
                    }
                }

                let Some(inner) = weak.upgrade() else { break };
                let bundler = IncrementalBundler { inner };
                bundler.process_batch(&batch).await;
            }
        });

        Ok(())
    }

    /// Stop watching and release every graph.
    pub async fn close(&self) -> Result<(), BundleError> {
        self.inner.file_map.close().await?;
        self.inner.graphs.write().clear();
        Ok(())
    }

    fn graph_state(&self, graph_id: &GraphId) -> Result<Arc<GraphState>, BundleError> {
        self.inner
            .graphs
            .read()
            .get(graph_id)
            .cloned()
            .ok_or_else(|| BundleError::UnknownGraph(graph_id.to_string()))
    }

    fn entry_path(&self, entry: &Path) -> Result<ModulePath, BundleError> {
        if entry.is_absolute() {
            Ok(ModulePath::new(entry)?)
        } else {
            Ok(ModulePath::under_root(
                &self.inner.options.project_root,
                entry,
            )?)
        }
    }
}
