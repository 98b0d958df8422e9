//! Transform worker pool.
//!
//! Workers are isolated tasks speaking a request/response protocol: a job
//! carries the request plus a reply channel, a worker answers exactly once.
//! The pool deduplicates concurrent requests with equal `(path, options)`
//! keys, dispatches round-robin (sticky per path when configured), applies a
//! per-call soft timeout, and respawns a worker that crashed or stalled —
//! failing only the in-flight call assigned to it. A crashed call is retried
//! once before the error reaches callers.

use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::types::{TransformError, TransformOptions, TransformRequest, TransformedModule, Transformer};

type TransformOutcome = Result<TransformedModule, TransformError>;
type DedupKey = (PathBuf, TransformOptions);

/// Pool settings (`transformer.*` in the bundler config).
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub workers: usize,
    /// Route repeat requests for a path to the worker that served it last.
    pub sticky_workers: bool,
    /// Soft per-call timeout; expiry marks the worker unhealthy.
    pub timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            sticky_workers: true,
            timeout: Duration::from_secs(30),
        }
    }
}

struct Job {
    request: TransformRequest,
    reply: oneshot::Sender<TransformOutcome>,
}

struct Worker {
    tx: mpsc::UnboundedSender<Job>,
    handle: tokio::task::JoinHandle<()>,
}

struct PoolInner {
    transformer: Arc<dyn Transformer>,
    config: WorkerPoolConfig,
    workers: Mutex<Vec<Worker>>,
    next_worker: AtomicUsize,
    sticky: Mutex<FxHashMap<PathBuf, usize>>,
    inflight: Mutex<FxHashMap<DedupKey, Vec<oneshot::Sender<TransformOutcome>>>>,
}

/// Handle to the worker pool. Cheap to clone.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    pub fn new(transformer: Arc<dyn Transformer>, config: WorkerPoolConfig) -> Self {
        let worker_count = config.workers.max(1);
        let inner = Arc::new(PoolInner {
            transformer,
            config,
            workers: Mutex::new(Vec::new()),
            next_worker: AtomicUsize::new(0),
            sticky: Mutex::new(FxHashMap::default()),
            inflight: Mutex::new(FxHashMap::default()),
        });

        {
            let mut workers = inner.workers.lock();
            for _ in 0..worker_count {
                workers.push(spawn_worker(Arc::clone(&inner.transformer)));
            }
        }

        Self { inner }
    }

    /// Version string of the underlying transformer, for cache fingerprints.
    pub fn transformer_version(&self) -> String {
        self.inner.transformer.version().to_string()
    }

    /// Transform `request`, sharing the result with every concurrent caller
    /// holding an equal `(path, options)` key.
    ///
    /// The underlying work is driven by a detached task, so a caller
    /// cancelling (dropping this future) never disturbs other waiters.
    pub async fn transform(&self, request: TransformRequest) -> TransformOutcome {
        let key = (request.file_path.clone(), request.options.clone());

        let rx = {
            let mut inflight = self.inner.inflight.lock();
            let (tx, rx) = oneshot::channel();
            match inflight.entry(key.clone()) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().push(tx);
                }
                Entry::Vacant(entry) => {
                    entry.insert(vec![tx]);
                    let pool = self.clone();
                    tokio::spawn(async move {
                        let outcome = pool.run_with_retry(request).await;
                        let waiters = pool
                            .inner
                            .inflight
                            .lock()
                            .remove(&key)
                            .unwrap_or_default();
                        for waiter in waiters {
                            let _ = waiter.send(outcome.clone());
                        }
                    });
                }
            }
            rx
        };

        rx.await.unwrap_or(Err(TransformError::PoolClosed))
    }

    /// Dispatch once; a worker crash gets one retry on a fresh worker.
    async fn run_with_retry(&self, request: TransformRequest) -> TransformOutcome {
        match self.dispatch(request.clone()).await {
            Err(TransformError::WorkerCrash { .. }) => {
                warn!(path = %request.file_path.display(), "retrying after worker crash");
                self.dispatch(request).await
            }
            outcome => outcome,
        }
    }

    async fn dispatch(&self, request: TransformRequest) -> TransformOutcome {
        let path = request.file_path.clone();
        let Some(index) = self.pick_worker(&path) else {
            return Err(TransformError::PoolClosed);
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            request,
            reply: reply_tx,
        };

        {
            let workers = self.inner.workers.lock();
            let sent = workers
                .get(index)
                .is_some_and(|worker| worker.tx.send(job).is_ok());
            if !sent {
                return Err(TransformError::PoolClosed);
            }
        }

        match tokio::time::timeout(self.inner.config.timeout, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_recv_gone)) => {
                // The worker dropped the reply without answering: it died
                // mid-job.
                self.respawn(index);
                Err(TransformError::WorkerCrash { path })
            }
            Err(_elapsed) => {
                let timeout_ms = self.inner.config.timeout.as_millis() as u64;
                self.respawn(index);
                Err(TransformError::Timeout { path, timeout_ms })
            }
        }
    }

    fn pick_worker(&self, path: &PathBuf) -> Option<usize> {
        let worker_count = self.inner.workers.lock().len();
        if worker_count == 0 {
            return None;
        }

        if self.inner.config.sticky_workers {
            let mut sticky = self.inner.sticky.lock();
            if let Some(&index) = sticky.get(path) {
                if index < worker_count {
                    return Some(index);
                }
            }
            let index =
                self.inner.next_worker.fetch_add(1, Ordering::Relaxed) % worker_count;
            sticky.insert(path.clone(), index);
            return Some(index);
        }

        Some(self.inner.next_worker.fetch_add(1, Ordering::Relaxed) % worker_count)
    }

    fn respawn(&self, index: usize) {
        debug!(worker = index, "respawning transform worker");
        let mut workers = self.inner.workers.lock();
        workers[index].handle.abort();
        workers[index] = spawn_worker(Arc::clone(&self.inner.transformer));
    }

    /// Abort every worker. In-flight calls fail with `PoolClosed`.
    pub fn shutdown(&self) {
        let mut workers = self.inner.workers.lock();
        for worker in workers.drain(..) {
            worker.handle.abort();
        }
    }
}

fn spawn_worker(transformer: Arc<dyn Transformer>) -> Worker {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    let handle = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let transformer = Arc::clone(&transformer);
            let path = job.request.file_path.clone();
            let request = job.request;
            let outcome =
                tokio::task::spawn_blocking(move || transformer.transform(&request)).await;
            match outcome {
                Ok(result) => {
                    let _ = job.reply.send(result);
                }
                Err(join_error) => {
                    // The transformer panicked. Report the crash; the pool
                    // will respawn this worker.
                    warn!(path = %path.display(), %join_error, "transformer panicked");
                    let _ = job.reply.send(Err(TransformError::WorkerCrash { path }));
                }
            }
        }
    });
    Worker { tx, handle }
}
