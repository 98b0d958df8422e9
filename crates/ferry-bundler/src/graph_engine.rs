//! Graph construction and incremental maintenance.
//!
//! The initial build is a message loop over spawned module tasks: each task
//! loads one file, checks the transform cache, transforms on a miss and
//! resolves the dependency list in source order; the loop owns the graph,
//! assigns module IDs on first discovery and spawns tasks for newly
//! referenced paths until the queue drains.
//!
//! Incremental updates stage a copy of the graph, apply a coalesced event
//! batch (re-transforming dirty modules sequentially, adding transitively
//! referenced files, sweeping orphans) and hand back the staged graph plus
//! the delta. Any failure drops the staged copy — the caller keeps serving
//! the previous revision.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use ferry_cache::{LayeredCache, TransformFingerprint};
use ferry_graph::{
    AssetInfo, Delta, Dependency, Graph, Module, ModuleIdProvider, ModuleOutput, ModulePath,
};
use ferry_resolver::{Resolution, Resolver};
use ferry_transform::{
    DependencyDescriptor, TransformRequest, TransformedModule, WorkerPool,
};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::BundleError;
use crate::events::EventBatch;
use crate::options::{GraphOptions, NormalizedOptions};

/// Where a dependency specifier landed after resolution.
#[derive(Debug, Clone)]
enum ResolvedTarget {
    Source(ModulePath),
    Asset {
        key: ModulePath,
        files: Vec<PathBuf>,
    },
    Empty,
}

impl ResolvedTarget {
    fn node_path(&self) -> Option<&ModulePath> {
        match self {
            ResolvedTarget::Source(path) | ResolvedTarget::Asset { key: path, .. } => Some(path),
            ResolvedTarget::Empty => None,
        }
    }
}

/// One fully processed file, ready to become a graph node.
struct ProcessedModule {
    path: ModulePath,
    artifact: TransformedModule,
    asset: Option<AssetInfo>,
    resolved: Vec<(DependencyDescriptor, ResolvedTarget)>,
}

/// The delta bundler's traversal engine. Cheap to clone.
#[derive(Clone)]
pub struct GraphEngine {
    options: Arc<NormalizedOptions>,
    resolver: Arc<Resolver>,
    pool: WorkerPool,
    cache: LayeredCache,
    ids: Arc<dyn ModuleIdProvider>,
}

impl GraphEngine {
    pub fn new(
        options: Arc<NormalizedOptions>,
        resolver: Arc<Resolver>,
        pool: WorkerPool,
        cache: LayeredCache,
        ids: Arc<dyn ModuleIdProvider>,
    ) -> Self {
        Self {
            options,
            resolver,
            pool,
            cache,
            ids,
        }
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Build the complete graph for `entry`.
    ///
    /// On return the structural invariants hold: every resolved edge has a
    /// node, every non-entry node has a referrer, IDs are unique.
    pub async fn build_graph(
        &self,
        entry: &ModulePath,
        options: &GraphOptions,
    ) -> Result<Graph, BundleError> {
        let mut graph = Graph::new();

        // Root set: configured prologue modules (polyfills, pre-modules)
        // first, then the entry.
        let mut roots: Vec<ModulePath> = Vec::new();
        for prologue in &self.options.prologue_modules {
            roots.push(ModulePath::new(prologue)?);
        }
        roots.push(entry.clone());

        let (tx, mut rx) = mpsc::unbounded_channel::<Result<ProcessedModule, BundleError>>();
        let mut visited: FxHashSet<ModulePath> = FxHashSet::default();
        let mut remaining: u32 = 0;

        for root in roots {
            graph.add_entry_point(root.clone());
            if visited.insert(root.clone()) {
                self.spawn_module_task(root, options.clone(), None, None, &tx);
                remaining += 1;
            }
        }

        let mut first_error: Option<BundleError> = None;

        while remaining > 0 {
            let Some(message) = rx.recv().await else { break };
            remaining -= 1;

            let processed = match message {
                Ok(processed) => processed,
                Err(err) => {
                    // Keep draining so in-flight tasks finish, but remember
                    // only the first failure.
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                    continue;
                }
            };

            if first_error.is_some() {
                continue;
            }

            let module = self.into_module(&processed, self.ids.assign(&processed.path));
            for (_, target) in &processed.resolved {
                let Some(next) = target.node_path() else { continue };
                if visited.insert(next.clone()) {
                    let asset_files = match target {
                        ResolvedTarget::Asset { files, .. } => Some(files.clone()),
                        _ => None,
                    };
                    self.spawn_module_task(
                        next.clone(),
                        options.clone(),
                        asset_files,
                        Some(processed.path.as_path().to_path_buf()),
                        &tx,
                    );
                    remaining += 1;
                }
            }
            graph.insert_module(module);
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        debug_assert!(graph.check_consistency().is_ok());
        debug!(modules = graph.len(), entry = %entry, "initial graph build complete");
        Ok(graph)
    }

    /// Apply a coalesced event batch to `base`, transactionally.
    ///
    /// Returns the staged graph and the delta to reach it. On error the
    /// staged copy is dropped and `base` stays the current revision. Module
    /// IDs of deleted nodes are released only on the successful path.
    pub async fn apply_update(
        &self,
        base: &Graph,
        batch: &EventBatch,
        options: &GraphOptions,
    ) -> Result<(Graph, Delta), BundleError> {
        let mut staged = base.clone();

        // A changed manifest invalidates its memoized parse before any
        // re-resolution happens.
        for path in batch.touched().chain(batch.deleted()) {
            if path.file_name().is_some_and(|name| name == "package.json") {
                self.resolver.package_cache().invalidate(path);
            }
        }

        let mut deleted_now: Vec<ModulePath> = Vec::new();
        let mut dirty: Vec<ModulePath> = Vec::new();
        let mut dirty_seen: FxHashSet<ModulePath> = FxHashSet::default();

        // Deletions first: dependents of a removed node must re-resolve.
        for path in batch.deleted() {
            let module_path = ModulePath::new(path)?;
            if !staged.contains(&module_path) {
                // A deleted asset variant shrinks its primary node's file
                // set; re-process the primary.
                if let Some(primary) = self.asset_primary_path(path) {
                    let primary = ModulePath::new(primary)?;
                    if staged.contains(&primary) && dirty_seen.insert(primary.clone()) {
                        dirty.push(primary);
                    }
                }
                continue;
            }
            let mut dependents: Vec<ModulePath> = staged
                .dependents(&module_path)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            dependents.sort();
            for dependent in dependents {
                if dirty_seen.insert(dependent.clone()) {
                    dirty.push(dependent);
                }
            }
            staged.remove_module(&module_path);
            deleted_now.push(module_path);
        }

        // Touches on paths the graph knows are re-transforms; unknown paths
        // only matter if a newly appearing dependency references them, which
        // the transitive walk below handles. A touched asset variant
        // (`logo@2x.png`) invalidates its primary node.
        for path in batch.touched() {
            let module_path = ModulePath::new(path)?;
            if staged.contains(&module_path) {
                if dirty_seen.insert(module_path.clone()) {
                    dirty.push(module_path);
                }
                continue;
            }
            if let Some(primary) = self.asset_primary_path(path) {
                let primary = ModulePath::new(primary)?;
                if staged.contains(&primary) && dirty_seen.insert(primary.clone()) {
                    dirty.push(primary);
                }
            }
        }

        let mut queue: VecDeque<(ModulePath, Option<Vec<PathBuf>>, Option<PathBuf>)> =
            dirty.into_iter().map(|path| (path, None, None)).collect();
        let mut queued: FxHashSet<ModulePath> =
            queue.iter().map(|(path, _, _)| path.clone()).collect();

        let mut added_paths: Vec<ModulePath> = Vec::new();
        let mut modified_paths: Vec<ModulePath> = Vec::new();

        while let Some((path, asset_files, imported_by)) = queue.pop_front() {
            let previous = staged.module(&path).cloned();

            let processed = self
                .process_module(&path, options, asset_files, imported_by)
                .await?;

            let id = match &previous {
                Some(module) => module.id,
                None => self.ids.assign(&path),
            };
            let module = self.into_module(&processed, id);

            for (_, target) in &processed.resolved {
                let Some(next) = target.node_path() else { continue };
                if !staged.contains(next) && queued.insert(next.clone()) {
                    let asset_files = match target {
                        ResolvedTarget::Asset { files, .. } => Some(files.clone()),
                        _ => None,
                    };
                    queue.push_back((
                        next.clone(),
                        asset_files,
                        Some(path.as_path().to_path_buf()),
                    ));
                }
            }

            match &previous {
                Some(old) => {
                    if module_changed(old, &module) {
                        modified_paths.push(path.clone());
                    }
                }
                None => added_paths.push(path.clone()),
            }
            staged.insert_module(module);
        }

        // Orphan collection, cycle-safe.
        let swept = staged.sweep_unreachable();

        let mut delta = Delta::default();
        for path in added_paths {
            if let Some(module) = staged.module(&path) {
                delta.added.push(module.clone());
            }
        }
        for path in modified_paths {
            if let Some(module) = staged.module(&path) {
                delta.modified.push(module.clone());
            }
        }
        for path in deleted_now.into_iter().chain(swept) {
            if !staged.contains(&path) {
                delta.deleted.insert(path);
            }
        }

        for path in &delta.deleted {
            self.ids.release(path);
        }

        debug_assert!(staged.check_consistency().is_ok());
        Ok((staged, delta))
    }

    fn spawn_module_task(
        &self,
        path: ModulePath,
        options: GraphOptions,
        asset_files: Option<Vec<PathBuf>>,
        imported_by: Option<PathBuf>,
        tx: &mpsc::UnboundedSender<Result<ProcessedModule, BundleError>>,
    ) {
        let engine = self.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = engine
                .process_module(&path, &options, asset_files, imported_by)
                .await;
            let _ = tx.send(result);
        });
    }

    fn into_module(&self, processed: &ProcessedModule, id: u32) -> Module {
        let output = match &processed.asset {
            Some(asset) => ModuleOutput::Asset(asset.clone()),
            None => ModuleOutput::Code {
                code: processed.artifact.code.clone(),
                map: processed.artifact.map.clone(),
            },
        };

        let dependencies = processed
            .resolved
            .iter()
            .map(|(descriptor, target)| Dependency {
                name: descriptor.name.clone(),
                kind: descriptor.kind,
                locations: descriptor.locations.clone(),
                resolved: target.node_path().cloned(),
            })
            .collect();

        Module::new(
            processed.path.clone(),
            id,
            processed.artifact.source_hash,
            output,
        )
        .with_dependencies(dependencies)
    }

    /// Load, transform (cache-checked) and resolve one file.
    async fn process_module(
        &self,
        path: &ModulePath,
        options: &GraphOptions,
        asset_files: Option<Vec<PathBuf>>,
        imported_by: Option<PathBuf>,
    ) -> Result<ProcessedModule, BundleError> {
        if let Some(files) = asset_files.or_else(|| self.implicit_asset_files(path)) {
            return self.process_asset(path, files, imported_by).await;
        }

        let source = tokio::fs::read_to_string(path.as_path())
            .await
            .map_err(|source| BundleError::ReadSource {
                path: path.as_path().to_path_buf(),
                imported_by,
                source,
            })?;

        let transform_options = options.transform_options();
        let transformer_version = self.pool.transformer_version();
        let fingerprint = TransformFingerprint {
            source: source.as_bytes(),
            transformer_version: &transformer_version,
            cache_version: &self.options.transformer.cache_version,
            platform: transform_options.platform.as_deref(),
            dev: transform_options.dev,
            hot: transform_options.hot,
            minify: transform_options.minify,
            inline_requires: transform_options.inline_requires,
            custom_options: &transform_options.custom,
        };
        let key = fingerprint.compute();

        let artifact = match self.cache.get(&key).await.map_err(BundleError::CacheRead)? {
            Some(bytes) => match bincode::deserialize::<TransformedModule>(&bytes) {
                Ok(artifact) => artifact,
                Err(err) => {
                    // A corrupt entry is a miss, not a failure.
                    warn!(key = %key, %err, "discarding undecodable cache entry");
                    self.transform_and_store(path, source, transform_options, &key)
                        .await?
                }
            },
            None => {
                self.transform_and_store(path, source, transform_options, &key)
                    .await?
            }
        };

        let mut resolved = Vec::with_capacity(artifact.dependencies.len());
        for descriptor in &artifact.dependencies {
            let target = self.resolve_dependency(path, descriptor, options)?;
            resolved.push((descriptor.clone(), target));
        }

        Ok(ProcessedModule {
            path: path.clone(),
            artifact,
            asset: None,
            resolved,
        })
    }

    async fn transform_and_store(
        &self,
        path: &ModulePath,
        source: String,
        transform_options: ferry_transform::TransformOptions,
        key: &ferry_cache::CacheKey,
    ) -> Result<TransformedModule, BundleError> {
        let artifact = self
            .pool
            .transform(TransformRequest {
                file_path: path.as_path().to_path_buf(),
                source,
                options: transform_options,
            })
            .await?;

        match bincode::serialize(&artifact) {
            Ok(bytes) => {
                // Write failures are logged, never fatal.
                if let Err(err) = self.cache.set(key, &bytes).await {
                    warn!(key = %key, %err, "cache write failed");
                }
            }
            Err(err) => warn!(key = %key, %err, "could not encode transform artifact"),
        }

        Ok(artifact)
    }

    fn resolve_dependency(
        &self,
        origin: &ModulePath,
        descriptor: &DependencyDescriptor,
        options: &GraphOptions,
    ) -> Result<ResolvedTarget, BundleError> {
        let resolution = self
            .resolver
            .resolve(
                origin.as_path(),
                &descriptor.name,
                options.platform.as_deref(),
            )
            .map_err(|source| BundleError::Resolution {
                specifier: descriptor.name.clone(),
                origin: origin.as_path().to_path_buf(),
                location: descriptor.locations.first().copied(),
                source,
            })?;

        Ok(match resolution {
            Resolution::SourceFile(path) => ResolvedTarget::Source(ModulePath::new(path)?),
            Resolution::AssetFiles(files) => {
                // Variants are sorted; the smallest path keys the node and
                // the full set rides along for the serializer.
                let key = files
                    .first()
                    .cloned()
                    .map(ModulePath::new)
                    .transpose()?
                    .expect("asset resolutions always carry at least one file");
                ResolvedTarget::Asset { key, files }
            }
            Resolution::Empty => ResolvedTarget::Empty,
        })
    }

    fn implicit_asset_files(&self, path: &ModulePath) -> Option<Vec<PathBuf>> {
        let ext = path.as_path().extension()?.to_str()?;
        if self.options.resolver.is_asset_ext(ext) {
            Some(self.asset_variants_on_disk(path.as_path()))
        } else {
            None
        }
    }

    /// Density variants of `primary` currently on disk, the bare file
    /// included. Mirrors the resolver's probing so a re-processed asset node
    /// keeps its full variant set.
    fn asset_variants_on_disk(&self, primary: &std::path::Path) -> Vec<PathBuf> {
        let stem = primary.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        let ext = primary.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut files = Vec::new();
        for resolution in &self.options.resolver.asset_resolutions {
            let name = if *resolution == 1 {
                format!("{stem}.{ext}")
            } else {
                format!("{stem}@{resolution}x.{ext}")
            };
            let candidate = primary.with_file_name(name);
            if candidate.is_file() {
                files.push(candidate);
            }
        }
        if files.is_empty() && primary.is_file() {
            files.push(primary.to_path_buf());
        }
        files.sort();
        files
    }

    /// For an asset variant path (`logo@2x.png`) return the primary path
    /// (`logo.png`) that keys the graph node. `None` for non-assets.
    fn asset_primary_path(&self, path: &std::path::Path) -> Option<PathBuf> {
        let ext = path.extension()?.to_str()?;
        if !self.options.resolver.is_asset_ext(ext) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let base = match stem.rfind('@') {
            Some(at) => {
                let suffix = &stem[at + 1..];
                let is_density = suffix.ends_with('x')
                    && suffix.len() > 1
                    && suffix[..suffix.len() - 1].chars().all(|c| c.is_ascii_digit());
                if is_density {
                    &stem[..at]
                } else {
                    stem
                }
            }
            None => stem,
        };
        if base == stem {
            return None;
        }
        Some(path.with_file_name(format!("{base}.{ext}")))
    }

    async fn process_asset(
        &self,
        path: &ModulePath,
        files: Vec<PathBuf>,
        imported_by: Option<PathBuf>,
    ) -> Result<ProcessedModule, BundleError> {
        // Assets are not transformed; the hash covers every variant's bytes
        // so editing any of them shows up as a modification.
        let mut hasher = blake3::Hasher::new();
        for file in &files {
            let bytes =
                tokio::fs::read(file)
                    .await
                    .map_err(|source| BundleError::ReadSource {
                        path: file.clone(),
                        imported_by: imported_by.clone(),
                        source,
                    })?;
            hasher.update(file.to_string_lossy().as_bytes());
            hasher.update(&bytes);
        }

        Ok(ProcessedModule {
            path: path.clone(),
            artifact: TransformedModule {
                code: String::new(),
                map: None,
                dependencies: Vec::new(),
                source_hash: *hasher.finalize().as_bytes(),
            },
            asset: Some(AssetInfo { files }),
            resolved: Vec::new(),
        })
    }
}

fn module_changed(old: &Module, new: &Module) -> bool {
    old.source_hash != new.source_hash
        || *old.output != *new.output
        || old.dependencies != new.dependencies
}
