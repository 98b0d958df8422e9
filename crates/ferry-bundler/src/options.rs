//! Bundler configuration and normalization.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ferry_cache::CacheStore;
use ferry_filemap::HealthCheckConfig;
use ferry_resolver::ResolverOptions;
use ferry_transform::TransformOptions;

/// Transform pool settings (`transformer.*`).
#[derive(Debug, Clone)]
pub struct TransformerOptions {
    /// Worker count (`maxWorkers`).
    pub workers: usize,
    pub sticky_workers: bool,
    /// Embedder-chosen version string folded into every cache key.
    pub cache_version: String,
    pub timeout: Duration,
}

impl Default for TransformerOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            sticky_workers: true,
            cache_version: "0".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Watcher settings (`watcher.*`).
#[derive(Debug, Clone, Default)]
pub struct WatcherOptions {
    pub health_check: HealthCheckConfig,
    /// Extensions tracked beyond source + asset extensions.
    pub additional_exts: Vec<String>,
    /// Quiet window for batching watch events into one delta.
    pub debounce: Option<Duration>,
}

/// Top-level bundler configuration.
#[derive(Clone)]
pub struct BundlerOptions {
    pub project_root: PathBuf,
    /// Watched roots. Defaults to `[project_root]`.
    pub watch_folders: Vec<PathBuf>,
    /// Legal values for the platform axis (`android`, `ios`, `web`, ...).
    pub platforms: Vec<String>,
    pub resolver: ResolverOptions,
    pub transformer: TransformerOptions,
    pub watcher: WatcherOptions,
    /// Ordered cache tiers. Empty disables caching.
    pub cache_stores: Vec<Arc<dyn CacheStore>>,
    /// Polyfills and other pre-modules added to every graph's root set,
    /// bundled before the entry.
    pub prologue_modules: Vec<PathBuf>,
    /// Ignore every cache on start.
    pub reset_cache: bool,
}

impl BundlerOptions {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            watch_folders: Vec::new(),
            platforms: vec!["android".into(), "ios".into()],
            resolver: ResolverOptions::default(),
            transformer: TransformerOptions::default(),
            watcher: WatcherOptions::default(),
            cache_stores: Vec::new(),
            prologue_modules: Vec::new(),
            reset_cache: false,
        }
    }
}

/// Options fixed per `(entry, options)` graph.
///
/// Together with the entry path these make up the graph identity; all of
/// them feed the transform fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GraphOptions {
    pub platform: Option<String>,
    pub dev: bool,
    pub hot: bool,
    pub minify: bool,
    pub inline_requires: bool,
    pub custom_transform_options: BTreeMap<String, String>,
}

impl GraphOptions {
    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            platform: self.platform.clone(),
            dev: self.dev,
            hot: self.hot,
            minify: self.minify,
            inline_requires: self.inline_requires,
            // Folding statically-known branches is a production concern;
            // dev builds keep branches intact for debugging.
            fold_constants: !self.dev,
            custom: self.custom_transform_options.clone(),
        }
    }
}

/// Validated, defaulted configuration.
#[derive(Clone)]
pub struct NormalizedOptions {
    pub project_root: PathBuf,
    pub watch_folders: Vec<PathBuf>,
    pub platforms: Vec<String>,
    pub resolver: ResolverOptions,
    pub transformer: TransformerOptions,
    pub watcher: WatcherOptions,
    pub cache_stores: Vec<Arc<dyn CacheStore>>,
    pub prologue_modules: Vec<PathBuf>,
    pub reset_cache: bool,
}

impl NormalizedOptions {
    /// Extensions the file map tracks: sources, assets, `package.json`
    /// manifests and the configured extras.
    pub fn tracked_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.resolver.source_exts.clone();
        extensions.extend(self.resolver.asset_exts.iter().cloned());
        extensions.extend(self.watcher.additional_exts.iter().cloned());
        if !extensions.iter().any(|e| e == "json") {
            extensions.push("json".to_string());
        }
        extensions.sort();
        extensions.dedup();
        extensions
    }

    pub fn debounce(&self) -> Duration {
        self.watcher.debounce.unwrap_or(Duration::from_millis(50))
    }
}

/// Fill defaults and validate. Watch folders default to the project root;
/// the project root is always watched.
pub fn normalize_options(options: BundlerOptions) -> NormalizedOptions {
    let BundlerOptions {
        project_root,
        mut watch_folders,
        platforms,
        resolver,
        transformer,
        watcher,
        cache_stores,
        prologue_modules,
        reset_cache,
    } = options;

    if watch_folders.is_empty() {
        watch_folders.push(project_root.clone());
    }
    if !watch_folders.contains(&project_root) {
        watch_folders.insert(0, project_root.clone());
    }

    NormalizedOptions {
        project_root,
        watch_folders,
        platforms,
        resolver,
        transformer,
        watcher,
        cache_stores,
        prologue_modules,
        reset_cache,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_folders_default_to_project_root() {
        let normalized = normalize_options(BundlerOptions::new("/p"));
        assert_eq!(normalized.watch_folders, vec![PathBuf::from("/p")]);
    }

    #[test]
    fn project_root_is_always_watched() {
        let mut options = BundlerOptions::new("/p");
        options.watch_folders = vec![PathBuf::from("/vendor")];
        let normalized = normalize_options(options);
        assert_eq!(normalized.watch_folders[0], PathBuf::from("/p"));
        assert_eq!(normalized.watch_folders.len(), 2);
    }

    #[test]
    fn tracked_extensions_cover_sources_assets_and_manifests() {
        let normalized = normalize_options(BundlerOptions::new("/p"));
        let exts = normalized.tracked_extensions();
        assert!(exts.iter().any(|e| e == "js"));
        assert!(exts.iter().any(|e| e == "png"));
        assert!(exts.iter().any(|e| e == "json"));
    }

    #[test]
    fn dev_builds_skip_constant_folding() {
        let dev = GraphOptions {
            dev: true,
            ..GraphOptions::default()
        };
        assert!(!dev.transform_options().fold_constants);
        assert!(GraphOptions::default().transform_options().fold_constants);
    }
}
