//! The resolution algorithm.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use path_clean::PathClean;
use tracing::trace;

use crate::errors::ResolutionError;
use crate::exports_field::{resolve_exports, ExportsTarget};
use crate::haste::HasteIndex;
use crate::lookup::FileSystemLookup;
use crate::options::ResolverOptions;
use crate::package::{FieldOverride, PackageCache, PackageJson};

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    SourceFile(PathBuf),
    /// All variant files of an asset (`img.png`, `img@2x.png`, ...).
    AssetFiles(Vec<PathBuf>),
    /// The empty-module sentinel: the dependency exists but has no content.
    Empty,
}

/// Re-entry handle passed to a custom `resolveRequest` hook.
///
/// The hook can delegate back to the built-in algorithm for specifiers it
/// does not handle.
pub struct ResolveContext<'a> {
    resolver: &'a Resolver,
    origin: &'a Path,
}

impl ResolveContext<'_> {
    pub fn origin(&self) -> &Path {
        self.origin
    }

    /// Run the default algorithm for `specifier`.
    pub fn resolve(
        &self,
        specifier: &str,
        platform: Option<&str>,
    ) -> Result<Resolution, ResolutionError> {
        self.resolver
            .resolve_default(self.origin, specifier, platform)
    }
}

/// Capability-typed user hook consulted before the default algorithm.
pub type ResolveRequestHook = Arc<
    dyn Fn(&ResolveContext<'_>, &str, Option<&str>) -> Result<Resolution, ResolutionError>
        + Send
        + Sync,
>;

/// Candidate bookkeeping for error reporting.
#[derive(Debug, Default)]
struct ProbeRecord {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

/// Pure specifier-to-path resolver.
///
/// Deterministic: equal `(origin, specifier, platform)` inputs against an
/// unchanged filesystem produce equal outputs.
pub struct Resolver {
    project_root: PathBuf,
    options: ResolverOptions,
    lookup: Arc<dyn FileSystemLookup>,
    packages: PackageCache,
    haste: Option<Arc<dyn HasteIndex>>,
    hook: Option<ResolveRequestHook>,
}

impl Resolver {
    pub fn new(
        project_root: PathBuf,
        options: ResolverOptions,
        lookup: Arc<dyn FileSystemLookup>,
    ) -> Self {
        let packages = PackageCache::new(Arc::clone(&lookup));
        Self {
            project_root,
            options,
            lookup,
            packages,
            haste: None,
            hook: None,
        }
    }

    pub fn with_haste(mut self, haste: Arc<dyn HasteIndex>) -> Self {
        self.haste = Some(haste);
        self
    }

    pub fn with_resolve_request(mut self, hook: ResolveRequestHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// The package cache, exposed so the file map can invalidate manifests.
    pub fn package_cache(&self) -> &PackageCache {
        &self.packages
    }

    /// Resolve `specifier` as imported from `origin`.
    ///
    /// A configured `resolveRequest` hook sees every request first and may
    /// re-enter the default algorithm through the provided context.
    pub fn resolve(
        &self,
        origin: &Path,
        specifier: &str,
        platform: Option<&str>,
    ) -> Result<Resolution, ResolutionError> {
        if let Some(hook) = &self.hook {
            let ctx = ResolveContext {
                resolver: self,
                origin,
            };
            return hook(&ctx, specifier, platform);
        }
        self.resolve_default(origin, specifier, platform)
    }

    fn resolve_default(
        &self,
        origin: &Path,
        specifier: &str,
        platform: Option<&str>,
    ) -> Result<Resolution, ResolutionError> {
        trace!(origin = %origin.display(), specifier, "resolve");

        if let Some((scheme, _)) = specifier.split_once("://") {
            return Err(ResolutionError::FailedToResolveUnsupported {
                specifier: specifier.to_string(),
                reason: format!("the '{scheme}:' URL scheme is not supported"),
            });
        }

        if self
            .options
            .empty_module_specifier
            .as_deref()
            .is_some_and(|sentinel| sentinel == specifier)
        {
            return Ok(Resolution::Empty);
        }

        // `browser` / `react-native` maps of the origin's own package may
        // redirect the specifier before classification.
        let specifier = match self.field_redirect(origin, specifier) {
            Some(FieldOverride::Empty) => return Ok(Resolution::Empty),
            Some(FieldOverride::Replace(replacement)) => replacement,
            None => specifier.to_string(),
        };
        let specifier = specifier.as_str();

        if specifier.starts_with("./") || specifier.starts_with("../") {
            let base = origin
                .parent()
                .unwrap_or(&self.project_root)
                .join(specifier)
                .clean();
            return self.resolve_path_like(origin, specifier, &base, platform);
        }

        if specifier.starts_with('/') {
            let base = PathBuf::from(specifier).clean();
            return self.resolve_path_like(origin, specifier, &base, platform);
        }

        self.resolve_bare(origin, specifier, platform)
    }

    fn resolve_path_like(
        &self,
        origin: &Path,
        specifier: &str,
        base: &Path,
        platform: Option<&str>,
    ) -> Result<Resolution, ResolutionError> {
        let mut probe = ProbeRecord::default();
        if let Some(resolution) = self.resolve_file_or_dir(base, platform, &mut probe) {
            return Ok(resolution);
        }
        Err(ResolutionError::FailedToResolvePath {
            specifier: specifier.to_string(),
            origin: origin.to_path_buf(),
            file_candidates: probe.files,
            dir_candidates: probe.dirs,
        })
    }

    fn resolve_bare(
        &self,
        origin: &Path,
        specifier: &str,
        platform: Option<&str>,
    ) -> Result<Resolution, ResolutionError> {
        let (package_name, subpath) = split_package_specifier(specifier);
        let mut probe = ProbeRecord::default();

        // 1. Haste: flat-namespace lookup by declared name.
        if let Some(haste) = &self.haste {
            if subpath.is_empty() {
                if let Some(path) = haste.module_path(specifier) {
                    if let Some(resolution) = self.resolve_file_or_dir(&path, platform, &mut probe)
                    {
                        return Ok(resolution);
                    }
                }
            }
            if let Some(root) = haste.package_path(package_name) {
                let candidate = join_subpath(&root, subpath);
                if let Some(resolution) = self.resolve_file_or_dir(&candidate, platform, &mut probe)
                {
                    return Ok(resolution);
                }
            }
        }

        // 2. node_modules of every ancestor directory, then the configured
        //    extra search paths.
        let mut searched: Vec<PathBuf> = Vec::new();
        let mut module_dirs: Vec<PathBuf> = Vec::new();

        if !self.options.disable_hierarchical_lookup {
            let start = origin.parent().unwrap_or(&self.project_root);
            for ancestor in start.ancestors() {
                module_dirs.push(ancestor.join("node_modules"));
            }
        }
        module_dirs.extend(self.options.node_modules_paths.iter().cloned());

        for dir in module_dirs {
            if !self.lookup.is_dir(&dir) {
                continue;
            }
            searched.push(dir.clone());
            if let Some(resolution) =
                self.resolve_in_package(&dir.join(package_name), subpath, platform, &mut probe)?
            {
                return Ok(resolution);
            }
        }

        // 3. extraNodeModules name map.
        let mut extra_paths: Vec<PathBuf> = Vec::new();
        if let Some(mapped) = self.options.extra_node_modules.get(package_name) {
            let candidate = join_subpath(mapped, subpath);
            extra_paths.push(candidate.clone());
            if let Some(resolution) =
                self.resolve_in_package(mapped, subpath, platform, &mut probe)?
            {
                return Ok(resolution);
            }
        }

        Err(ResolutionError::FailedToResolveName {
            specifier: specifier.to_string(),
            origin: origin.to_path_buf(),
            searched_dirs: searched,
            extra_paths,
        })
    }

    /// Resolution inside one package root: `exports` first (when enabled and
    /// published), then plain file/directory probing.
    fn resolve_in_package(
        &self,
        package_root: &Path,
        subpath: &str,
        platform: Option<&str>,
        probe: &mut ProbeRecord,
    ) -> Result<Option<Resolution>, ResolutionError> {
        let manifest_path = package_root.join("package.json");

        if self.options.enable_package_exports && self.lookup.is_file(&manifest_path) {
            let package = self.packages.get_package(&manifest_path)?;
            if let Some(exports) = &package.exports {
                let exports_subpath = if subpath.is_empty() {
                    ".".to_string()
                } else {
                    format!("./{subpath}")
                };
                let conditions = self.options.active_conditions(platform);
                match resolve_exports(exports, &exports_subpath, &conditions) {
                    Some(ExportsTarget::Empty) => return Ok(Some(Resolution::Empty)),
                    Some(ExportsTarget::Path(target)) => {
                        let resolved = package_root.join(target.trim_start_matches("./")).clean();
                        if self.lookup.is_file(&resolved) && !self.options.is_blocked(&resolved) {
                            return Ok(Some(self.classify_file(&resolved)));
                        }
                        probe.files.push(resolved);
                        // An exports entry that points at a missing file falls
                        // through to legacy probing rather than failing hard.
                    }
                    None => {}
                }
            }
        }

        let candidate = join_subpath(package_root, subpath);
        Ok(self.resolve_file_or_dir(&candidate, platform, probe))
    }

    fn resolve_file_or_dir(
        &self,
        candidate: &Path,
        platform: Option<&str>,
        probe: &mut ProbeRecord,
    ) -> Option<Resolution> {
        if let Some(resolution) = self.resolve_file(candidate, platform, probe) {
            return Some(resolution);
        }
        if self.lookup.is_dir(candidate) {
            return self.resolve_dir(candidate, platform, probe);
        }
        // Record the directory form even when the directory is absent, so
        // failure messages name both candidate prefixes.
        probe.dirs.push(append_suffix(
            &candidate.join("index"),
            &format!(".{}", self.options.source_exts.first().map_or("js", String::as_str)),
        ));
        None
    }

    /// File probing for a candidate path.
    ///
    /// Order: the exact path as written, then `.{platform}.{ext}`, then
    /// `.native.{ext}` (when `preferNativePlatform` is set), then `.{ext}`
    /// over the source extensions, then asset extensions with their density
    /// variants.
    fn resolve_file(
        &self,
        candidate: &Path,
        platform: Option<&str>,
        probe: &mut ProbeRecord,
    ) -> Option<Resolution> {
        // Exact hit: the specifier already names a file.
        if self.is_existing_file(candidate) {
            return Some(self.classify_file(candidate));
        }
        if candidate.extension().is_some() {
            probe.files.push(candidate.to_path_buf());
        }

        let mut suffix_phases: Vec<Option<&str>> = Vec::new();
        if let Some(platform) = platform {
            suffix_phases.push(Some(platform));
        }
        if self.options.prefer_native_platform {
            suffix_phases.push(Some("native"));
        }
        suffix_phases.push(None);

        for phase in &suffix_phases {
            for ext in &self.options.source_exts {
                let probed = match phase {
                    Some(qualifier) => append_suffix(candidate, &format!(".{qualifier}.{ext}")),
                    None => append_suffix(candidate, &format!(".{ext}")),
                };
                if self.is_existing_file(&probed) {
                    return Some(Resolution::SourceFile(probed));
                }
                probe.files.push(probed);
            }
        }

        for ext in &self.options.asset_exts {
            let probed = append_suffix(candidate, &format!(".{ext}"));
            if self.is_existing_file(&probed) {
                return Some(Resolution::AssetFiles(self.collect_asset_variants(&probed)));
            }
        }

        None
    }

    /// Directory probing: `package.json` entry fields, then `index.*`.
    fn resolve_dir(
        &self,
        dir: &Path,
        platform: Option<&str>,
        probe: &mut ProbeRecord,
    ) -> Option<Resolution> {
        let manifest_path = dir.join("package.json");
        if self.lookup.is_file(&manifest_path) {
            if let Ok(package) = self.packages.get_package(&manifest_path) {
                if let Some(resolution) =
                    self.resolve_dir_via_manifest(dir, &package, platform, probe)
                {
                    return Some(resolution);
                }
            }
        }

        let index = dir.join("index");
        probe.dirs.push(append_suffix(
            &index,
            &format!(".{}", self.options.source_exts.first().map_or("js", String::as_str)),
        ));
        self.resolve_file(&index, platform, probe)
    }

    fn resolve_dir_via_manifest(
        &self,
        dir: &Path,
        package: &PackageJson,
        platform: Option<&str>,
        probe: &mut ProbeRecord,
    ) -> Option<Resolution> {
        if self.options.enable_package_exports {
            if let Some(exports) = &package.exports {
                let conditions = self.options.active_conditions(platform);
                match resolve_exports(exports, ".", &conditions) {
                    Some(ExportsTarget::Empty) => return Some(Resolution::Empty),
                    Some(ExportsTarget::Path(target)) => {
                        let resolved = dir.join(target.trim_start_matches("./")).clean();
                        if self.is_existing_file(&resolved) {
                            return Some(self.classify_file(&resolved));
                        }
                        probe.files.push(resolved);
                    }
                    None => {}
                }
            }
        }

        for field in &self.options.main_fields {
            let Some(entry) = package.entry_field(field) else {
                continue;
            };
            let candidate = dir.join(entry).clean();
            if let Some(resolution) = self.resolve_file(&candidate, platform, probe) {
                return Some(resolution);
            }
            if self.lookup.is_dir(&candidate) {
                if let Some(resolution) = self.resolve_file(&candidate.join("index"), platform, probe) {
                    return Some(resolution);
                }
            }
        }

        None
    }

    /// All density variants of an asset that exist on disk, the bare file
    /// included, sorted for determinism.
    fn collect_asset_variants(&self, asset: &Path) -> Vec<PathBuf> {
        let mut variants = Vec::new();
        let stem = asset.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        let ext = asset.extension().and_then(|s| s.to_str()).unwrap_or("");
        let dir = asset.parent().unwrap_or(Path::new("/"));

        for resolution in &self.options.asset_resolutions {
            let name = if *resolution == 1 {
                format!("{stem}.{ext}")
            } else {
                format!("{stem}@{resolution}x.{ext}")
            };
            let candidate = dir.join(name);
            if self.is_existing_file(&candidate) {
                variants.push(candidate);
            }
        }

        if variants.is_empty() && self.is_existing_file(asset) {
            variants.push(asset.to_path_buf());
        }
        variants.sort();
        variants
    }

    fn classify_file(&self, path: &Path) -> Resolution {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if self.options.is_asset_ext(ext) {
            Resolution::AssetFiles(self.collect_asset_variants(path))
        } else {
            Resolution::SourceFile(path.to_path_buf())
        }
    }

    fn is_existing_file(&self, path: &Path) -> bool {
        !self.options.is_blocked(path) && self.lookup.is_file(path)
    }

    /// Specifier redirect from the origin package's `browser` /
    /// `react-native` maps, honored only for fields listed in `main_fields`.
    fn field_redirect(&self, origin: &Path, specifier: &str) -> Option<FieldOverride> {
        let info = self.packages.get_package_of(origin)?;
        for field in &self.options.main_fields {
            if let Some(redirect) = info.package.field_override(field, specifier) {
                return Some(redirect);
            }
        }
        None
    }
}

/// `@scope/pkg/sub` -> (`@scope/pkg`, `sub`); `react` -> (`react`, ``).
fn split_package_specifier(specifier: &str) -> (&str, &str) {
    let segments_in_name = if specifier.starts_with('@') { 2 } else { 1 };
    let mut index = 0;
    for _ in 0..segments_in_name {
        match specifier[index..].find('/') {
            Some(offset) => index += offset + 1,
            None => return (specifier, ""),
        }
    }
    (&specifier[..index - 1], &specifier[index..])
}

fn join_subpath(root: &Path, subpath: &str) -> PathBuf {
    if subpath.is_empty() {
        root.to_path_buf()
    } else {
        root.join(subpath).clean()
    }
}

/// Append a textual suffix to the final component of `path`.
fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests;
