//! `package.json` parsing and the read-through package cache.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::ResolutionError;
use crate::lookup::FileSystemLookup;

/// Parsed `package.json`, reduced to the fields resolution consults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    pub name: Option<String>,
    pub version: Option<String>,
    pub main: Option<String>,
    /// Either a replacement entry point (string) or a specifier redirect map.
    pub browser: Option<Value>,
    /// Same dual shape as `browser`.
    #[serde(rename = "react-native")]
    pub react_native: Option<Value>,
    pub exports: Option<Value>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Absolute path of the manifest this was parsed from.
    #[serde(skip)]
    pub path: PathBuf,
}

/// How a `browser`-style map rewrites a specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOverride {
    Replace(String),
    /// `"specifier": false` — substitute the empty module.
    Empty,
}

impl PackageJson {
    /// Directory containing the manifest.
    pub fn root(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("/"))
    }

    /// String value of an entry-point field (`main`, `browser`,
    /// `react-native`). Map-shaped fields have no single entry point and
    /// yield `None` here.
    pub fn entry_field(&self, field: &str) -> Option<&str> {
        match field {
            "main" => self.main.as_deref(),
            "browser" => self.browser.as_ref().and_then(Value::as_str),
            "react-native" => self.react_native.as_ref().and_then(Value::as_str),
            _ => None,
        }
    }

    /// Redirect for `specifier` from a map-shaped `browser` / `react-native`
    /// field, if the field defines one.
    pub fn field_override(&self, field: &str, specifier: &str) -> Option<FieldOverride> {
        let value = match field {
            "browser" => self.browser.as_ref()?,
            "react-native" => self.react_native.as_ref()?,
            _ => return None,
        };
        let map = value.as_object()?;
        match map.get(specifier)? {
            Value::Bool(false) => Some(FieldOverride::Empty),
            Value::String(replacement) => Some(FieldOverride::Replace(replacement.clone())),
            _ => None,
        }
    }
}

/// A package plus the position of a file inside it.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub package: Arc<PackageJson>,
    /// Path of the queried file relative to the package root.
    pub relative_path: PathBuf,
}

/// Read-through cache of parsed manifests, keyed by manifest path.
///
/// The file map invalidates entries when a `package.json` changes on disk;
/// until then repeated resolutions share one parse.
pub struct PackageCache {
    lookup: Arc<dyn FileSystemLookup>,
    cache: DashMap<PathBuf, Arc<PackageJson>>,
}

impl PackageCache {
    pub fn new(lookup: Arc<dyn FileSystemLookup>) -> Self {
        Self {
            lookup,
            cache: DashMap::default(),
        }
    }

    /// Parse (or fetch the memoized) manifest at `manifest_path`.
    ///
    /// # Errors
    ///
    /// `ResolutionError::PackageManifest` when the file cannot be read or is
    /// not valid JSON.
    pub fn get_package(&self, manifest_path: &Path) -> Result<Arc<PackageJson>, ResolutionError> {
        if let Some(cached) = self.cache.get(manifest_path) {
            return Ok(Arc::clone(cached.value()));
        }

        let contents = self.lookup.read_to_string(manifest_path).map_err(|err| {
            ResolutionError::PackageManifest {
                path: manifest_path.to_path_buf(),
                message: err.to_string(),
            }
        })?;

        let mut package: PackageJson =
            serde_json::from_str(&contents).map_err(|err| ResolutionError::PackageManifest {
                path: manifest_path.to_path_buf(),
                message: err.to_string(),
            })?;
        package.path = manifest_path.to_path_buf();

        let package = Arc::new(package);
        self.cache
            .insert(manifest_path.to_path_buf(), Arc::clone(&package));
        debug!(path = %manifest_path.display(), "parsed package manifest");
        Ok(package)
    }

    /// Nearest enclosing package of `path`, found by walking ancestor
    /// directories for a `package.json`. `None` when no ancestor has one or
    /// the nearest manifest is unparseable.
    pub fn get_package_of(&self, path: &Path) -> Option<PackageInfo> {
        let mut dir = path.parent();
        while let Some(current) = dir {
            let manifest = current.join("package.json");
            if self.lookup.is_file(&manifest) {
                let package = self.get_package(&manifest).ok()?;
                let relative_path = path.strip_prefix(current).ok()?.to_path_buf();
                return Some(PackageInfo {
                    package,
                    relative_path,
                });
            }
            dir = current.parent();
        }
        None
    }

    /// Drop the memoized parse for one manifest.
    pub fn invalidate(&self, manifest_path: &Path) {
        self.cache.remove(manifest_path);
    }

    /// Drop everything; used by `resetCache`.
    pub fn invalidate_all(&self) {
        self.cache.clear();
    }
}
