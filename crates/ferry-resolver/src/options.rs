use std::path::PathBuf;

use regex::Regex;
use rustc_hash::FxHashMap;

/// Tunables for the resolution algorithm (`resolver.*` in the bundler
/// configuration).
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Source extensions probed in order, without the dot.
    pub source_exts: Vec<String>,
    /// Asset extensions, without the dot.
    pub asset_exts: Vec<String>,
    /// Density suffixes probed for assets (`1` means no suffix, `2` means
    /// `@2x`, ...).
    pub asset_resolutions: Vec<u32>,
    /// Insert `.native.*` probes between platform-qualified and bare names.
    pub prefer_native_platform: bool,
    /// `package.json` fields consulted for directory resolution, in order.
    pub main_fields: Vec<String>,
    /// Honor the `exports` field when present.
    pub enable_package_exports: bool,
    /// Conditions asserted during `exports` resolution (besides `default`).
    pub condition_names: Vec<String>,
    /// Extra conditions per platform.
    pub conditions_by_platform: FxHashMap<String, Vec<String>>,
    /// Fallback name -> directory map consulted when the `node_modules`
    /// walk comes up empty.
    pub extra_node_modules: FxHashMap<String, PathBuf>,
    /// Additional module directories searched after the ancestor walk.
    pub node_modules_paths: Vec<PathBuf>,
    /// Skip the `node_modules` ancestor walk entirely.
    pub disable_hierarchical_lookup: bool,
    /// Candidates matching this pattern are treated as nonexistent.
    pub block_list: Option<Regex>,
    /// Specifier that always resolves to the empty module.
    pub empty_module_specifier: Option<String>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            source_exts: vec!["js".into(), "jsx".into(), "json".into(), "ts".into(), "tsx".into()],
            asset_exts: vec!["png".into(), "jpg".into(), "jpeg".into(), "gif".into(), "svg".into()],
            asset_resolutions: vec![1, 2, 3],
            prefer_native_platform: true,
            main_fields: vec!["react-native".into(), "browser".into(), "main".into()],
            enable_package_exports: false,
            condition_names: vec!["require".into(), "import".into(), "react-native".into()],
            conditions_by_platform: FxHashMap::default(),
            extra_node_modules: FxHashMap::default(),
            node_modules_paths: Vec::new(),
            disable_hierarchical_lookup: false,
            block_list: None,
            empty_module_specifier: None,
        }
    }
}

impl ResolverOptions {
    /// Conditions asserted for `exports` matching on the given platform.
    pub fn active_conditions(&self, platform: Option<&str>) -> Vec<&str> {
        let mut conditions: Vec<&str> = self.condition_names.iter().map(String::as_str).collect();
        if let Some(platform) = platform {
            if let Some(extra) = self.conditions_by_platform.get(platform) {
                conditions.extend(extra.iter().map(String::as_str));
            }
        }
        conditions
    }

    pub fn is_asset_ext(&self, ext: &str) -> bool {
        self.asset_exts.iter().any(|e| e == ext)
    }

    pub fn is_source_ext(&self, ext: &str) -> bool {
        self.source_exts.iter().any(|e| e == ext)
    }

    pub fn is_blocked(&self, path: &std::path::Path) -> bool {
        self.block_list
            .as_ref()
            .is_some_and(|re| re.is_match(&path.to_string_lossy()))
    }
}
