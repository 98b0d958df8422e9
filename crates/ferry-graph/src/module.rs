use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ModulePath;

/// How a dependency was requested in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    /// `import x from '...'` / `export ... from '...'`
    EsmImport,
    /// `require('...')`
    Require,
    /// `import('...')`
    Async,
}

impl DependencyKind {
    pub fn is_async(self) -> bool {
        matches!(self, DependencyKind::Async)
    }
}

/// Position of a dependency specifier inside its source file.
///
/// Line and column are 1-based, matching what code-frame renderers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

/// One outgoing edge of a module.
///
/// Dependencies keep their textual specifier for diagnostics and re-resolution;
/// `resolved` is filled in during graph construction. `None` means the
/// specifier resolved to the empty-module sentinel and contributes no edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    /// Specifier text as written in the source (`./foo`, `react`, ...).
    pub name: String,
    pub kind: DependencyKind,
    /// All source positions where this specifier appears, in source order.
    pub locations: Vec<SourceLocation>,
    /// Resolved target, or `None` for the empty-module sentinel.
    pub resolved: Option<ModulePath>,
}

impl Dependency {
    pub fn new(name: impl Into<String>, kind: DependencyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            locations: Vec::new(),
            resolved: None,
        }
    }

    /// First recorded source location, used when rendering code frames.
    pub fn first_location(&self) -> Option<SourceLocation> {
        self.locations.first().copied()
    }
}

/// Asset payload for modules resolved from `assetExts`.
///
/// The full set of resolved variant files is carried through the graph; the
/// serializer decides which variant(s) to emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    /// All variant files matched for the asset, e.g. `logo.png`, `logo@2x.png`.
    pub files: Vec<PathBuf>,
}

impl AssetInfo {
    /// Deterministic single-file pick: the lexicographically smallest path.
    pub fn primary_file(&self) -> Option<&PathBuf> {
        self.files.iter().min()
    }
}

/// Transformed payload of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModuleOutput {
    Code {
        code: String,
        /// Serialized source map, when the transformer produced one.
        map: Option<String>,
    },
    Asset(AssetInfo),
}

impl ModuleOutput {
    pub fn code(&self) -> Option<&str> {
        match self {
            ModuleOutput::Code { code, .. } => Some(code),
            ModuleOutput::Asset(_) => None,
        }
    }
}

/// A node in the module graph.
///
/// Heavy payloads (`output`) are wrapped in `Arc` so cloning a module — and,
/// transitively, staging a copy of the whole graph for a transactional
/// update — does not copy transformed code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub path: ModulePath,
    /// Fingerprint of source bytes + transform-relevant options.
    pub source_hash: [u8; 32],
    #[serde(with = "arc_output_serde")]
    pub output: Arc<ModuleOutput>,
    /// Outgoing edges, in source order.
    pub dependencies: Vec<Dependency>,
    /// Stable numeric ID for the serialized bundle.
    pub id: u32,
    pub is_entry: bool,
}

mod arc_output_serde {
    use super::*;
    use serde::de::Deserializer;
    use serde::ser::Serializer;

    pub fn serialize<S>(value: &Arc<ModuleOutput>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.as_ref().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<ModuleOutput>, D::Error>
    where
        D: Deserializer<'de>,
    {
        ModuleOutput::deserialize(deserializer).map(Arc::new)
    }
}

impl Module {
    pub fn new(path: ModulePath, id: u32, source_hash: [u8; 32], output: ModuleOutput) -> Self {
        Self {
            path,
            source_hash,
            output: Arc::new(output),
            dependencies: Vec::new(),
            id,
            is_entry: false,
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn mark_entry(&mut self) {
        self.is_entry = true;
    }

    /// Specifier names in dependency order.
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(|d| d.name.as_str())
    }

    /// Resolved targets of this module, skipping empty-module edges.
    pub fn resolved_targets(&self) -> impl Iterator<Item = &ModulePath> {
        self.dependencies.iter().filter_map(|d| d.resolved.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ModulePath {
        ModulePath::new(s).unwrap()
    }

    #[test]
    fn dependency_order_is_preserved() {
        let mut module = Module::new(
            path("/p/a.js"),
            0,
            [0; 32],
            ModuleOutput::Code {
                code: String::new(),
                map: None,
            },
        );
        module.dependencies = vec![
            Dependency::new("./z", DependencyKind::EsmImport),
            Dependency::new("./a", DependencyKind::Require),
        ];

        let names: Vec<_> = module.dependency_names().collect();
        assert_eq!(names, vec!["./z", "./a"]);
    }

    #[test]
    fn asset_primary_file_is_lexicographically_smallest() {
        let asset = AssetInfo {
            files: vec![
                PathBuf::from("/p/img@3x.png"),
                PathBuf::from("/p/img.png"),
                PathBuf::from("/p/img@2x.png"),
            ],
        };
        assert_eq!(asset.primary_file(), Some(&PathBuf::from("/p/img.png")));
    }

    #[test]
    fn resolved_targets_skip_empty_edges() {
        let mut dep_a = Dependency::new("./a", DependencyKind::EsmImport);
        dep_a.resolved = Some(path("/p/a.js"));
        let dep_empty = Dependency::new("fs", DependencyKind::Require);

        let module = Module::new(
            path("/p/entry.js"),
            0,
            [0; 32],
            ModuleOutput::Code {
                code: String::new(),
                map: None,
            },
        )
        .with_dependencies(vec![dep_a, dep_empty]);

        assert_eq!(module.resolved_targets().count(), 1);
    }
}
