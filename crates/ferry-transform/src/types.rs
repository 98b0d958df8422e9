use std::collections::BTreeMap;
use std::path::PathBuf;

use ferry_graph::{DependencyKind, SourceLocation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Options that change transform output. Part of the cache fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TransformOptions {
    pub platform: Option<String>,
    pub dev: bool,
    pub hot: bool,
    pub minify: bool,
    /// Defer module initialization by turning top-level requires lazy.
    /// Recorded in the artifact; rewriting is the transformer's concern.
    pub inline_requires: bool,
    /// Run the constant-folding pass. On by default in production builds.
    pub fold_constants: bool,
    /// Free-form options forwarded to custom transformers. Sorted, so the
    /// fingerprint is order-independent.
    pub custom: BTreeMap<String, String>,
}

/// One unit of work for a transformer.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub file_path: PathBuf,
    pub source: String,
    pub options: TransformOptions,
}

/// A dependency discovered during transformation, before resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyDescriptor {
    pub name: String,
    pub kind: DependencyKind,
    /// Every position the specifier appears at, in source order.
    pub locations: Vec<SourceLocation>,
}

/// Output of a successful transform.
///
/// Serializable: this is the record cache stores persist, keyed by the
/// transform fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformedModule {
    pub code: String,
    pub map: Option<String>,
    /// Specifiers in source order, deduplicated on first appearance.
    pub dependencies: Vec<DependencyDescriptor>,
    /// BLAKE3 hash of the input source bytes.
    pub source_hash: [u8; 32],
}

/// Transform failures.
///
/// `Clone` because a deduplicated in-flight result is broadcast to every
/// waiting caller.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    /// The source could not be parsed. Carries the position for the
    /// bundler's code frame.
    #[error("{path}:{line}:{column}: {message}", path = .path.display())]
    Parse {
        path: PathBuf,
        message: String,
        line: u32,
        column: u32,
    },

    /// A worker died while holding this request.
    #[error("transform worker crashed while processing {}", .path.display())]
    WorkerCrash { path: PathBuf },

    /// The per-call soft timeout expired; the worker is respawned.
    #[error("transform of {} timed out after {timeout_ms}ms", .path.display())]
    Timeout { path: PathBuf, timeout_ms: u64 },

    /// The pool is shutting down.
    #[error("transform pool is closed")]
    PoolClosed,
}

/// The transformer port.
///
/// Implementations receive the full source plus options and return code,
/// an optional source map and the dependency list. They must be pure with
/// respect to their inputs: equal requests produce equal outputs.
pub trait Transformer: Send + Sync {
    /// Version string mixed into cache fingerprints. Bump on any change
    /// that alters output for unchanged inputs.
    fn version(&self) -> &str;

    fn transform(&self, request: &TransformRequest) -> Result<TransformedModule, TransformError>;
}
