//! # ferry-graph
//!
//! Pure data structures for incremental module dependency graphs.
//!
//! This crate provides the graph primitives the delta bundler is built on,
//! without any I/O or transform logic:
//!
//! - **`ModulePath`**: canonical identifier for a module on disk
//! - **`Module`**: a graph node (transform output + ordered dependencies)
//! - **`Graph`**: nodes plus forward/inverse edges for one (entry, options) pair
//! - **`Delta`**: the added/modified/deleted diff between two graph revisions
//! - **`ModuleIdFactory`**: process-wide stable numeric ID assignment
//!
//! The graph is mutated only by the bundler's control loop; heavy per-module
//! payloads are wrapped in `Arc` so staging a copy of the graph for a
//! transactional update is cheap.

pub mod delta;
pub mod graph;
pub mod ids;
pub mod module;
pub mod module_path;

pub use delta::Delta;
pub use graph::Graph;
pub use ids::{ModuleIdFactory, ModuleIdProvider};
pub use module::{
    AssetInfo, Dependency, DependencyKind, Module, ModuleOutput, SourceLocation,
};
pub use module_path::{ModulePath, ModulePathError};
