//! # ferry-bundler
//!
//! The incremental delta bundler.
//!
//! [`GraphEngine`] owns the traversal: an initial build walks from the entry
//! through resolver + transform pool (cache-checked per file) into a complete
//! [`ferry_graph::Graph`]; an incremental update applies a coalesced batch of
//! watcher events to a staged copy of the graph transactionally, producing a
//! [`ferry_graph::Delta`].
//!
//! [`IncrementalBundler`] keeps the set of live graphs: one revision counter,
//! event pump and delta journal per `(entry, options)` pair, deduplicated
//! in-flight initial builds, and `get_delta(since)` with a full-snapshot
//! reset when the journal no longer covers the caller's revision.

mod bundler;
mod errors;
mod events;
mod graph_engine;
mod options;

pub use bundler::{ChangeEvent, GraphHandle, GraphId, IncrementalBundler};
pub use errors::BundleError;
pub use events::EventBatch;
pub use graph_engine::GraphEngine;
pub use options::{BundlerOptions, GraphOptions, NormalizedOptions, TransformerOptions, WatcherOptions};
