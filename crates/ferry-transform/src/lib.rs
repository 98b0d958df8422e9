//! # ferry-transform
//!
//! Source transformation for the ferry bundler.
//!
//! Two halves live here:
//!
//! - The **transformer port** ([`Transformer`]) plus a default implementation,
//!   [`JsTransformer`], which collects dependency specifiers in source order
//!   and runs a constant-folding pass (literal comparisons, logical and unary
//!   operators, ternaries and `if` statements with literal tests, dead-branch
//!   and unreferenced-function elimination).
//! - The **worker pool** ([`WorkerPool`]) that fans transform requests out to
//!   isolated workers over a request/response protocol, deduplicates
//!   in-flight requests, applies per-call timeouts and respawns crashed
//!   workers.
//!
//! The folder never evaluates anything that is not a literal: optional-chained
//! calls, negative zero and `export default` forms pass through untouched.

mod folder;
pub mod lexer;
mod parser;
mod pool;
mod scanner;
mod transformer;
mod types;

pub use folder::fold_constants;
pub use pool::{WorkerPool, WorkerPoolConfig};
pub use scanner::collect_dependencies;
pub use transformer::JsTransformer;
pub use types::{
    DependencyDescriptor, TransformError, TransformOptions, TransformRequest, TransformedModule,
    Transformer,
};
