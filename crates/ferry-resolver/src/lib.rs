//! # ferry-resolver
//!
//! Turns textual import specifiers into concrete file paths.
//!
//! The resolver is a pure function over an injected [`FileSystemLookup`]:
//! given an origin file, a specifier and a platform it classifies the
//! specifier (relative / absolute / bare), probes extension and platform
//! variants, consults `package.json` (`exports`, `browser`, `main` fields),
//! walks `node_modules` ancestors and falls back to the configured extra
//! module maps. Equal inputs always produce equal outputs.
//!
//! `package.json` contents are memoized in a [`PackageCache`] which the file
//! map invalidates when a manifest changes on disk.

mod errors;
mod exports_field;
mod haste;
mod lookup;
mod options;
mod package;
mod resolver;

pub use errors::ResolutionError;
pub use haste::HasteIndex;
pub use lookup::{FileSystemLookup, MemoryFileLookup, OsFileLookup};
pub use options::ResolverOptions;
pub use package::{PackageCache, PackageInfo, PackageJson};
pub use resolver::{Resolution, ResolveContext, ResolveRequestHook, Resolver};
