//! # ferry-cache
//!
//! Layered transform cache.
//!
//! A cache is an ordered list of backing stores — typically memory first,
//! then local disk, optionally a remote tier. `get` tries stores in order and
//! back-fills earlier tiers on a hit; `set` writes every tier in parallel.
//! Reads fail hard (a broken store means the current build cannot trust its
//! artifacts); writes fail soft (failures are aggregated and reported, but
//! the build goes on).
//!
//! Keys are content-addressed BLAKE3 fingerprints combining the source bytes
//! with every option that can change the transform output.

mod key;
mod layered;
mod store;

pub use key::{CacheKey, TransformFingerprint};
pub use layered::{CacheError, LayeredCache};
pub use store::{CacheStore, DiskStore, MemoryStore, StoreError};
