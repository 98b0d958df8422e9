//! Stable numeric module ID assignment.
//!
//! IDs end up in the serialized bundle, so they must be stable across deltas:
//! a module keeps its ID for as long as it stays in a graph, and an ID is
//! handed out again only after its module was deleted. Re-added modules get a
//! fresh ID so clients can tell a re-creation apart from a modification.

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;

use crate::ModulePath;

/// Port for the embedder-supplied `createModuleId` factory.
///
/// Implementations must be deterministic: the same sequence of `assign` /
/// `release` calls yields the same IDs, process-wide.
pub trait ModuleIdProvider: Send + Sync {
    /// ID for `path`, minting one if the path has no live assignment.
    fn assign(&self, path: &ModulePath) -> u32;

    /// Drop the live assignment for `path`. A later `assign` for the same
    /// path mints a fresh ID.
    fn release(&self, path: &ModulePath);
}

/// Default `ModuleIdProvider`: a monotonic counter over first-seen paths.
#[derive(Debug, Default)]
pub struct ModuleIdFactory {
    assigned: DashMap<ModulePath, u32>,
    next: AtomicU32,
}

impl ModuleIdFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModuleIdProvider for ModuleIdFactory {
    fn assign(&self, path: &ModulePath) -> u32 {
        *self
            .assigned
            .entry(path.clone())
            .or_insert_with(|| self.next.fetch_add(1, Ordering::Relaxed))
    }

    fn release(&self, path: &ModulePath) {
        self.assigned.remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ModulePath {
        ModulePath::new(s).unwrap()
    }

    #[test]
    fn assign_is_stable_for_live_paths() {
        let factory = ModuleIdFactory::new();
        let a = path("/p/a.js");

        let first = factory.assign(&a);
        let second = factory.assign(&a);
        assert_eq!(first, second);
    }

    #[test]
    fn distinct_paths_get_distinct_ids() {
        let factory = ModuleIdFactory::new();
        let a = factory.assign(&path("/p/a.js"));
        let b = factory.assign(&path("/p/b.js"));
        assert_ne!(a, b);
    }

    #[test]
    fn released_paths_get_fresh_ids() {
        let factory = ModuleIdFactory::new();
        let a = path("/p/a.js");

        let before = factory.assign(&a);
        factory.release(&a);
        let after = factory.assign(&a);

        assert_ne!(before, after);
    }
}
