//! Incremental diffs between graph revisions.

use rustc_hash::FxHashSet;

use crate::{Module, ModulePath};

/// The difference between two committed revisions of a graph.
///
/// `reset = true` means the receiver's base revision was unknown or evicted
/// from the journal, and `added` carries a full snapshot instead of a diff.
#[derive(Debug, Clone, Default)]
pub struct Delta {
    pub added: Vec<Module>,
    pub modified: Vec<Module>,
    pub deleted: FxHashSet<ModulePath>,
    pub reset: bool,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty() && !self.reset
    }

    /// Full-snapshot delta for callers whose base revision is gone.
    pub fn reset_with(modules: Vec<Module>) -> Self {
        Self {
            added: modules,
            modified: Vec::new(),
            deleted: FxHashSet::default(),
            reset: true,
        }
    }

    /// Merge `next` on top of `self`, producing the delta equivalent to
    /// applying both in sequence.
    ///
    /// Per-path rules relative to the base of `self`:
    /// - added then modified        -> added (with the newer module)
    /// - added then deleted         -> no record at all
    /// - modified then deleted      -> deleted
    /// - deleted then (re-)added    -> modified (the base already had it)
    /// - modified then modified     -> modified (newer wins)
    pub fn compose(mut self, next: Delta) -> Delta {
        if next.reset {
            return next;
        }

        let mut added: Vec<Module> = Vec::new();
        let mut modified: Vec<Module> = Vec::new();

        let next_deleted: FxHashSet<ModulePath> = next.deleted;
        let first_added: FxHashSet<ModulePath> =
            self.added.iter().map(|m| m.path.clone()).collect();

        // Carry forward first-delta records not superseded by the second.
        let next_touched: FxHashSet<ModulePath> = next
            .added
            .iter()
            .chain(next.modified.iter())
            .map(|m| m.path.clone())
            .collect();

        for module in self.added.drain(..) {
            if next_deleted.contains(&module.path) || next_touched.contains(&module.path) {
                continue;
            }
            added.push(module);
        }
        for module in self.modified.drain(..) {
            if next_deleted.contains(&module.path) || next_touched.contains(&module.path) {
                continue;
            }
            modified.push(module);
        }

        let mut deleted = self.deleted;

        for module in next.added {
            if deleted.remove(&module.path) {
                // Existed in the base, went away, came back: a net modify.
                modified.push(module);
            } else {
                added.push(module);
            }
        }

        for module in next.modified {
            if first_added.contains(&module.path) {
                // Added then modified within the composed window: still an add.
                added.push(module);
            } else {
                modified.push(module);
            }
        }

        for path in next_deleted {
            if !first_added.contains(&path) {
                deleted.insert(path);
            }
            // added-then-deleted collapses to nothing.
        }

        Delta {
            added,
            modified,
            deleted,
            reset: self.reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModuleOutput;

    fn module(path: &str, id: u32) -> Module {
        Module::new(
            ModulePath::new(path).unwrap(),
            id,
            [id as u8; 32],
            ModuleOutput::Code {
                code: format!("// {id}"),
                map: None,
            },
        )
    }

    fn paths(modules: &[Module]) -> Vec<String> {
        let mut out: Vec<String> = modules.iter().map(|m| m.path.to_string()).collect();
        out.sort();
        out
    }

    #[test]
    fn added_then_deleted_cancels_out() {
        let d1 = Delta {
            added: vec![module("/p/a.js", 1)],
            ..Delta::default()
        };
        let mut d2 = Delta::default();
        d2.deleted.insert(ModulePath::new("/p/a.js").unwrap());

        let composed = d1.compose(d2);
        assert!(composed.is_empty());
    }

    #[test]
    fn added_then_modified_stays_added() {
        let d1 = Delta {
            added: vec![module("/p/a.js", 1)],
            ..Delta::default()
        };
        let d2 = Delta {
            modified: vec![module("/p/a.js", 1)],
            ..Delta::default()
        };

        let composed = d1.compose(d2);
        assert_eq!(paths(&composed.added), vec!["/p/a.js"]);
        assert!(composed.modified.is_empty());
    }

    #[test]
    fn deleted_then_added_becomes_modified() {
        let mut d1 = Delta::default();
        d1.deleted.insert(ModulePath::new("/p/a.js").unwrap());
        let d2 = Delta {
            added: vec![module("/p/a.js", 7)],
            ..Delta::default()
        };

        let composed = d1.compose(d2);
        assert!(composed.deleted.is_empty());
        assert_eq!(paths(&composed.modified), vec!["/p/a.js"]);
    }

    #[test]
    fn reset_in_second_delta_wins() {
        let d1 = Delta {
            modified: vec![module("/p/a.js", 1)],
            ..Delta::default()
        };
        let d2 = Delta::reset_with(vec![module("/p/a.js", 2), module("/p/b.js", 3)]);

        let composed = d1.compose(d2);
        assert!(composed.reset);
        assert_eq!(composed.added.len(), 2);
    }

    #[test]
    fn unrelated_records_are_carried_through() {
        let d1 = Delta {
            added: vec![module("/p/a.js", 1)],
            modified: vec![module("/p/b.js", 2)],
            ..Delta::default()
        };
        let mut d2 = Delta {
            modified: vec![module("/p/c.js", 3)],
            ..Delta::default()
        };
        d2.deleted.insert(ModulePath::new("/p/d.js").unwrap());

        let composed = d1.compose(d2);
        assert_eq!(paths(&composed.added), vec!["/p/a.js"]);
        assert_eq!(paths(&composed.modified), vec!["/p/b.js", "/p/c.js"]);
        assert!(composed
            .deleted
            .contains(&ModulePath::new("/p/d.js").unwrap()));
    }
}
