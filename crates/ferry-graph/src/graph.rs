//! The module graph for one (entry, options) pair.
//!
//! Forward edges live on each module's ordered dependency list; the graph
//! additionally maintains a reverse-edge map so orphan collection and
//! affected-set computation stay O(edges touched). Both views are kept in
//! sync by the insert/remove operations here.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{Module, ModulePath};

/// Nodes plus edges for one (entry, options) pair.
///
/// Cloning a graph stages a cheap copy (module outputs are `Arc`-shared),
/// which is how the delta engine gets transactional updates: mutate the
/// clone, then either commit it or drop it.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: FxHashMap<ModulePath, Module>,
    entry_points: FxHashSet<ModulePath>,
    /// Reverse edges: target -> set of modules whose dependency list resolves
    /// to the target.
    dependents: FxHashMap<ModulePath, FxHashSet<ModulePath>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, path: &ModulePath) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn module(&self, path: &ModulePath) -> Option<&Module> {
        self.nodes.get(path)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.nodes.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &ModulePath> {
        self.nodes.keys()
    }

    pub fn entry_points(&self) -> &FxHashSet<ModulePath> {
        &self.entry_points
    }

    pub fn is_entry(&self, path: &ModulePath) -> bool {
        self.entry_points.contains(path)
    }

    /// Modules that directly depend on `path` (inverse edges).
    pub fn dependents(&self, path: &ModulePath) -> Option<&FxHashSet<ModulePath>> {
        self.dependents.get(path)
    }

    pub fn add_entry_point(&mut self, path: ModulePath) {
        if let Some(module) = self.nodes.get_mut(&path) {
            module.is_entry = true;
        }
        self.entry_points.insert(path);
    }

    /// Insert or replace a module, keeping the reverse-edge map consistent.
    ///
    /// On replacement, reverse edges contributed by the old dependency list
    /// are retracted before the new ones are registered.
    pub fn insert_module(&mut self, mut module: Module) {
        if self.entry_points.contains(&module.path) {
            module.is_entry = true;
        }

        if let Some(previous) = self.nodes.get(&module.path) {
            let old_targets: Vec<ModulePath> = previous.resolved_targets().cloned().collect();
            for target in old_targets {
                self.retract_edge(&module.path, &target);
            }
        }

        for target in module.resolved_targets() {
            self.dependents
                .entry(target.clone())
                .or_default()
                .insert(module.path.clone());
        }

        self.nodes.insert(module.path.clone(), module);
    }

    /// Remove a module and all reverse edges it contributed.
    ///
    /// Returns the removed module. Reverse edges *into* the removed module are
    /// left for the caller: the delta engine removes referrers first (or is
    /// about to re-resolve them), and the unreachable sweep handles cycles.
    pub fn remove_module(&mut self, path: &ModulePath) -> Option<Module> {
        let module = self.nodes.remove(path)?;
        let targets: Vec<ModulePath> = module.resolved_targets().cloned().collect();
        for target in targets {
            self.retract_edge(path, &target);
        }
        self.dependents.remove(path);
        Some(module)
    }

    fn retract_edge(&mut self, from: &ModulePath, to: &ModulePath) {
        if let Some(set) = self.dependents.get_mut(to) {
            set.remove(from);
            if set.is_empty() {
                self.dependents.remove(to);
            }
        }
    }

    /// Paths reachable from the entry set via resolved dependency edges.
    pub fn reachable_from_entries(&self) -> FxHashSet<ModulePath> {
        let mut seen: FxHashSet<ModulePath> = FxHashSet::default();
        let mut queue: Vec<&ModulePath> = Vec::new();

        for entry in &self.entry_points {
            if self.nodes.contains_key(entry) && seen.insert(entry.clone()) {
                queue.push(entry);
            }
        }

        while let Some(path) = queue.pop() {
            let Some(module) = self.nodes.get(path) else {
                continue;
            };
            for target in module.resolved_targets() {
                if self.nodes.contains_key(target) && seen.insert(target.clone()) {
                    queue.push(target);
                }
            }
        }

        seen
    }

    /// Remove every module unreachable from the entry set and return the
    /// removed paths.
    ///
    /// This is the cycle-safe orphan collection: a strongly-connected group
    /// severed from all entries keeps positive inverse-edge counts among its
    /// members, so reachability — not reference counts — decides liveness.
    pub fn sweep_unreachable(&mut self) -> Vec<ModulePath> {
        let reachable = self.reachable_from_entries();
        let dead: Vec<ModulePath> = self
            .nodes
            .keys()
            .filter(|path| !reachable.contains(*path))
            .cloned()
            .collect();

        for path in &dead {
            self.remove_module(path);
        }

        dead
    }

    /// Modules that transitively depend on any path in `changed`, including
    /// the changed paths themselves. BFS over reverse edges.
    pub fn affected_by(&self, changed: &FxHashSet<ModulePath>) -> FxHashSet<ModulePath> {
        let mut affected: FxHashSet<ModulePath> = changed
            .iter()
            .filter(|p| self.nodes.contains_key(*p))
            .cloned()
            .collect();
        let mut queue: Vec<ModulePath> = affected.iter().cloned().collect();

        while let Some(path) = queue.pop() {
            if let Some(dependents) = self.dependents.get(&path) {
                for dependent in dependents {
                    if affected.insert(dependent.clone()) {
                        queue.push(dependent.clone());
                    }
                }
            }
        }

        affected
    }

    /// Validate the structural invariants a quiescent graph must hold.
    ///
    /// Intended for tests and debug assertions:
    /// 1. every resolved dependency target is present as a node,
    /// 2. every non-entry node has at least one dependent,
    /// 3. module IDs are unique,
    /// 4. the reverse-edge map matches the forward dependency lists.
    pub fn check_consistency(&self) -> Result<(), String> {
        let mut seen_ids: FxHashMap<u32, &ModulePath> = FxHashMap::default();

        for (path, module) in &self.nodes {
            if let Some(other) = seen_ids.insert(module.id, path) {
                return Err(format!(
                    "duplicate module id {} for {} and {}",
                    module.id, other, path
                ));
            }

            for target in module.resolved_targets() {
                if !self.nodes.contains_key(target) {
                    return Err(format!("{path} depends on missing node {target}"));
                }
                if !self
                    .dependents
                    .get(target)
                    .is_some_and(|set| set.contains(path))
                {
                    return Err(format!("missing reverse edge {path} -> {target}"));
                }
            }
        }

        for path in self.nodes.keys() {
            if self.entry_points.contains(path) {
                continue;
            }
            if !self.dependents.get(path).is_some_and(|set| !set.is_empty()) {
                return Err(format!("non-entry node {path} has no dependents"));
            }
        }

        for (target, sources) in &self.dependents {
            for source in sources {
                let forward = self
                    .nodes
                    .get(source)
                    .is_some_and(|m| m.resolved_targets().any(|t| t == target));
                if !forward {
                    return Err(format!("stale reverse edge {source} -> {target}"));
                }
            }
        }

        Ok(())
    }
}
