//! Haste lookup port.
//!
//! Haste is a flat namespace: modules and packages register a global name
//! independent of their directory location, and bare specifiers consult this
//! index before any `node_modules` walk. The index itself is built elsewhere
//! (typically from `@providesModule` annotations or a package allowlist);
//! the resolver only needs the two lookups below.

use std::path::PathBuf;

pub trait HasteIndex: Send + Sync {
    /// Path of a Haste module registered under `name`.
    fn module_path(&self, name: &str) -> Option<PathBuf>;

    /// Root directory of a Haste package registered under `name`.
    fn package_path(&self, name: &str) -> Option<PathBuf>;
}
