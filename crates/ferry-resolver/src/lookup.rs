//! Filesystem port consumed by the resolver.

use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// The only filesystem surface resolution is allowed to touch.
///
/// Implementations must answer consistently within one resolution call;
/// the resolver performs no caching of its own on top of this.
pub trait FileSystemLookup: Send + Sync {
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// Lookup backed by the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileLookup;

impl FileSystemLookup for OsFileLookup {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// In-memory lookup for tests and virtual filesystems.
///
/// Directories are implied by file paths: `/p/src/a.js` makes `/p` and
/// `/p/src` directories.
#[derive(Debug, Default)]
pub struct MemoryFileLookup {
    files: RwLock<FxHashMap<PathBuf, String>>,
}

impl MemoryFileLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.files.write().insert(path.into(), contents.into());
    }

    pub fn remove_file(&self, path: &Path) {
        self.files.write().remove(path);
    }
}

impl FileSystemLookup for MemoryFileLookup {
    fn is_file(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        let files = self.files.read();
        files.keys().any(|file| {
            file.parent()
                .map(|parent| parent.starts_with(path))
                .unwrap_or(false)
        })
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_lookup_implies_directories() {
        let fs = MemoryFileLookup::new();
        fs.add_file("/p/src/a.js", "");

        assert!(fs.is_file(Path::new("/p/src/a.js")));
        assert!(fs.is_dir(Path::new("/p/src")));
        assert!(fs.is_dir(Path::new("/p")));
        assert!(!fs.is_dir(Path::new("/p/src/a.js")));
        assert!(!fs.is_file(Path::new("/p/src")));
    }
}
