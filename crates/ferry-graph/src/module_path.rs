use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use path_clean::PathClean;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Canonical identifier for a module in the ferry graph.
///
/// The identifier is always an absolute, lexically-normalized filesystem path
/// so modules arriving via different user inputs (relative vs absolute,
/// `.` vs `..` segments) compare equal. Normalization is purely lexical:
/// the path does not need to exist yet, which matters for watcher events
/// about files created after the graph was built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModulePath(PathBuf);

impl ModulePath {
    /// Create a module path from an absolute filesystem path.
    ///
    /// # Errors
    ///
    /// Returns `ModulePathError::EmptyPath` for an empty input and
    /// `ModulePathError::NotAbsolute` for a relative one. Callers that hold a
    /// relative path should join it onto the project root first.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ModulePathError> {
        let path = path.as_ref();

        if path.as_os_str().is_empty() {
            return Err(ModulePathError::EmptyPath);
        }

        if !path.is_absolute() {
            return Err(ModulePathError::NotAbsolute(path.to_path_buf()));
        }

        Ok(Self(path.to_path_buf().clean()))
    }

    /// Join a relative path onto `root` and normalize the result.
    pub fn under_root(root: &Path, relative: impl AsRef<Path>) -> Result<Self, ModulePathError> {
        Self::new(root.join(relative))
    }

    /// Returns the underlying path.
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Consume the identifier and return the owned path.
    pub fn into_path(self) -> PathBuf {
        self.0
    }

    /// The parent directory, if any.
    pub fn parent(&self) -> Option<&Path> {
        self.0.parent()
    }

    /// Borrow the identifier as a string for logging and hashing.
    pub fn path_string(&self) -> Cow<'_, str> {
        self.0.to_string_lossy()
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path_string())
    }
}

impl AsRef<Path> for ModulePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Serialize for ModulePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.path_string())
    }
}

impl<'de> Deserialize<'de> for ModulePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(ModulePath(PathBuf::from(value)))
    }
}

/// Error type for `ModulePath` construction failures.
#[derive(Debug, Error)]
pub enum ModulePathError {
    /// The provided path was empty.
    #[error("module path is empty")]
    EmptyPath,

    /// The provided path was not absolute.
    #[error("module path must be absolute, got '{}'", .0.display())]
    NotAbsolute(PathBuf),
}
