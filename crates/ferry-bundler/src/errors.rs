use std::path::PathBuf;

use ferry_graph::SourceLocation;
use thiserror::Error;

/// Bundler-level errors.
///
/// Resolution and transform failures are user errors: they carry enough
/// position information for a code frame and are never retried. Cache reads
/// are fatal to the requesting build; cache writes are logged and absorbed
/// before they ever reach this type.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error(
        "Failed to resolve '{specifier}' from {}{}\n{source}",
        .origin.display(),
        format_location(.location),
    )]
    Resolution {
        specifier: String,
        origin: PathBuf,
        location: Option<SourceLocation>,
        #[source]
        source: ferry_resolver::ResolutionError,
    },

    #[error(transparent)]
    Transform(#[from] ferry_transform::TransformError),

    #[error("cache read failed: {0}")]
    CacheRead(ferry_cache::CacheError),

    #[error("could not read {}{}: {source}", .path.display(), format_importer(.imported_by))]
    ReadSource {
        path: PathBuf,
        imported_by: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    FileMap(#[from] ferry_filemap::FileMapError),

    #[error(transparent)]
    ModulePath(#[from] ferry_graph::ModulePathError),

    #[error("unknown graph id: {0}")]
    UnknownGraph(String),

    #[error("graph was closed")]
    GraphClosed,
}

fn format_location(location: &Option<SourceLocation>) -> String {
    match location {
        Some(loc) => format!(" ({}:{})", loc.line, loc.column),
        None => String::new(),
    }
}

fn format_importer(imported_by: &Option<PathBuf>) -> String {
    match imported_by {
        Some(path) => format!(" (imported by {})", path.display()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_error_points_at_the_dependency() {
        let inner = ferry_resolver::ResolutionError::FailedToResolvePath {
            specifier: "./bar".into(),
            origin: PathBuf::from("/p/src/foo.js"),
            file_candidates: vec![PathBuf::from("/p/src/bar.js")],
            dir_candidates: vec![PathBuf::from("/p/src/bar/index.js")],
        };
        let err = BundleError::Resolution {
            specifier: "./bar".into(),
            origin: PathBuf::from("/p/src/foo.js"),
            location: Some(SourceLocation { line: 3, column: 18 }),
            source: inner,
        };

        let message = err.to_string();
        assert!(message.contains("./bar"));
        assert!(message.contains("(3:18)"));
        assert!(message.contains("/p/src/bar.js"));
        assert!(message.contains("/p/src/bar/index.js"));
    }
}
