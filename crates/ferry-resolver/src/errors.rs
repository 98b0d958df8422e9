use std::path::PathBuf;

use thiserror::Error;

fn format_candidates(candidates: &[PathBuf]) -> String {
    if candidates.is_empty() {
        return "(none)".to_string();
    }
    candidates
        .iter()
        .map(|p| format!("  * {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolution failures, surfaced to the user with a code frame by the
/// bundler. Never retried.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// A relative or absolute specifier could not be mapped to a file.
    /// Carries every candidate path the prober tested.
    #[error(
        "Unable to resolve '{specifier}' from '{}'.\n\nTried these files:\n{}\n\nAnd these directories:\n{}",
        .origin.display(),
        format_candidates(.file_candidates),
        format_candidates(.dir_candidates),
    )]
    FailedToResolvePath {
        specifier: String,
        origin: PathBuf,
        file_candidates: Vec<PathBuf>,
        dir_candidates: Vec<PathBuf>,
    },

    /// A bare specifier was not found in any module directory.
    #[error(
        "Unable to resolve module '{specifier}' from '{}'.\n\nSearched in:\n{}\n\nExtra module mappings tried:\n{}",
        .origin.display(),
        format_candidates(.searched_dirs),
        format_candidates(.extra_paths),
    )]
    FailedToResolveName {
        specifier: String,
        origin: PathBuf,
        searched_dirs: Vec<PathBuf>,
        extra_paths: Vec<PathBuf>,
    },

    /// Structurally invalid specifier, e.g. an unsupported URL scheme.
    #[error("Unsupported specifier '{specifier}': {reason}")]
    FailedToResolveUnsupported { specifier: String, reason: String },

    /// A `package.json` could not be read or parsed.
    #[error("Failed to read package manifest {}: {message}", .path.display())]
    PackageManifest { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_error_names_every_candidate() {
        let err = ResolutionError::FailedToResolvePath {
            specifier: "./bar".into(),
            origin: PathBuf::from("/p/src/foo.js"),
            file_candidates: vec![
                PathBuf::from("/p/src/bar.js"),
                PathBuf::from("/p/src/bar.json"),
            ],
            dir_candidates: vec![PathBuf::from("/p/src/bar/index.js")],
        };

        let message = err.to_string();
        assert!(message.contains("/p/src/bar.js"));
        assert!(message.contains("/p/src/bar/index.js"));
        assert!(message.contains("/p/src/foo.js"));
    }

    #[test]
    fn name_error_lists_searched_directories() {
        let err = ResolutionError::FailedToResolveName {
            specifier: "react".into(),
            origin: PathBuf::from("/p/src/app.js"),
            searched_dirs: vec![
                PathBuf::from("/p/src/node_modules"),
                PathBuf::from("/p/node_modules"),
            ],
            extra_paths: vec![],
        };

        let message = err.to_string();
        assert!(message.contains("/p/src/node_modules"));
        assert!(message.contains("(none)"));
    }
}
