//! Default transformer implementation.

use tracing::trace;

use crate::folder::fold_constants;
use crate::lexer::{tokenize, LexError};
use crate::scanner::collect_dependencies;
use crate::types::{TransformError, TransformRequest, TransformedModule, Transformer};

/// Built-in JavaScript transformer: dependency collection plus constant
/// folding.
///
/// Dependencies are collected from the *folded* output, so a `require` inside
/// an eliminated branch does not become an edge in the module graph.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsTransformer;

impl JsTransformer {
    pub fn new() -> Self {
        Self
    }

    fn parse_error(request: &TransformRequest, err: LexError) -> TransformError {
        TransformError::Parse {
            path: request.file_path.clone(),
            message: err.message,
            line: err.line,
            column: err.column,
        }
    }
}

impl Transformer for JsTransformer {
    fn version(&self) -> &str {
        // Mixed into cache fingerprints; bump on output-affecting changes.
        concat!("ferry-js-", env!("CARGO_PKG_VERSION"))
    }

    fn transform(&self, request: &TransformRequest) -> Result<TransformedModule, TransformError> {
        trace!(path = %request.file_path.display(), "transform");

        let code = if request.options.fold_constants {
            fold_constants(&request.source).map_err(|err| Self::parse_error(request, err))?
        } else {
            request.source.clone()
        };

        let tokens = tokenize(&code).map_err(|err| Self::parse_error(request, err))?;
        let dependencies = collect_dependencies(&tokens);

        Ok(TransformedModule {
            code,
            map: None,
            dependencies,
            source_hash: *blake3::hash(request.source.as_bytes()).as_bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransformOptions;
    use ferry_graph::DependencyKind;
    use std::path::PathBuf;

    fn request(source: &str, fold: bool) -> TransformRequest {
        TransformRequest {
            file_path: PathBuf::from("/p/src/mod.js"),
            source: source.to_string(),
            options: TransformOptions {
                fold_constants: fold,
                ..TransformOptions::default()
            },
        }
    }

    #[test]
    fn collects_dependencies_in_source_order() {
        let out = JsTransformer::new()
            .transform(&request(
                "import './b';\nimport './a';\nconst x = require('./c');",
                false,
            ))
            .unwrap();
        let names: Vec<_> = out.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["./b", "./a", "./c"]);
        assert_eq!(out.dependencies[2].kind, DependencyKind::Require);
    }

    #[test]
    fn folding_removes_dead_dependencies() {
        let out = JsTransformer::new()
            .transform(&request(
                "import './live';\nif (false) { require('./dead'); }",
                true,
            ))
            .unwrap();
        let names: Vec<_> = out.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["./live"]);
        assert!(!out.code.contains("./dead"));
    }

    #[test]
    fn source_hash_tracks_the_input() {
        let a = JsTransformer::new()
            .transform(&request("var a = 1;", false))
            .unwrap();
        let b = JsTransformer::new()
            .transform(&request("var a = 2;", false))
            .unwrap();
        assert_ne!(a.source_hash, b.source_hash);
    }

    #[test]
    fn parse_errors_carry_positions() {
        let err = JsTransformer::new()
            .transform(&request("var s = 'unterminated", false))
            .unwrap_err();
        match err {
            TransformError::Parse { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
