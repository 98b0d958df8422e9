//! Dependency specifier collection.
//!
//! Walks the token stream and records every static import, re-export,
//! `require` call and literal dynamic `import()`, in source order. Repeated
//! specifiers collapse onto their first appearance, keeping every location
//! for diagnostics.

use ferry_graph::{DependencyKind, SourceLocation};
use rustc_hash::FxHashMap;

use crate::lexer::{Token, TokenKind};
use crate::types::DependencyDescriptor;

struct Collector {
    dependencies: Vec<DependencyDescriptor>,
    by_key: FxHashMap<(String, bool), usize>,
}

impl Collector {
    fn new() -> Self {
        Self {
            dependencies: Vec::new(),
            by_key: FxHashMap::default(),
        }
    }

    fn record(&mut self, name: &str, kind: DependencyKind, token: &Token) {
        let location = SourceLocation {
            line: token.line,
            column: token.column,
        };
        let key = (name.to_string(), kind.is_async());
        match self.by_key.get(&key) {
            Some(&index) => self.dependencies[index].locations.push(location),
            None => {
                self.by_key.insert(key, self.dependencies.len());
                self.dependencies.push(DependencyDescriptor {
                    name: name.to_string(),
                    kind,
                    locations: vec![location],
                });
            }
        }
    }
}

/// Collect dependency specifiers from a token stream.
pub fn collect_dependencies(tokens: &[Token]) -> Vec<DependencyDescriptor> {
    let mut collector = Collector::new();
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        match &token.kind {
            TokenKind::Ident(name) if name == "import" => {
                i = scan_import(tokens, i, &mut collector);
            }
            TokenKind::Ident(name) if name == "export" => {
                i = scan_export(tokens, i, &mut collector);
            }
            TokenKind::Ident(name) if name == "require" => {
                i = scan_require(tokens, i, &mut collector);
            }
            _ => i += 1,
        }
    }

    collector.dependencies
}

fn at(tokens: &[Token], index: usize) -> Option<&Token> {
    tokens.get(index)
}

/// `import ...` in all its forms. Returns the next scan position.
fn scan_import(tokens: &[Token], start: usize, collector: &mut Collector) -> usize {
    let next = match at(tokens, start + 1) {
        Some(token) => token,
        None => return start + 1,
    };

    // `import(expr)` — only literal arguments produce a dependency.
    if next.is_punct("(") {
        if let Some(arg) = at(tokens, start + 2) {
            if let Some(value) = arg.str_value() {
                if at(tokens, start + 3).is_some_and(|t| t.is_punct(")")) {
                    collector.record(value, DependencyKind::Async, arg);
                    return start + 4;
                }
            }
        }
        return start + 2;
    }

    // `import.meta` — not a dependency.
    if next.is_punct(".") {
        return start + 2;
    }

    // `import 'side-effect';`
    if let Some(value) = next.str_value() {
        collector.record(value, DependencyKind::EsmImport, next);
        return start + 2;
    }

    // `import d from 'x'`, `import {a, b} from 'x'`, `import * as ns from 'x'`.
    let mut i = start + 1;
    let mut depth = 0usize;
    while let Some(token) = at(tokens, i) {
        match &token.kind {
            TokenKind::Punct("{") => depth += 1,
            TokenKind::Punct("}") => depth = depth.saturating_sub(1),
            TokenKind::Punct(";") if depth == 0 => return i + 1,
            TokenKind::Ident(word) if word == "from" && depth == 0 => {
                if let Some(spec) = at(tokens, i + 1) {
                    if let Some(value) = spec.str_value() {
                        collector.record(value, DependencyKind::EsmImport, spec);
                        return i + 2;
                    }
                }
                return i + 1;
            }
            TokenKind::Eof => return i,
            _ => {}
        }
        i += 1;
    }
    i
}

/// `export ... from 'x'` re-exports. Plain exports produce nothing.
fn scan_export(tokens: &[Token], start: usize, collector: &mut Collector) -> usize {
    let mut i = start + 1;
    let mut depth = 0usize;
    while let Some(token) = at(tokens, i) {
        match &token.kind {
            TokenKind::Punct("{") => depth += 1,
            TokenKind::Punct("}") => depth = depth.saturating_sub(1),
            // A plain export ends at the first statement-ish boundary.
            TokenKind::Punct(";") if depth == 0 => return i + 1,
            TokenKind::Punct("(") | TokenKind::Punct("=") if depth == 0 => return i,
            TokenKind::Ident(word) if word == "from" && depth == 0 => {
                if let Some(spec) = at(tokens, i + 1) {
                    if let Some(value) = spec.str_value() {
                        collector.record(value, DependencyKind::EsmImport, spec);
                        return i + 2;
                    }
                }
                return i + 1;
            }
            TokenKind::Eof => return i,
            _ => {}
        }
        i += 1;
    }
    i
}

/// `require('x')` — bare calls only; `obj.require(...)` is not a dependency.
fn scan_require(tokens: &[Token], start: usize, collector: &mut Collector) -> usize {
    if start > 0 && tokens[start - 1].is_punct(".") {
        return start + 1;
    }
    let open = at(tokens, start + 1);
    if !open.is_some_and(|t| t.is_punct("(")) {
        return start + 1;
    }
    if let Some(arg) = at(tokens, start + 2) {
        if let Some(value) = arg.str_value() {
            if at(tokens, start + 3).is_some_and(|t| t.is_punct(")")) {
                collector.record(value, DependencyKind::Require, arg);
                return start + 4;
            }
        }
    }
    start + 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn deps(source: &str) -> Vec<DependencyDescriptor> {
        collect_dependencies(&tokenize(source).unwrap())
    }

    fn names(source: &str) -> Vec<String> {
        deps(source).into_iter().map(|d| d.name).collect()
    }

    #[test]
    fn collects_default_and_named_imports() {
        let found = deps("import React from 'react';\nimport { useState } from 'react-dom';");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "react");
        assert_eq!(found[0].kind, DependencyKind::EsmImport);
        assert_eq!(found[1].name, "react-dom");
    }

    #[test]
    fn collects_side_effect_and_namespace_imports() {
        assert_eq!(
            names("import './polyfill';\nimport * as all from './ns';"),
            vec!["./polyfill", "./ns"]
        );
    }

    #[test]
    fn collects_re_exports() {
        assert_eq!(
            names("export { a } from './a';\nexport * from './b';\nexport const c = 1;"),
            vec!["./a", "./b"]
        );
    }

    #[test]
    fn collects_require_calls() {
        let found = deps("const fs = require('./impl');");
        assert_eq!(found[0].name, "./impl");
        assert_eq!(found[0].kind, DependencyKind::Require);
    }

    #[test]
    fn member_require_is_not_a_dependency() {
        assert!(names("loader.require('./x');").is_empty());
    }

    #[test]
    fn dynamic_import_with_literal_argument() {
        let found = deps("const page = import('./lazy');");
        assert_eq!(found[0].name, "./lazy");
        assert_eq!(found[0].kind, DependencyKind::Async);
    }

    #[test]
    fn dynamic_import_with_expression_is_ignored() {
        assert!(names("import(prefix + './x');").is_empty());
    }

    #[test]
    fn import_meta_is_not_a_dependency() {
        assert!(names("const u = import.meta.url;").is_empty());
    }

    #[test]
    fn order_matches_source_with_first_appearance_ties() {
        let found = deps(
            "import './z';\nimport './a';\nconst again = require('./z');\nimport './z';",
        );
        // './z' sync records collapse onto the first appearance.
        let sync_names: Vec<_> = found.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(sync_names, vec!["./z", "./a"]);
        assert_eq!(found[0].locations.len(), 3);
    }

    #[test]
    fn named_import_with_from_in_braces() {
        assert_eq!(
            names("import { from as alias } from './tricky';"),
            vec!["./tricky"]
        );
    }

    #[test]
    fn locations_point_at_the_specifier() {
        let found = deps("import x from './a';");
        assert_eq!(found[0].locations[0].line, 1);
        assert_eq!(found[0].locations[0].column, 15);
    }

    #[test]
    fn same_name_sync_and_async_are_distinct() {
        let found = deps("import './m';\nconst lazy = import('./m');");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind, DependencyKind::EsmImport);
        assert_eq!(found[1].kind, DependencyKind::Async);
    }
}
