//! Conditional `exports` field resolution.
//!
//! Implements the subset of the Node.js `exports` semantics packages actually
//! publish: string targets, condition objects (matched in declaration order),
//! subpath maps with single-`*` patterns, and `null`/`false` stubs. Pattern
//! keys are ranked by the length of their static prefix, longest first.

use serde_json::Value;

/// Outcome of matching a subpath against the `exports` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportsTarget {
    /// Package-relative path, `./`-prefixed as published.
    Path(String),
    /// The subpath is deliberately stubbed out (`null` / `false`).
    Empty,
}

/// Resolve `subpath` (`"."` or `"./sub"`) against an `exports` value.
///
/// Returns `None` when the field does not cover the subpath at all, letting
/// the caller fall back to legacy main-field resolution.
pub fn resolve_exports(
    exports: &Value,
    subpath: &str,
    conditions: &[&str],
) -> Option<ExportsTarget> {
    match exports {
        // Shorthand: "exports": "./index.js" covers the root subpath only.
        Value::String(_) | Value::Array(_) => {
            if subpath == "." {
                resolve_target(exports, "", conditions)
            } else {
                None
            }
        }
        Value::Object(map) => {
            let is_subpath_map = map.keys().any(|key| key.starts_with('.'));
            if is_subpath_map {
                resolve_subpath_map(map, subpath, conditions)
            } else if subpath == "." {
                // Bare condition object at the top level.
                resolve_target(exports, "", conditions)
            } else {
                None
            }
        }
        Value::Null => Some(ExportsTarget::Empty),
        _ => None,
    }
}

fn resolve_subpath_map(
    map: &serde_json::Map<String, Value>,
    subpath: &str,
    conditions: &[&str],
) -> Option<ExportsTarget> {
    // Exact keys win over patterns.
    if let Some(value) = map.get(subpath) {
        return resolve_target(value, "", conditions);
    }

    // Single-`*` patterns, longest static prefix first.
    let mut best: Option<(&str, &Value, String)> = None;
    for (key, value) in map {
        let Some(star) = key.find('*') else { continue };
        let (prefix, suffix) = (&key[..star], &key[star + 1..]);
        if !subpath.starts_with(prefix) || !subpath.ends_with(suffix) {
            continue;
        }
        if subpath.len() < prefix.len() + suffix.len() {
            continue;
        }
        let captured = subpath[prefix.len()..subpath.len() - suffix.len()].to_string();
        let better = match &best {
            Some((best_key, _, _)) => {
                let best_prefix = &best_key[..best_key.find('*').unwrap_or(0)];
                prefix.len() > best_prefix.len()
            }
            None => true,
        };
        if better {
            best = Some((key.as_str(), value, captured));
        }
    }

    let (_, value, captured) = best?;
    resolve_target(value, &captured, conditions)
}

fn resolve_target(value: &Value, captured: &str, conditions: &[&str]) -> Option<ExportsTarget> {
    match value {
        Value::String(target) => Some(ExportsTarget::Path(target.replace('*', captured))),
        Value::Null | Value::Bool(false) => Some(ExportsTarget::Empty),
        Value::Array(alternatives) => alternatives
            .iter()
            .find_map(|alt| resolve_target(alt, captured, conditions)),
        Value::Object(map) => {
            // Condition keys are matched in declaration order; `default`
            // matches unconditionally.
            for (key, nested) in map {
                if key == "default" || conditions.contains(&key.as_str()) {
                    if let Some(target) = resolve_target(nested, captured, conditions) {
                        return Some(target);
                    }
                }
            }
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CONDITIONS: &[&str] = &["import", "react-native"];

    #[test]
    fn string_shorthand_covers_root_only() {
        let exports = json!("./index.js");
        assert_eq!(
            resolve_exports(&exports, ".", CONDITIONS),
            Some(ExportsTarget::Path("./index.js".into()))
        );
        assert_eq!(resolve_exports(&exports, "./sub", CONDITIONS), None);
    }

    #[test]
    fn condition_object_respects_declaration_order() {
        let exports = json!({
            "react-native": "./rn.js",
            "import": "./esm.mjs",
            "default": "./cjs.js"
        });
        assert_eq!(
            resolve_exports(&exports, ".", CONDITIONS),
            Some(ExportsTarget::Path("./rn.js".into()))
        );
    }

    #[test]
    fn unmatched_conditions_fall_to_default() {
        let exports = json!({
            "worker": "./worker.js",
            "default": "./main.js"
        });
        assert_eq!(
            resolve_exports(&exports, ".", CONDITIONS),
            Some(ExportsTarget::Path("./main.js".into()))
        );
    }

    #[test]
    fn subpath_map_exact_match() {
        let exports = json!({
            ".": "./index.js",
            "./feature": { "default": "./feature/index.js" }
        });
        assert_eq!(
            resolve_exports(&exports, "./feature", CONDITIONS),
            Some(ExportsTarget::Path("./feature/index.js".into()))
        );
    }

    #[test]
    fn wildcard_substitution() {
        let exports = json!({
            "./lib/*": "./src/*.js"
        });
        assert_eq!(
            resolve_exports(&exports, "./lib/util/math", CONDITIONS),
            Some(ExportsTarget::Path("./src/util/math.js".into()))
        );
    }

    #[test]
    fn longest_static_prefix_wins() {
        let exports = json!({
            "./*": "./any/*.js",
            "./icons/*": "./icons/*.svg.js"
        });
        assert_eq!(
            resolve_exports(&exports, "./icons/arrow", CONDITIONS),
            Some(ExportsTarget::Path("./icons/arrow.svg.js".into()))
        );
    }

    #[test]
    fn null_target_is_an_empty_stub() {
        let exports = json!({
            ".": "./index.js",
            "./internal/*": null
        });
        assert_eq!(
            resolve_exports(&exports, "./internal/secret", CONDITIONS),
            Some(ExportsTarget::Empty)
        );
    }

    #[test]
    fn uncovered_subpath_is_none() {
        let exports = json!({ ".": "./index.js" });
        assert_eq!(resolve_exports(&exports, "./missing", CONDITIONS), None);
    }
}
