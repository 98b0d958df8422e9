//! Constant folding over the tolerant AST.
//!
//! Folding is span splicing: a foldable region of the original source is
//! replaced either by a printed literal or by the text of the surviving
//! branch (with its own nested folds applied). Anything the parser marked
//! opaque is spliced verbatim, so unmodeled syntax always survives byte-for-
//! byte.
//!
//! Guard rails, in order of importance:
//! - optional-chained calls are never collapsed,
//! - negative zero is never rewritten,
//! - `void <non-literal>` is left alone,
//! - `export default` statements are never altered.

use crate::lexer::{tokenize, LexError, Span, TokenKind};
use crate::parser::{parse, BinaryOp, Expr, Lit, Stmt, UnaryOp};

#[derive(Debug, Clone)]
struct Edit {
    span: Span,
    text: String,
}

/// Fold statically-known branches in `source` and drop function declarations
/// left unreferenced by the elimination.
pub fn fold_constants(source: &str) -> Result<String, LexError> {
    let mut output = fold_once(source)?;

    // Branch elimination can strand helper functions; sweep until stable.
    for _ in 0..3 {
        let swept = remove_unreferenced_functions(&output)?;
        if swept == output {
            break;
        }
        output = swept;
    }

    Ok(output)
}

fn fold_once(source: &str) -> Result<String, LexError> {
    let tokens = tokenize(source)?;
    let stmts = parse(&tokens);

    let mut edits = Vec::new();
    for stmt in &stmts {
        fold_stmt(source, stmt, &mut edits);
    }
    Ok(apply_edits(source, edits))
}

fn fold_stmt(source: &str, stmt: &Stmt, edits: &mut Vec<Edit>) {
    match stmt {
        Stmt::If {
            span,
            test,
            consequent,
            alternate,
        } => {
            if let Some(value) = eval(test) {
                let chosen: Option<&Stmt> = if truthy(&value) {
                    Some(consequent)
                } else {
                    alternate.as_deref()
                };
                let text = chosen
                    .map(|stmt| fold_stmt_to_string(source, stmt))
                    .unwrap_or_default();
                edits.push(Edit { span: *span, text });
            } else {
                fold_expr(source, test, edits);
                fold_stmt(source, consequent, edits);
                if let Some(alternate) = alternate {
                    fold_stmt(source, alternate, edits);
                }
            }
        }
        Stmt::Block { body, .. } | Stmt::FunctionDecl { body, .. } => {
            for stmt in body {
                fold_stmt(source, stmt, edits);
            }
        }
        Stmt::VarDecl { initializers, .. } => {
            for init in initializers {
                fold_expr(source, init, edits);
            }
        }
        Stmt::ExprStmt { expr, .. } => fold_expr(source, expr, edits),
        Stmt::Return { expr, .. } => {
            if let Some(expr) = expr {
                fold_expr(source, expr, edits);
            }
        }
        Stmt::ExportDefault { .. } | Stmt::Raw { .. } => {}
    }
}

fn fold_expr(source: &str, expr: &Expr, edits: &mut Vec<Edit>) {
    // A literal reprints as itself; replacing it would only churn quoting.
    let is_literal_node = matches!(expr, Expr::Literal { .. });

    if !is_literal_node {
        if let Some(value) = eval(expr) {
            let text = print_lit(&value);
            let span = expr.span();
            if text != &source[span.start..span.end] {
                edits.push(Edit { span, text });
            }
            return;
        }
    }

    match expr {
        Expr::Cond {
            span,
            test,
            consequent,
            alternate,
        } => {
            if let Some(value) = eval(test) {
                let chosen = if truthy(&value) { consequent } else { alternate };
                let text = fold_expr_to_string(source, chosen);
                edits.push(Edit { span: *span, text });
            } else {
                fold_expr(source, test, edits);
                fold_expr(source, consequent, edits);
                fold_expr(source, alternate, edits);
            }
        }
        Expr::Binary {
            span,
            op: op @ (BinaryOp::And | BinaryOp::Or | BinaryOp::Nullish),
            left,
            right,
        } => {
            if let Some(value) = eval(left) {
                let keep_right = match op {
                    BinaryOp::And => truthy(&value),
                    BinaryOp::Or => !truthy(&value),
                    BinaryOp::Nullish => matches!(value, Lit::Null | Lit::Undefined),
                    _ => unreachable!(),
                };
                let side: &Expr = if keep_right { right } else { left };
                let text = fold_expr_to_string(source, side);
                edits.push(Edit { span: *span, text });
            } else {
                fold_expr(source, left, edits);
                fold_expr(source, right, edits);
            }
        }
        Expr::Binary { left, right, .. } => {
            fold_expr(source, left, edits);
            fold_expr(source, right, edits);
        }
        Expr::Unary { op, operand, .. } => {
            // `void foo()` stays as written; only literal operands fold, and
            // those were handled by the whole-expression eval above.
            if !matches!(op, UnaryOp::Void) {
                fold_expr(source, operand, edits);
            }
        }
        Expr::Call { callee, args, .. } => {
            fold_expr(source, callee, edits);
            for arg in args {
                fold_expr(source, arg, edits);
            }
        }
        Expr::Member { object, .. } => fold_expr(source, object, edits),
        Expr::Paren { inner, .. } => fold_expr(source, inner, edits),
        Expr::Literal { .. } | Expr::Ident { .. } | Expr::Opaque { .. } => {}
    }
}

fn fold_stmt_to_string(source: &str, stmt: &Stmt) -> String {
    let mut edits = Vec::new();
    fold_stmt(source, stmt, &mut edits);
    apply_edits_in_span(source, stmt.span(), edits)
}

fn fold_expr_to_string(source: &str, expr: &Expr) -> String {
    let mut edits = Vec::new();
    fold_expr(source, expr, &mut edits);
    apply_edits_in_span(source, expr.span(), edits)
}

fn apply_edits(source: &str, edits: Vec<Edit>) -> String {
    apply_edits_in_span(source, Span::new(0, source.len()), edits)
}

fn apply_edits_in_span(source: &str, span: Span, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|edit| edit.span.start);
    let mut output = String::with_capacity(span.end - span.start);
    let mut position = span.start;
    for edit in edits {
        if edit.span.start < position {
            // Overlapping edit; outermost wins.
            continue;
        }
        output.push_str(&source[position..edit.span.start]);
        output.push_str(&edit.text);
        position = edit.span.end;
    }
    output.push_str(&source[position..span.end]);
    output
}

// ----- Evaluation -----

fn truthy(value: &Lit) -> bool {
    match value {
        Lit::Num(n) => *n != 0.0 && !n.is_nan(),
        Lit::Str(s) => !s.is_empty(),
        Lit::Bool(b) => *b,
        Lit::Null | Lit::Undefined => false,
    }
}

fn strict_eq(left: &Lit, right: &Lit) -> bool {
    match (left, right) {
        (Lit::Num(a), Lit::Num(b)) => a == b,
        (Lit::Str(a), Lit::Str(b)) => a == b,
        (Lit::Bool(a), Lit::Bool(b)) => a == b,
        (Lit::Null, Lit::Null) | (Lit::Undefined, Lit::Undefined) => true,
        _ => false,
    }
}

/// Loose equality, folded only where it cannot surprise: same-type operands
/// plus the null/undefined pair.
fn loose_eq(left: &Lit, right: &Lit) -> Option<bool> {
    match (left, right) {
        (Lit::Null | Lit::Undefined, Lit::Null | Lit::Undefined) => Some(true),
        (Lit::Num(_), Lit::Num(_))
        | (Lit::Str(_), Lit::Str(_))
        | (Lit::Bool(_), Lit::Bool(_)) => Some(strict_eq(left, right)),
        _ => None,
    }
}

fn eval(expr: &Expr) -> Option<Lit> {
    match expr {
        Expr::Literal { value, .. } => Some(value.clone()),
        Expr::Paren { inner, .. } => eval(inner),
        Expr::Unary { op, operand, .. } => {
            let value = eval(operand)?;
            match op {
                UnaryOp::Not => Some(Lit::Bool(!truthy(&value))),
                UnaryOp::Minus => match value {
                    Lit::Num(n) => Some(Lit::Num(-n)),
                    _ => None,
                },
                UnaryOp::Plus => match value {
                    Lit::Num(n) => Some(Lit::Num(n)),
                    _ => None,
                },
                UnaryOp::Void => Some(Lit::Undefined),
                UnaryOp::Typeof => None,
            }
        }
        Expr::Binary {
            op, left, right, ..
        } => {
            let l = eval(left)?;
            match op {
                BinaryOp::StrictEq => Some(Lit::Bool(strict_eq(&l, &eval(right)?))),
                BinaryOp::StrictNeq => Some(Lit::Bool(!strict_eq(&l, &eval(right)?))),
                BinaryOp::LooseEq => loose_eq(&l, &eval(right)?).map(Lit::Bool),
                BinaryOp::LooseNeq => loose_eq(&l, &eval(right)?).map(|b| Lit::Bool(!b)),
                BinaryOp::And => {
                    if truthy(&l) {
                        eval(right)
                    } else {
                        Some(l)
                    }
                }
                BinaryOp::Or => {
                    if truthy(&l) {
                        Some(l)
                    } else {
                        eval(right)
                    }
                }
                BinaryOp::Nullish => {
                    if matches!(l, Lit::Null | Lit::Undefined) {
                        eval(right)
                    } else {
                        Some(l)
                    }
                }
                BinaryOp::Other => None,
            }
        }
        Expr::Cond {
            test,
            consequent,
            alternate,
            ..
        } => {
            let value = eval(test)?;
            if truthy(&value) {
                eval(consequent)
            } else {
                eval(alternate)
            }
        }
        _ => None,
    }
}

fn print_lit(value: &Lit) -> String {
    match value {
        Lit::Num(n) => {
            if *n == 0.0 && n.is_sign_negative() {
                "-0".to_string()
            } else if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{n}")
            }
        }
        Lit::Str(s) => {
            let mut out = String::with_capacity(s.len() + 2);
            out.push('\'');
            for c in s.chars() {
                match c {
                    '\'' => out.push_str("\\'"),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    _ => out.push(c),
                }
            }
            out.push('\'');
            out
        }
        Lit::Bool(true) => "true".to_string(),
        Lit::Bool(false) => "false".to_string(),
        Lit::Null => "null".to_string(),
        Lit::Undefined => "undefined".to_string(),
    }
}

// ----- Unreferenced function elimination -----

fn remove_unreferenced_functions(source: &str) -> Result<String, LexError> {
    let tokens = tokenize(source)?;
    let stmts = parse(&tokens);

    let mut declared: Vec<(String, Span)> = Vec::new();
    collect_function_decls(&stmts, &mut declared);
    if declared.is_empty() {
        return Ok(source.to_string());
    }

    let mut edits = Vec::new();
    for (name, span) in &declared {
        let references = tokens
            .iter()
            .filter(|token| matches!(&token.kind, TokenKind::Ident(ident) if ident == name))
            .count();
        // The declaration itself accounts for one occurrence.
        if references <= 1 {
            edits.push(Edit {
                span: *span,
                text: String::new(),
            });
        }
    }

    Ok(apply_edits(source, edits))
}

fn collect_function_decls(stmts: &[Stmt], out: &mut Vec<(String, Span)>) {
    for stmt in stmts {
        collect_function_decls_in(stmt, out);
    }
}

fn collect_function_decls_in(stmt: &Stmt, out: &mut Vec<(String, Span)>) {
    match stmt {
        Stmt::FunctionDecl { span, name, body } => {
            out.push((name.clone(), *span));
            collect_function_decls(body, out);
        }
        Stmt::Block { body, .. } => collect_function_decls(body, out),
        Stmt::If {
            consequent,
            alternate,
            ..
        } => {
            collect_function_decls_in(consequent, out);
            if let Some(alternate) = alternate {
                collect_function_decls_in(alternate, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(source: &str) -> String {
        fold_constants(source).unwrap()
    }

    #[test]
    fn folds_literal_ternary_on_string_equality() {
        let out = fold("var a = 'android' === 'android' ? {a:1} : {a:0};");
        assert_eq!(out, "var a = {a:1};");
    }

    #[test]
    fn preserves_optional_chained_calls() {
        let source = "foo?.();";
        assert_eq!(fold(source), source);
    }

    #[test]
    fn elides_if_with_false_literal_test() {
        let out = fold("if (false) { x(); }\nkeep();");
        assert!(!out.contains("x()"));
        assert!(out.contains("keep();"));
    }

    #[test]
    fn keeps_the_taken_branch_of_if_else() {
        let out = fold("if (true) { yes(); } else { no(); }");
        assert!(out.contains("yes();"));
        assert!(!out.contains("no()"));
        assert!(!out.contains("if"));
    }

    #[test]
    fn folds_logical_operators_with_literal_lhs() {
        assert_eq!(fold("var a = true && compute();"), "var a = compute();");
        assert_eq!(fold("var b = false && compute();"), "var b = false;");
        assert_eq!(fold("var c = null ?? fallback();"), "var c = fallback();");
        assert_eq!(fold("var d = 'x' ?? fallback();"), "var d = 'x';");
        assert_eq!(fold("var e = 0 || fallback();"), "var e = fallback();");
    }

    #[test]
    fn folds_unary_operators_on_literals() {
        assert_eq!(fold("var a = !false;"), "var a = true;");
        assert_eq!(fold("var b = !0;"), "var b = true;");
    }

    #[test]
    fn folds_void_of_literal_only() {
        assert_eq!(fold("var a = void 0;"), "var a = undefined;");
        let call = "var b = void sideEffect();";
        assert_eq!(fold(call), call);
    }

    #[test]
    fn does_not_rewrite_negative_zero() {
        let source = "var z = -0;";
        assert_eq!(fold(source), source);
    }

    #[test]
    fn export_default_is_never_altered() {
        let source = "export default true ? first : second;";
        assert_eq!(fold(source), source);
    }

    #[test]
    fn folds_numeric_comparisons() {
        assert_eq!(fold("var a = 1 === 1;"), "var a = true;");
        assert_eq!(fold("var b = 1 !== 2;"), "var b = true;");
        assert_eq!(fold("var c = 'ios' === 'android';"), "var c = false;");
    }

    #[test]
    fn loose_equality_folds_only_same_types() {
        assert_eq!(fold("var a = 1 == 1;"), "var a = true;");
        let mixed = "var b = 1 == '1';";
        assert_eq!(fold(mixed), mixed);
    }

    #[test]
    fn removes_functions_stranded_by_branch_elimination() {
        let out = fold(
            "function onlyDev() { return 1; }\nvar x = false ? onlyDev() : 2;\nuse(x);",
        );
        assert!(!out.contains("function onlyDev"));
        assert_eq!(out.matches("onlyDev").count(), 0);
        assert!(out.contains("var x = 2;"));
    }

    #[test]
    fn keeps_referenced_functions() {
        let source = "function used() { return 1; }\nvar x = used();";
        let out = fold(source);
        assert!(out.contains("function used"));
    }

    #[test]
    fn nested_folds_inside_surviving_branches() {
        let out = fold("if (true) { var a = 'a' === 'a' ? 1 : 2; }");
        assert_eq!(out.trim(), "{ var a = 1; }");
    }

    #[test]
    fn untouched_code_passes_through_byte_for_byte() {
        let source = "const f = async (a) => { await a; };\nclass Q { m() { return 1; } }\nfor (let i = 0; i < 2; i++) { f(i); }\n";
        assert_eq!(fold(source), source);
    }

    #[test]
    fn template_literals_are_never_folded() {
        let source = "var s = `a ${1 === 1} b`;";
        assert_eq!(fold(source), source);
    }
}
