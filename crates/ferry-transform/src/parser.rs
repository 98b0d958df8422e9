//! Tolerant statement/expression parser for the folding pass.
//!
//! This is not a general JavaScript front end: it understands exactly the
//! shapes constant folding needs (literals, unary/binary/conditional
//! expressions, `if` statements, variable declarations, function
//! declarations) and degrades everything else to opaque, span-accurate nodes.
//! An opaque node can be spliced but never evaluated, so a construct the
//! parser does not model can never be folded incorrectly — it just passes
//! through untouched.

use crate::lexer::{Span, Token, TokenKind};

/// Literal values the folder can evaluate.
#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Plus,
    Minus,
    Void,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    StrictEq,
    StrictNeq,
    LooseEq,
    LooseNeq,
    And,
    Or,
    Nullish,
    /// Any other binary operator; kept for structure, never evaluated.
    Other,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal {
        span: Span,
        value: Lit,
    },
    Ident {
        span: Span,
        name: String,
    },
    Unary {
        span: Span,
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        span: Span,
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Cond {
        span: Span,
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Call {
        span: Span,
        callee: Box<Expr>,
        args: Vec<Expr>,
        /// `foo?.()` — never collapsed by the folder.
        optional: bool,
    },
    Member {
        span: Span,
        object: Box<Expr>,
    },
    Paren {
        span: Span,
        inner: Box<Expr>,
    },
    /// Balanced but unmodeled construct (object/array literals, arrows,
    /// assignments, templates, regexes, ...).
    Opaque {
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal { span, .. }
            | Expr::Ident { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Cond { span, .. }
            | Expr::Call { span, .. }
            | Expr::Member { span, .. }
            | Expr::Paren { span, .. }
            | Expr::Opaque { span } => *span,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    If {
        span: Span,
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Block {
        span: Span,
        /// Span strictly between the braces.
        inner_span: Span,
        body: Vec<Stmt>,
    },
    FunctionDecl {
        span: Span,
        name: String,
        body: Vec<Stmt>,
    },
    VarDecl {
        span: Span,
        initializers: Vec<Expr>,
    },
    ExprStmt {
        span: Span,
        expr: Expr,
    },
    Return {
        span: Span,
        expr: Option<Expr>,
    },
    /// `export default ...` — protected, the folder never touches it.
    ExportDefault {
        span: Span,
    },
    /// Anything else, consumed with balanced delimiters.
    Raw {
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::If { span, .. }
            | Stmt::Block { span, .. }
            | Stmt::FunctionDecl { span, .. }
            | Stmt::VarDecl { span, .. }
            | Stmt::ExprStmt { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::ExportDefault { span }
            | Stmt::Raw { span } => *span,
        }
    }
}

struct ParseFail;

pub struct Parser<'a> {
    tokens: &'a [Token],
    cursor: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, cursor: 0 }
    }

    /// Parse the whole token stream into statements. Never fails: statements
    /// the parser cannot model come back as `Stmt::Raw`.
    pub fn parse_program(&mut self) -> Vec<Stmt> {
        let mut body = Vec::new();
        while !self.at_eof() {
            if self.current().is_punct("}") {
                // Stray close brace; let it pass through untouched.
                let span = self.current().span;
                self.cursor += 1;
                body.push(Stmt::Raw { span });
                continue;
            }
            body.push(self.parse_statement());
        }
        body
    }

    fn at_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn current(&self) -> &Token {
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.cursor + offset).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn advance(&mut self) -> &Token {
        let token = &self.tokens[self.cursor.min(self.tokens.len() - 1)];
        if self.cursor < self.tokens.len() - 1 {
            self.cursor += 1;
        }
        token
    }

    fn eat_punct(&mut self, text: &str) -> bool {
        if self.current().is_punct(text) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn parse_statement(&mut self) -> Stmt {
        let start = self.cursor;
        let result = self.try_parse_statement();
        match result {
            Ok(stmt) => stmt,
            Err(ParseFail) => {
                self.cursor = start;
                self.parse_raw_statement()
            }
        }
    }

    fn try_parse_statement(&mut self) -> Result<Stmt, ParseFail> {
        let token = self.current().clone();

        match &token.kind {
            TokenKind::Punct("{") => {
                let block = self.parse_block()?;
                Ok(block)
            }
            TokenKind::Punct(";") => {
                let span = token.span;
                self.advance();
                Ok(Stmt::Raw { span })
            }
            TokenKind::Ident(name) => match name.as_str() {
                "if" => self.parse_if(),
                "function" => self.parse_function_decl(),
                "var" | "let" | "const" => self.parse_var_decl(),
                "return" => self.parse_return(),
                "export" if self.peek_at(1).is_ident("default") => {
                    Ok(self.parse_export_default())
                }
                "import" | "export" | "class" | "for" | "while" | "do" | "switch" | "try"
                | "throw" | "break" | "continue" | "async" => Err(ParseFail),
                _ => self.parse_expr_statement(),
            },
            _ => self.parse_expr_statement(),
        }
    }

    fn parse_block(&mut self) -> Result<Stmt, ParseFail> {
        let open = self.current().span;
        if !self.eat_punct("{") {
            return Err(ParseFail);
        }
        let inner_start = self.current().span.start;
        let mut body = Vec::new();
        loop {
            if self.at_eof() {
                return Err(ParseFail);
            }
            if self.current().is_punct("}") {
                let inner_end = self.current().span.start;
                let close = self.advance().span;
                return Ok(Stmt::Block {
                    span: Span::new(open.start, close.end),
                    inner_span: Span::new(inner_start, inner_end),
                    body,
                });
            }
            body.push(self.parse_statement());
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseFail> {
        let start = self.current().span.start;
        self.advance(); // if
        if !self.eat_punct("(") {
            return Err(ParseFail);
        }
        let test = self.parse_expr()?;
        if !self.eat_punct(")") {
            return Err(ParseFail);
        }
        let consequent = Box::new(self.parse_statement());
        let mut end = consequent.span().end;
        let alternate = if self.current().is_ident("else") {
            self.advance();
            let alternate = Box::new(self.parse_statement());
            end = alternate.span().end;
            Some(alternate)
        } else {
            None
        };
        Ok(Stmt::If {
            span: Span::new(start, end),
            test,
            consequent,
            alternate,
        })
    }

    fn parse_function_decl(&mut self) -> Result<Stmt, ParseFail> {
        let start = self.current().span.start;
        self.advance(); // function
        self.eat_punct("*");
        let name = match self.current().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                name
            }
            _ => return Err(ParseFail),
        };
        if !self.current().is_punct("(") {
            return Err(ParseFail);
        }
        self.skip_balanced()?; // parameter list
        let Stmt::Block { span: body_span, body, .. } = self.parse_block()? else {
            return Err(ParseFail);
        };
        Ok(Stmt::FunctionDecl {
            span: Span::new(start, body_span.end),
            name,
            body,
        })
    }

    fn parse_var_decl(&mut self) -> Result<Stmt, ParseFail> {
        let start = self.current().span.start;
        self.advance(); // var / let / const
        let mut initializers = Vec::new();

        loop {
            // Binding: a plain name or a balanced destructuring pattern.
            match &self.current().kind {
                TokenKind::Ident(_) => {
                    self.advance();
                }
                TokenKind::Punct("{") | TokenKind::Punct("[") => {
                    self.skip_balanced()?;
                }
                _ => return Err(ParseFail),
            }

            if self.eat_punct("=") {
                initializers.push(self.parse_expr_or_opaque());
            }

            if self.eat_punct(",") {
                continue;
            }
            break;
        }

        let end = self.finish_statement(start)?;
        Ok(Stmt::VarDecl {
            span: Span::new(start, end),
            initializers,
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseFail> {
        let start = self.current().span.start;
        let mut end = self.current().span.end;
        self.advance(); // return

        let expr = if self.current().is_punct(";")
            || self.current().is_punct("}")
            || self.current().newline_before
            || self.at_eof()
        {
            None
        } else {
            let expr = self.parse_expr_or_opaque();
            end = expr.span().end;
            Some(expr)
        };

        let end = self.finish_statement(start).unwrap_or(end);
        Ok(Stmt::Return {
            span: Span::new(start, end),
            expr,
        })
    }

    fn parse_export_default(&mut self) -> Stmt {
        let start = self.current().span.start;
        self.advance(); // export
        self.advance(); // default
        let end = self.scan_raw_boundary();
        Stmt::ExportDefault {
            span: Span::new(start, end),
        }
    }

    fn parse_expr_statement(&mut self) -> Result<Stmt, ParseFail> {
        let start = self.current().span.start;
        let expr = self.parse_expr()?;
        let end = self.finish_statement(start)?;
        Ok(Stmt::ExprStmt {
            span: Span::new(start, end),
            expr,
        })
    }

    /// Consume the statement terminator, honoring automatic semicolon
    /// insertion: `;`, a closing brace, a newline or EOF all end a statement.
    fn finish_statement(&mut self, start: usize) -> Result<usize, ParseFail> {
        if self.current().is_punct(";") {
            let end = self.current().span.end;
            self.advance();
            return Ok(end);
        }
        if self.current().is_punct("}") || self.at_eof() || self.current().newline_before {
            let end = self
                .tokens
                .get(self.cursor.wrapping_sub(1))
                .map(|t| t.span.end)
                .unwrap_or(start);
            return Ok(end);
        }
        Err(ParseFail)
    }

    /// Statement fallback: consume tokens with balanced delimiters until a
    /// plausible boundary and return the covered span.
    fn parse_raw_statement(&mut self) -> Stmt {
        let start_cursor = self.cursor;
        let start = self.current().span.start;
        let end = self.scan_raw_boundary();
        if self.cursor == start_cursor && !self.at_eof() {
            // A stray token the boundary scan refused to consume; skip it so
            // the program loop always makes progress.
            self.advance();
        }
        Stmt::Raw {
            span: Span::new(start, end.max(start)),
        }
    }

    fn scan_raw_boundary(&mut self) -> usize {
        let mut depth = 0usize;
        let mut end = self.current().span.end;

        while !self.at_eof() {
            let token = self.current().clone();
            match &token.kind {
                TokenKind::Punct("{") | TokenKind::Punct("(") | TokenKind::Punct("[") => {
                    depth += 1;
                    end = token.span.end;
                    self.advance();
                }
                TokenKind::Punct("}") | TokenKind::Punct(")") | TokenKind::Punct("]") => {
                    if depth == 0 {
                        // Closing brace of an enclosing block: stop before it.
                        return end;
                    }
                    depth -= 1;
                    end = token.span.end;
                    self.advance();
                    if depth == 0 && token.is_punct("}") {
                        // `} else`, `} catch`, `} finally`, `} while (...)`
                        // continue the same statement.
                        let next = self.current();
                        let continues = next.is_ident("else")
                            || next.is_ident("catch")
                            || next.is_ident("finally")
                            || next.is_ident("while");
                        if !continues {
                            // Optional trailing semicolon.
                            if self.current().is_punct(";") {
                                end = self.advance().span.end;
                            }
                            return end;
                        }
                    }
                }
                TokenKind::Punct(";") if depth == 0 => {
                    end = token.span.end;
                    self.advance();
                    return end;
                }
                _ => {
                    end = token.span.end;
                    self.advance();
                }
            }
        }

        end
    }

    /// Skip one balanced `(...)`, `[...]` or `{...}` group.
    fn skip_balanced(&mut self) -> Result<Span, ParseFail> {
        let open = self.current().clone();
        let close = match &open.kind {
            TokenKind::Punct("(") => ")",
            TokenKind::Punct("[") => "]",
            TokenKind::Punct("{") => "}",
            _ => return Err(ParseFail),
        };
        self.advance();
        let mut depth = 1usize;
        while depth > 0 {
            if self.at_eof() {
                return Err(ParseFail);
            }
            let token = self.advance();
            match &token.kind {
                TokenKind::Punct("(") | TokenKind::Punct("[") | TokenKind::Punct("{") => {
                    depth += 1
                }
                TokenKind::Punct(p) if *p == close && depth == 1 => {
                    return Ok(Span::new(open.span.start, token.span.end));
                }
                TokenKind::Punct(")") | TokenKind::Punct("]") | TokenKind::Punct("}") => {
                    depth -= 1
                }
                _ => {}
            }
        }
        Err(ParseFail)
    }

    /// Expression entry point used by statements: on parse failure the
    /// expression degrades to a balanced opaque span instead of failing the
    /// whole statement.
    fn parse_expr_or_opaque(&mut self) -> Expr {
        let start_cursor = self.cursor;
        match self.parse_expr() {
            Ok(expr) => expr,
            Err(ParseFail) => {
                self.cursor = start_cursor;
                let start = self.current().span.start;
                let end = self.scan_expr_boundary();
                Expr::Opaque {
                    span: Span::new(start, end),
                }
            }
        }
    }

    /// Consume a balanced expression until `,`, `;`, a closing delimiter at
    /// depth zero, or a newline-separated statement boundary.
    fn scan_expr_boundary(&mut self) -> usize {
        let mut depth = 0usize;
        let mut end = self.current().span.start;

        while !self.at_eof() {
            let token = self.current().clone();
            match &token.kind {
                TokenKind::Punct("(") | TokenKind::Punct("[") | TokenKind::Punct("{") => {
                    depth += 1;
                }
                TokenKind::Punct(")") | TokenKind::Punct("]") | TokenKind::Punct("}") => {
                    if depth == 0 {
                        return end;
                    }
                    depth -= 1;
                }
                TokenKind::Punct(";") | TokenKind::Punct(",") if depth == 0 => {
                    return end;
                }
                _ => {}
            }
            end = token.span.end;
            self.advance();
        }
        end
    }

    // ----- Pratt expression parsing -----

    pub fn parse_expr(&mut self) -> Result<Expr, ParseFail> {
        let expr = self.parse_conditional()?;

        // Assignments and arrows exist but are never folded; swallow them
        // into an opaque node so surrounding statements still parse.
        let is_assign = matches!(
            &self.current().kind,
            TokenKind::Punct(
                "=" | "+=" | "-=" | "*=" | "/=" | "%=" | "**=" | "<<=" | ">>=" | ">>>=" | "&="
                    | "|=" | "^=" | "&&=" | "||=" | "??=" | "=>"
            )
        );
        if is_assign {
            self.advance();
            let rest_start = self.cursor;
            let right = match self.parse_expr() {
                Ok(right) => right.span().end,
                Err(ParseFail) => {
                    self.cursor = rest_start;
                    self.scan_expr_boundary()
                }
            };
            return Ok(Expr::Opaque {
                span: Span::new(expr.span().start, right),
            });
        }

        Ok(expr)
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseFail> {
        let test = self.parse_binary(0)?;
        if !self.current().is_punct("?") {
            return Ok(test);
        }
        self.advance();
        let consequent = self.parse_expr()?;
        if !self.eat_punct(":") {
            return Err(ParseFail);
        }
        let alternate = self.parse_expr()?;
        let span = Span::new(test.span().start, alternate.span().end);
        Ok(Expr::Cond {
            span,
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn binary_precedence(token: &Token) -> Option<(BinaryOp, u8)> {
        let TokenKind::Punct(p) = &token.kind else {
            if token.is_ident("instanceof") || token.is_ident("in") {
                return Some((BinaryOp::Other, 10));
            }
            return None;
        };
        let entry = match *p {
            "??" => (BinaryOp::Nullish, 1),
            "||" => (BinaryOp::Or, 2),
            "&&" => (BinaryOp::And, 3),
            "|" => (BinaryOp::Other, 4),
            "^" => (BinaryOp::Other, 5),
            "&" => (BinaryOp::Other, 6),
            "===" => (BinaryOp::StrictEq, 7),
            "!==" => (BinaryOp::StrictNeq, 7),
            "==" => (BinaryOp::LooseEq, 7),
            "!=" => (BinaryOp::LooseNeq, 7),
            "<" | ">" | "<=" | ">=" => (BinaryOp::Other, 10),
            "<<" | ">>" | ">>>" => (BinaryOp::Other, 11),
            "+" | "-" => (BinaryOp::Other, 12),
            "*" | "/" | "%" => (BinaryOp::Other, 13),
            "**" => (BinaryOp::Other, 14),
            _ => return None,
        };
        Some(entry)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr, ParseFail> {
        let mut left = self.parse_unary()?;

        while let Some((op, precedence)) = Self::binary_precedence(self.current()) {
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let right = self.parse_binary(precedence + 1)?;
            let span = Span::new(left.span().start, right.span().end);
            left = Expr::Binary {
                span,
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseFail> {
        let token = self.current().clone();
        let op = match &token.kind {
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Punct("-") => Some(UnaryOp::Minus),
            TokenKind::Punct("~") => Some(UnaryOp::Typeof), // structure only
            TokenKind::Ident(name) if name == "void" => Some(UnaryOp::Void),
            TokenKind::Ident(name) if name == "typeof" => Some(UnaryOp::Typeof),
            TokenKind::Ident(name) if name == "delete" => Some(UnaryOp::Typeof),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            let span = Span::new(token.span.start, operand.span().end);
            return Ok(Expr::Unary {
                span,
                op,
                operand: Box::new(operand),
            });
        }

        if token.is_punct("++") || token.is_punct("--") {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Opaque {
                span: Span::new(token.span.start, operand.span().end),
            });
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseFail> {
        let mut expr = self.parse_primary()?;

        loop {
            let token = self.current().clone();
            match &token.kind {
                TokenKind::Punct(".") => {
                    self.advance();
                    let prop = self.advance().clone();
                    if prop.ident().is_none() {
                        return Err(ParseFail);
                    }
                    expr = Expr::Member {
                        span: Span::new(expr.span().start, prop.span.end),
                        object: Box::new(expr),
                    };
                }
                TokenKind::Punct("?.") => {
                    self.advance();
                    if self.current().is_punct("(") {
                        let args_span = self.skip_balanced()?;
                        expr = Expr::Call {
                            span: Span::new(expr.span().start, args_span.end),
                            callee: Box::new(expr),
                            args: Vec::new(),
                            optional: true,
                        };
                    } else if self.current().is_punct("[") {
                        let idx_span = self.skip_balanced()?;
                        expr = Expr::Member {
                            span: Span::new(expr.span().start, idx_span.end),
                            object: Box::new(expr),
                        };
                    } else {
                        let prop = self.advance().clone();
                        if prop.ident().is_none() {
                            return Err(ParseFail);
                        }
                        expr = Expr::Member {
                            span: Span::new(expr.span().start, prop.span.end),
                            object: Box::new(expr),
                        };
                    }
                }
                TokenKind::Punct("[") => {
                    let idx_span = self.skip_balanced()?;
                    expr = Expr::Member {
                        span: Span::new(expr.span().start, idx_span.end),
                        object: Box::new(expr),
                    };
                }
                TokenKind::Punct("(") => {
                    let args_span = self.skip_balanced()?;
                    expr = Expr::Call {
                        span: Span::new(expr.span().start, args_span.end),
                        callee: Box::new(expr),
                        args: Vec::new(),
                        optional: false,
                    };
                }
                TokenKind::Punct("++") | TokenKind::Punct("--") if !token.newline_before => {
                    self.advance();
                    expr = Expr::Opaque {
                        span: Span::new(expr.span().start, token.span.end),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseFail> {
        let token = self.current().clone();
        match &token.kind {
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expr::Literal {
                    span: token.span,
                    value: Lit::Num(*value),
                })
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expr::Literal {
                    span: token.span,
                    value: Lit::Str(value.clone()),
                })
            }
            TokenKind::Template | TokenKind::Regex => {
                self.advance();
                Ok(Expr::Opaque { span: token.span })
            }
            TokenKind::Ident(name) => match name.as_str() {
                "true" => {
                    self.advance();
                    Ok(Expr::Literal {
                        span: token.span,
                        value: Lit::Bool(true),
                    })
                }
                "false" => {
                    self.advance();
                    Ok(Expr::Literal {
                        span: token.span,
                        value: Lit::Bool(false),
                    })
                }
                "null" => {
                    self.advance();
                    Ok(Expr::Literal {
                        span: token.span,
                        value: Lit::Null,
                    })
                }
                "undefined" => {
                    self.advance();
                    Ok(Expr::Literal {
                        span: token.span,
                        value: Lit::Undefined,
                    })
                }
                "function" | "class" => self.parse_opaque_function_like(),
                "new" => {
                    self.advance();
                    let callee = self.parse_postfix()?;
                    Ok(Expr::Opaque {
                        span: Span::new(token.span.start, callee.span().end),
                    })
                }
                _ => {
                    self.advance();
                    Ok(Expr::Ident {
                        span: token.span,
                        name: name.clone(),
                    })
                }
            },
            TokenKind::Punct("(") => {
                let open = self.current().span;
                self.advance();
                let inner = self.parse_expr()?;
                if !self.current().is_punct(")") {
                    // Not a plain parenthesized expression (sequence, arrow
                    // parameter list): consume balanced and go opaque.
                    let mut depth = 1usize;
                    let mut end = self.current().span.end;
                    while depth > 0 && !self.at_eof() {
                        let t = self.advance();
                        match &t.kind {
                            TokenKind::Punct("(") => depth += 1,
                            TokenKind::Punct(")") => depth -= 1,
                            _ => {}
                        }
                        end = t.span.end;
                    }
                    return Ok(Expr::Opaque {
                        span: Span::new(open.start, end),
                    });
                }
                let close = self.advance().span;
                Ok(Expr::Paren {
                    span: Span::new(open.start, close.end),
                    inner: Box::new(inner),
                })
            }
            TokenKind::Punct("{") | TokenKind::Punct("[") => {
                let span = self.skip_balanced()?;
                Ok(Expr::Opaque { span })
            }
            _ => Err(ParseFail),
        }
    }

    /// `function (...) {...}` / `class ... {...}` in expression position.
    fn parse_opaque_function_like(&mut self) -> Result<Expr, ParseFail> {
        let start = self.current().span.start;
        self.advance(); // function / class
        // Optional name, `extends` clause pieces, generator star.
        while !self.current().is_punct("(")
            && !self.current().is_punct("{")
            && !self.at_eof()
        {
            self.advance();
        }
        if self.current().is_punct("(") {
            self.skip_balanced()?;
        }
        if !self.current().is_punct("{") {
            return Err(ParseFail);
        }
        let body = self.skip_balanced()?;
        Ok(Expr::Opaque {
            span: Span::new(start, body.end),
        })
    }
}

/// Parse a token stream into statements.
pub fn parse(tokens: &[Token]) -> Vec<Stmt> {
    Parser::new(tokens).parse_program()
}
