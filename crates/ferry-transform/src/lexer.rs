//! JavaScript tokenizer.
//!
//! Produces a flat token stream with byte spans, which is all the dependency
//! scanner and the constant folder need: folding works by splicing spans of
//! the original source, never by re-printing whole files.

use std::iter::Peekable;
use std::str::CharIndices;

/// Byte span into the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword.
    Ident(String),
    Number(f64),
    /// String literal with decoded value.
    Str(String),
    /// Template literal, kept raw (never folded).
    Template,
    /// Regex literal, kept raw.
    Regex,
    /// Operator or separator, max-munched.
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// 1-based position of the token start.
    pub line: u32,
    pub column: u32,
    pub newline_before: bool,
}

impl Token {
    pub fn is_punct(&self, text: &str) -> bool {
        matches!(&self.kind, TokenKind::Punct(p) if *p == text)
    }

    pub fn is_ident(&self, text: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(name) if name == text)
    }

    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    pub fn str_value(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Str(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

/// Multi-character operators, longest first for max-munch.
const PUNCTS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "<<", ">>", "**", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".", "@", "#",
];

/// Keywords after which a `/` starts a regex, not a division.
const REGEX_PRECEDING_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case",
    "do", "else", "yield", "await",
];

pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: u32,
    column: u32,
    newline_pending: bool,
    last_significant: Option<TokenKind>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            newline_pending: false,
            last_significant: None,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            if !done {
                self.last_significant = Some(token.kind.clone());
            }
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn pos(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(i, _)| *i)
            .unwrap_or(self.source.len())
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
            self.newline_pending = true;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            line: self.line,
            column: self.column,
        }
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let rest = &self.source[self.pos()..];
                    if rest.starts_with("//") {
                        while let Some(c) = self.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.bump();
                        }
                    } else if rest.starts_with("/*") {
                        self.bump();
                        self.bump();
                        loop {
                            match self.peek() {
                                Some('*') => {
                                    self.bump();
                                    if self.peek() == Some('/') {
                                        self.bump();
                                        break;
                                    }
                                }
                                Some(_) => {
                                    self.bump();
                                }
                                None => return Err(self.error("unterminated block comment")),
                            }
                        }
                    } else {
                        return Ok(());
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        let newline_before = std::mem::take(&mut self.newline_pending);
        let start = self.pos();
        let line = self.line;
        let column = self.column;

        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                span: Span::new(start, start),
                line,
                column,
                newline_before,
            });
        };

        let kind = if c == '_' || c == '$' || c.is_alphabetic() {
            self.lex_ident()
        } else if c.is_ascii_digit() {
            self.lex_number()?
        } else if c == '"' || c == '\'' {
            self.lex_string(c)?
        } else if c == '`' {
            self.lex_template()?
        } else if c == '/' && self.regex_can_follow() {
            self.lex_regex()?
        } else {
            self.lex_punct()?
        };

        Ok(Token {
            kind,
            span: Span::new(start, self.pos()),
            line,
            column,
            newline_before,
        })
    }

    fn lex_ident(&mut self) -> TokenKind {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c == '$' || c.is_alphanumeric() {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        TokenKind::Ident(name)
    }

    fn lex_number(&mut self) -> Result<TokenKind, LexError> {
        let start = self.pos();
        let rest = &self.source[start..];

        // Hex / octal / binary forms.
        if rest.starts_with("0x") || rest.starts_with("0X") {
            self.bump();
            self.bump();
            let digits = self.take_while(|c| c.is_ascii_hexdigit() || c == '_');
            let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
            let value = u64::from_str_radix(&cleaned, 16)
                .map_err(|e| self.error(format!("invalid hex literal: {e}")))?;
            return Ok(TokenKind::Number(value as f64));
        }
        if rest.starts_with("0o") || rest.starts_with("0O") {
            self.bump();
            self.bump();
            let digits = self.take_while(|c| c.is_digit(8) || c == '_');
            let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
            let value = u64::from_str_radix(&cleaned, 8)
                .map_err(|e| self.error(format!("invalid octal literal: {e}")))?;
            return Ok(TokenKind::Number(value as f64));
        }
        if rest.starts_with("0b") || rest.starts_with("0B") {
            self.bump();
            self.bump();
            let digits = self.take_while(|c| c == '0' || c == '1' || c == '_');
            let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
            let value = u64::from_str_radix(&cleaned, 2)
                .map_err(|e| self.error(format!("invalid binary literal: {e}")))?;
            return Ok(TokenKind::Number(value as f64));
        }

        self.take_while(|c| c.is_ascii_digit() || c == '_');
        if self.peek() == Some('.') {
            self.bump();
            self.take_while(|c| c.is_ascii_digit() || c == '_');
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.bump();
            }
            self.take_while(|c| c.is_ascii_digit());
        }

        let raw: String = self.source[start..self.pos()]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        raw.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|e| self.error(format!("invalid number literal: {e}")))
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &str {
        let start = self.pos();
        while let Some(c) = self.peek() {
            if predicate(c) {
                self.bump();
            } else {
                break;
            }
        }
        &self.source[start..self.pos()]
    }

    fn lex_string(&mut self, quote: char) -> Result<TokenKind, LexError> {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(TokenKind::Str(value)),
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('0') => value.push('\0'),
                    Some(escaped) => value.push(escaped),
                    None => return Err(self.error("unterminated string literal")),
                },
                Some('\n') | None => return Err(self.error("unterminated string literal")),
                Some(c) => value.push(c),
            }
        }
    }

    fn lex_template(&mut self) -> Result<TokenKind, LexError> {
        self.bump(); // backtick
        let mut brace_depth = 0usize;
        loop {
            match self.bump() {
                Some('`') if brace_depth == 0 => return Ok(TokenKind::Template),
                Some('\\') => {
                    self.bump();
                }
                Some('$') if brace_depth == 0 && self.peek() == Some('{') => {
                    self.bump();
                    brace_depth += 1;
                }
                Some('{') if brace_depth > 0 => brace_depth += 1,
                Some('}') if brace_depth > 0 => brace_depth -= 1,
                Some(_) => {}
                None => return Err(self.error("unterminated template literal")),
            }
        }
    }

    fn regex_can_follow(&self) -> bool {
        match &self.last_significant {
            None => true,
            Some(TokenKind::Punct(p)) => !matches!(*p, ")" | "]" | "}" | "++" | "--"),
            Some(TokenKind::Ident(name)) => {
                REGEX_PRECEDING_KEYWORDS.contains(&name.as_str())
            }
            _ => false,
        }
    }

    fn lex_regex(&mut self) -> Result<TokenKind, LexError> {
        self.bump(); // leading slash
        let mut in_class = false;
        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some('[') => in_class = true,
                Some(']') => in_class = false,
                Some('/') if !in_class => break,
                Some('\n') | None => return Err(self.error("unterminated regex literal")),
                Some(_) => {}
            }
        }
        // Flags.
        while let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() {
                self.bump();
            } else {
                break;
            }
        }
        Ok(TokenKind::Regex)
    }

    fn lex_punct(&mut self) -> Result<TokenKind, LexError> {
        let rest = &self.source[self.pos()..];
        for punct in PUNCTS {
            if rest.starts_with(punct) {
                for _ in 0..punct.chars().count() {
                    self.bump();
                }
                return Ok(TokenKind::Punct(punct));
            }
        }
        Err(self.error(format!(
            "unexpected character '{}'",
            rest.chars().next().unwrap_or('\0')
        )))
    }
}

/// Tokenize `source` completely.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_identifiers_and_puncts() {
        assert_eq!(
            kinds("const x = y;"),
            vec![
                TokenKind::Ident("const".into()),
                TokenKind::Ident("x".into()),
                TokenKind::Punct("="),
                TokenKind::Ident("y".into()),
                TokenKind::Punct(";"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn max_munches_operators() {
        assert_eq!(
            kinds("a === b ?? c?.d"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Punct("==="),
                TokenKind::Ident("b".into()),
                TokenKind::Punct("??"),
                TokenKind::Ident("c".into()),
                TokenKind::Punct("?."),
                TokenKind::Ident("d".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn decodes_string_escapes() {
        let tokens = tokenize(r#"'a\nb'"#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Str("a\nb".into()));
    }

    #[test]
    fn numbers_in_all_bases() {
        assert_eq!(kinds("0x10"), vec![TokenKind::Number(16.0), TokenKind::Eof]);
        assert_eq!(kinds("0b101"), vec![TokenKind::Number(5.0), TokenKind::Eof]);
        assert_eq!(kinds("1.5e2"), vec![TokenKind::Number(150.0), TokenKind::Eof]);
        assert_eq!(
            kinds("1_000"),
            vec![TokenKind::Number(1000.0), TokenKind::Eof]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("a // line\n/* block */ b"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn templates_with_interpolation_are_single_tokens() {
        assert_eq!(
            kinds("`a ${b + `${c}`} d`"),
            vec![TokenKind::Template, TokenKind::Eof]
        );
    }

    #[test]
    fn regex_vs_division() {
        assert_eq!(
            kinds("a / b"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Punct("/"),
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("return /ab[/]c/g"),
            vec![
                TokenKind::Ident("return".into()),
                TokenKind::Regex,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn spans_point_into_the_source() {
        let source = "let answer = 42;";
        let tokens = tokenize(source).unwrap();
        let answer = &tokens[1];
        assert_eq!(&source[answer.span.start..answer.span.end], "answer");
    }

    #[test]
    fn tracks_lines_and_columns() {
        let tokens = tokenize("a\n  b").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
        assert!(tokens[1].newline_before);
    }
}
