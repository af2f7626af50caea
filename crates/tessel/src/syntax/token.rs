//! Tokens and token streams.

use std::fmt;

use crate::error::{Error, Result};

/// Kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    VarStart,
    VarEnd,
    BlockStart,
    BlockEnd,
    Name,
    Number,
    String,
    Operator,
    Punctuation,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TokenKind::Text => "text",
            TokenKind::VarStart => "begin of print statement",
            TokenKind::VarEnd => "end of print statement",
            TokenKind::BlockStart => "begin of statement block",
            TokenKind::BlockEnd => "end of statement block",
            TokenKind::Name => "name",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Operator => "operator",
            TokenKind::Punctuation => "punctuation",
            TokenKind::Eof => "end of template",
        };
        f.write_str(label)
    }
}

/// A lexed token with its source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            line,
        }
    }

    /// Returns true if the token has `kind` and, when given, `value`.
    pub fn test(&self, kind: TokenKind, value: Option<&str>) -> bool {
        self.kind == kind && value.map_or(true, |v| self.value == v)
    }

    /// Shorthand for a punctuation test.
    pub fn is_punctuation(&self, value: &str) -> bool {
        self.test(TokenKind::Punctuation, Some(value))
    }

    /// Shorthand for a name test.
    pub fn is_name(&self, value: &str) -> bool {
        self.test(TokenKind::Name, Some(value))
    }
}

/// The token sequence of one template.
///
/// The stream always ends with an [`TokenKind::Eof`] token.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    position: usize,
    template_name: String,
}

impl TokenStream {
    pub fn new(mut tokens: Vec<Token>, template_name: impl Into<String>) -> Self {
        if tokens.last().map_or(true, |t| t.kind != TokenKind::Eof) {
            let line = tokens.last().map_or(1, |t| t.line);
            tokens.push(Token::new(TokenKind::Eof, "", line));
        }
        Self {
            tokens,
            position: 0,
            template_name: template_name.into(),
        }
    }

    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    pub fn current(&self) -> &Token {
        &self.tokens[self.position]
    }

    /// Looks `n` tokens ahead of the current one, clamped to the end.
    pub fn look(&self, n: usize) -> &Token {
        let index = (self.position + n).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    /// Consumes and returns the current token.
    pub fn next(&mut self) -> Token {
        let token = self.tokens[self.position].clone();
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    /// Consumes the current token if it matches.
    pub fn next_if(&mut self, kind: TokenKind, value: Option<&str>) -> Option<Token> {
        if self.current().test(kind, value) {
            Some(self.next())
        } else {
            None
        }
    }

    /// Consumes the current token, failing if it does not match.
    pub fn expect(&mut self, kind: TokenKind, value: Option<&str>) -> Result<Token> {
        let token = self.current();
        if !token.test(kind, value) {
            let expected = match value {
                Some(v) => format!("{} \"{}\"", kind, v),
                None => kind.to_string(),
            };
            let found = match token.kind {
                TokenKind::Eof => token.kind.to_string(),
                _ => format!("{} \"{}\"", token.kind, token.value),
            };
            return Err(Error::syntax(
                format!("Unexpected token {} ({} expected).", found, expected),
                Some(token.line),
            )
            .with_template_name(self.template_name.clone()));
        }
        Ok(self.next())
    }

    pub fn is_eof(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}
