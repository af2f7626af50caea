//! Template tokenizer.
//!
//! [`DefaultLexer`] splits a template into text and delimited blocks:
//!
//! | Delimiters | Produces |
//! |------------|----------|
//! | `{{ … }}` | `VarStart`, expression tokens, `VarEnd` |
//! | `{% … %}` | `BlockStart`, expression tokens, `BlockEnd` |
//! | `{# … #}` | nothing (comment) |
//!
//! Inside a block, operators are matched against the environment's frozen
//! operator tables, longest first. Operators spelled as words (`not`, `and`,
//! `in`) only match on a word boundary, so `notice` stays a name.

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::syntax::token::{Token, TokenKind, TokenStream};

const PUNCTUATION: &str = "()[]{}?:.,|=";

/// Converts template source into a [`TokenStream`].
pub trait Lexer: Send + Sync {
    fn tokenize(&self, env: &Environment, source: &str, name: &str) -> Result<TokenStream>;
}

/// The built-in lexer.
#[derive(Debug, Default, Clone)]
pub struct DefaultLexer;

impl DefaultLexer {
    pub fn new() -> Self {
        Self
    }
}

impl Lexer for DefaultLexer {
    fn tokenize(&self, env: &Environment, source: &str, name: &str) -> Result<TokenStream> {
        let mut operators: Vec<&str> = env
            .unary_operators()?
            .keys()
            .chain(env.binary_operators()?.keys())
            .map(String::as_str)
            .collect();
        operators.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        operators.dedup();

        let tokens = Scanner {
            source,
            position: 0,
            line: 1,
            tokens: Vec::new(),
            operators,
        }
        .run()
        .map_err(|err| err.with_template_name(name))?;

        tracing::trace!(template = name, tokens = tokens.len(), "tokenized template");
        Ok(TokenStream::new(tokens, name))
    }
}

struct Scanner<'a> {
    source: &'a str,
    position: usize,
    line: usize,
    tokens: Vec<Token>,
    operators: Vec<&'a str>,
}

impl<'a> Scanner<'a> {
    fn run(mut self) -> Result<Vec<Token>> {
        let source = self.source;
        while self.position < source.len() {
            let rest = &source[self.position..];
            let Some(start) = next_delimiter(rest) else {
                self.push_text(rest);
                self.position = source.len();
                break;
            };

            self.push_text(&rest[..start]);
            self.position += start;
            let opener = &source[self.position..self.position + 2];
            self.position += 2;

            match opener {
                "{#" => self.skip_comment()?,
                "{{" => self.lex_block(TokenKind::VarStart, TokenKind::VarEnd, "}}", "variable")?,
                _ => self.lex_block(TokenKind::BlockStart, TokenKind::BlockEnd, "%}", "block")?,
            }
        }
        self.tokens.push(Token::new(TokenKind::Eof, "", self.line));
        Ok(self.tokens)
    }

    fn push_text(&mut self, text: &str) {
        if !text.is_empty() {
            self.tokens.push(Token::new(TokenKind::Text, text, self.line));
            self.line += newlines(text);
        }
    }

    fn skip_comment(&mut self) -> Result<()> {
        let source = self.source;
        let rest = &source[self.position..];
        let end = rest
            .find("#}")
            .ok_or_else(|| Error::syntax("Unclosed comment.", Some(self.line)))?;
        self.line += newlines(&rest[..end]);
        self.position += end + 2;
        Ok(())
    }

    fn lex_block(
        &mut self,
        start: TokenKind,
        end: TokenKind,
        closer: &str,
        label: &str,
    ) -> Result<()> {
        let opened_at = self.line;
        self.tokens.push(Token::new(start, "", self.line));
        let source = self.source;
        loop {
            self.skip_whitespace();
            let rest = &source[self.position..];
            if rest.is_empty() {
                return Err(Error::syntax(
                    format!("Unclosed \"{}\".", label),
                    Some(opened_at),
                ));
            }
            if rest.starts_with(closer) {
                self.tokens.push(Token::new(end, "", self.line));
                self.position += closer.len();
                return Ok(());
            }
            self.lex_expression_token(rest)?;
        }
    }

    fn skip_whitespace(&mut self) {
        let source = self.source;
        let rest = &source[self.position..];
        let trimmed = rest.trim_start();
        let skipped = rest.len() - trimmed.len();
        self.line += newlines(&rest[..skipped]);
        self.position += skipped;
    }

    fn lex_expression_token(&mut self, rest: &'a str) -> Result<()> {
        if let Some(op) = self.match_operator(rest) {
            self.push(TokenKind::Operator, op, op.len());
            return Ok(());
        }
        if let Some(len) = name_len(rest) {
            self.push(TokenKind::Name, &rest[..len], len);
            return Ok(());
        }
        if let Some(len) = number_len(rest) {
            self.push(TokenKind::Number, &rest[..len], len);
            return Ok(());
        }
        let Some(first) = rest.chars().next() else {
            return Ok(());
        };
        if PUNCTUATION.contains(first) {
            self.push(TokenKind::Punctuation, &rest[..1], 1);
            return Ok(());
        }
        if first == '"' || first == '\'' {
            let (value, consumed) = self.lex_string(rest, first)?;
            self.tokens.push(Token::new(TokenKind::String, value, self.line));
            self.line += newlines(&rest[..consumed]);
            self.position += consumed;
            return Ok(());
        }
        Err(Error::syntax(
            format!("Unexpected character \"{}\".", first),
            Some(self.line),
        ))
    }

    fn match_operator(&self, rest: &str) -> Option<&'a str> {
        self.operators.iter().copied().find(|op| {
            if !rest.starts_with(op) {
                return false;
            }
            let is_word = op.chars().last().is_some_and(|c| c.is_ascii_alphabetic());
            !is_word
                || rest[op.len()..]
                    .chars()
                    .next()
                    .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_'))
        })
    }

    fn lex_string(&self, rest: &str, quote: char) -> Result<(String, usize)> {
        let mut value = String::new();
        let mut chars = rest.char_indices().skip(1);
        while let Some((index, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, escaped)) => value.push(escaped),
                    None => break,
                },
                c if c == quote => return Ok((value, index + 1)),
                c => value.push(c),
            }
        }
        Err(Error::syntax("Unclosed string.", Some(self.line)))
    }

    fn push(&mut self, kind: TokenKind, value: &str, consumed: usize) {
        self.tokens.push(Token::new(kind, value, self.line));
        self.position += consumed;
    }
}

fn next_delimiter(text: &str) -> Option<usize> {
    ["{{", "{%", "{#"]
        .iter()
        .filter_map(|opener| text.find(opener))
        .min()
}

/// Length of a leading `[a-zA-Z_][a-zA-Z0-9_]*` name.
fn name_len(text: &str) -> Option<usize> {
    let first = text.chars().next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    Some(
        text.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(text.len()),
    )
}

/// Length of a leading integer or decimal number.
fn number_len(text: &str) -> Option<usize> {
    let digits = |s: &str| s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let whole = digits(text);
    if whole == 0 {
        return None;
    }
    let rest = &text[whole..];
    if let Some(fraction) = rest.strip_prefix('.') {
        let decimals = digits(fraction);
        if decimals > 0 {
            return Some(whole + 1 + decimals);
        }
    }
    Some(whole)
}

fn newlines(text: &str) -> usize {
    text.matches('\n').count()
}
