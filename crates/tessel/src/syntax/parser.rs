//! Template parser.
//!
//! [`DefaultParser`] turns a [`TokenStream`] into a [`ModuleNode`]:
//!
//! - text tokens become [`TextNode`]s and `{{ … }}` becomes a [`PrintNode`];
//! - `{% tag … %}` is handed to the [`TokenParser`] registered for `tag`;
//! - expressions are parsed by precedence climbing over the environment's
//!   unary and binary operator tables, followed by postfix filters (`|name`),
//!   attribute access (`.name`, `[expr]`) and tests (`is [not] name`).
//!
//! Unknown filters, functions, tests and tags are syntax errors that carry
//! "did you mean" suggestions. Once the tree is complete, the registered node
//! visitors run over it.
//!
//! # Writing a Tag
//!
//! A [`TokenParser`] receives the tag name token and must consume the rest of
//! the tag, including the closing `%}`:
//!
//! ```rust
//! use tessel::syntax::{Node, ParserState, TextNode, Token, TokenKind, TokenParser};
//!
//! struct Shout;
//!
//! impl TokenParser for Shout {
//!     fn tag(&self) -> &str {
//!         "shout"
//!     }
//!
//!     fn parse(&self, token: Token, parser: &mut ParserState<'_>) -> tessel::Result<Box<dyn Node>> {
//!         let word = parser.stream().expect(TokenKind::String, None)?;
//!         parser.stream().expect(TokenKind::BlockEnd, None)?;
//!         Ok(Box::new(TextNode::new(word.value.to_uppercase(), token.line)))
//!     }
//! }
//! ```

use serde_json::Value;

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::extension::callable::{Callable, CallableKind};
use crate::extension::operator::{Associativity, OperatorForm};
use crate::syntax::expression::Expression;
use crate::syntax::node::{BodyNode, ModuleNode, Node, PrintNode, TextNode};
use crate::syntax::token::{Token, TokenKind, TokenStream};
use crate::syntax::visitor::{traverse, VisitContext};

/// Parses one tag.
pub trait TokenParser: Send + Sync {
    /// The tag name this parser handles.
    fn tag(&self) -> &str;

    /// Parses the tag whose name token is `token`.
    fn parse(&self, token: Token, parser: &mut ParserState<'_>) -> Result<Box<dyn Node>>;
}

/// Converts a token stream into a module.
pub trait Parser: Send + Sync {
    fn parse(&self, env: &Environment, stream: TokenStream) -> Result<ModuleNode>;
}

/// The built-in parser.
#[derive(Debug, Default, Clone)]
pub struct DefaultParser;

impl DefaultParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for DefaultParser {
    fn parse(&self, env: &Environment, stream: TokenStream) -> Result<ModuleNode> {
        let name = stream.template_name().to_string();
        let mut state = ParserState::new(env, stream);
        let (body, _) = state.subparse(&[])?;

        let mut module = ModuleNode::new(name.as_str(), body);
        module.set_embedded(state.embedded);

        let mut visitors = env.node_visitors()?.to_vec();
        visitors.sort_by_key(|visitor| visitor.priority());
        let ctx = VisitContext::new(env, &name);
        for visitor in &visitors {
            traverse(visitor.as_ref(), &mut module, &ctx)?;
        }
        Ok(module)
    }
}

/// Parsing state shared with tag parsers.
pub struct ParserState<'env> {
    env: &'env Environment,
    stream: TokenStream,
    embedded: Vec<ModuleNode>,
}

impl<'env> ParserState<'env> {
    pub fn new(env: &'env Environment, stream: TokenStream) -> Self {
        Self {
            env,
            stream,
            embedded: Vec::new(),
        }
    }

    pub fn environment(&self) -> &'env Environment {
        self.env
    }

    pub fn stream(&mut self) -> &mut TokenStream {
        &mut self.stream
    }

    pub fn template_name(&self) -> &str {
        self.stream.template_name()
    }

    /// Parses statements until one of `end_tags` opens a block.
    ///
    /// Returns the body and the end tag's name token; the stream is left
    /// right after that name. With no end tags, parses to the end of the
    /// template.
    pub fn subparse(&mut self, end_tags: &[&str]) -> Result<(BodyNode, Option<Token>)> {
        let line = self.stream.current().line;
        let mut nodes: Vec<Box<dyn Node>> = Vec::new();
        loop {
            let token = self.stream.current().clone();
            match token.kind {
                TokenKind::Text => {
                    self.stream.next();
                    nodes.push(Box::new(TextNode::new(token.value, token.line)));
                }
                TokenKind::VarStart => {
                    self.stream.next();
                    let expression = self.parse_expression()?;
                    self.stream.expect(TokenKind::VarEnd, None)?;
                    nodes.push(Box::new(PrintNode::new(expression, token.line)));
                }
                TokenKind::BlockStart => {
                    self.stream.next();
                    let tag = self.stream.expect(TokenKind::Name, None)?;
                    if end_tags.contains(&tag.value.as_str()) {
                        return Ok((BodyNode::new(nodes, line), Some(tag)));
                    }
                    let Some(parser) = self.env.tags()?.get(&tag.value).cloned() else {
                        return Err(self.unknown_tag(&tag, end_tags)?);
                    };
                    nodes.push(parser.parse(tag, self)?);
                }
                TokenKind::Eof if end_tags.is_empty() => {
                    return Ok((BodyNode::new(nodes, line), None));
                }
                TokenKind::Eof => {
                    return Err(self.error(
                        format!(
                            "Unexpected end of template looking for one of the following tags: {}.",
                            quoted(end_tags.iter().copied())
                        ),
                        token.line,
                    ));
                }
                _ => {
                    return Err(self.error(
                        format!("Unexpected token \"{}\" of value \"{}\".", token.kind, token.value),
                        token.line,
                    ))
                }
            }
        }
    }

    /// Registers an embedded template and returns its index.
    ///
    /// The embedded module compiles into its own unit, named after this
    /// template plus the index.
    pub fn embed(&mut self, body: BodyNode) -> usize {
        let index = self.embedded.len() + 1;
        let module = ModuleNode::embedded(self.stream.template_name(), body, index);
        self.embedded.push(module);
        index
    }

    /// Parses a full expression.
    pub fn parse_expression(&mut self) -> Result<Expression> {
        self.parse_expression_with(0)
    }

    fn parse_expression_with(&mut self, min_precedence: u32) -> Result<Expression> {
        let mut expression = self.parse_primary()?;
        loop {
            let token = self.stream.current();
            if token.kind != TokenKind::Operator {
                break;
            }
            let Some(op) = self.env.binary_operators()?.get(&token.value).cloned() else {
                break;
            };
            if op.precedence < min_precedence {
                break;
            }
            let token = self.stream.next();
            let next_min = match op.associativity {
                Associativity::Left => op.precedence + 1,
                Associativity::Right => op.precedence,
            };
            let right = self.parse_expression_with(next_min)?;
            expression = Expression::Binary {
                operator: token.value,
                form: op.form,
                left: Box::new(expression),
                right: Box::new(right),
                line: token.line,
            };
        }
        Ok(expression)
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        let token = self.stream.current().clone();

        if token.kind == TokenKind::Operator {
            if let Some(op) = self.env.unary_operators()?.get(&token.value).cloned() {
                self.stream.next();
                let operand = self.parse_expression_with(op.precedence)?;
                let expression = Expression::Unary {
                    operator: token.value,
                    form: op.form,
                    operand: Box::new(operand),
                    line: token.line,
                };
                return self.parse_postfix(expression);
            }
        }

        if token.is_punctuation("(") {
            self.stream.next();
            let expression = self.parse_expression()?;
            self.stream.expect(TokenKind::Punctuation, Some(")"))?;
            return self.parse_postfix(expression);
        }

        let expression = match token.kind {
            TokenKind::Name => {
                self.stream.next();
                match token.value.as_str() {
                    "true" | "TRUE" => Expression::constant(true, token.line),
                    "false" | "FALSE" => Expression::constant(false, token.line),
                    "null" | "NULL" | "none" | "NONE" => Expression::constant(Value::Null, token.line),
                    _ if self.stream.current().is_punctuation("(") => self.parse_function(token)?,
                    _ => Expression::name(token.value, token.line),
                }
            }
            TokenKind::Number => {
                self.stream.next();
                Expression::Constant {
                    value: self.parse_number(&token)?,
                    line: token.line,
                }
            }
            TokenKind::String => {
                self.stream.next();
                Expression::constant(token.value, token.line)
            }
            TokenKind::Punctuation if token.value == "[" => self.parse_array()?,
            TokenKind::Punctuation if token.value == "{" => self.parse_hash()?,
            _ => {
                return Err(self.error(
                    format!("Unexpected token \"{}\" of value \"{}\".", token.kind, token.value),
                    token.line,
                ))
            }
        };
        self.parse_postfix(expression)
    }

    fn parse_number(&self, token: &Token) -> Result<Value> {
        if !token.value.contains('.') {
            if let Ok(int) = token.value.parse::<i64>() {
                return Ok(Value::from(int));
            }
        }
        token
            .value
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| self.error(format!("Invalid number \"{}\".", token.value), token.line))
    }

    fn parse_array(&mut self) -> Result<Expression> {
        let open = self.stream.expect(TokenKind::Punctuation, Some("["))?;
        let mut items = Vec::new();
        while !self.stream.current().is_punctuation("]") {
            if !items.is_empty() {
                self.stream.expect(TokenKind::Punctuation, Some(","))?;
                if self.stream.current().is_punctuation("]") {
                    break;
                }
            }
            items.push(self.parse_expression()?);
        }
        self.stream.expect(TokenKind::Punctuation, Some("]"))?;
        Ok(Expression::Array {
            items,
            line: open.line,
        })
    }

    fn parse_hash(&mut self) -> Result<Expression> {
        let open = self.stream.expect(TokenKind::Punctuation, Some("{"))?;
        let mut entries = Vec::new();
        while !self.stream.current().is_punctuation("}") {
            if !entries.is_empty() {
                self.stream.expect(TokenKind::Punctuation, Some(","))?;
                if self.stream.current().is_punctuation("}") {
                    break;
                }
            }
            let key_token = self.stream.next();
            let key = match key_token.kind {
                TokenKind::Name | TokenKind::String => {
                    Expression::constant(key_token.value, key_token.line)
                }
                TokenKind::Number => Expression::Constant {
                    value: self.parse_number(&key_token)?,
                    line: key_token.line,
                },
                _ => {
                    return Err(self.error(
                        format!(
                            "A hash key must be a quoted string, a number or a name (unexpected token \"{}\" of value \"{}\").",
                            key_token.kind, key_token.value
                        ),
                        key_token.line,
                    ))
                }
            };
            self.stream.expect(TokenKind::Punctuation, Some(":"))?;
            let value = self.parse_expression()?;
            entries.push((key, value));
        }
        self.stream.expect(TokenKind::Punctuation, Some("}"))?;
        Ok(Expression::Hash {
            entries,
            line: open.line,
        })
    }

    fn parse_postfix(&mut self, mut expression: Expression) -> Result<Expression> {
        loop {
            let token = self.stream.current().clone();
            if token.is_punctuation("|") {
                self.stream.next();
                expression = self.parse_filter(expression)?;
            } else if token.is_punctuation(".") {
                self.stream.next();
                let attribute = self.stream.next();
                let attribute = match attribute.kind {
                    TokenKind::Name => Expression::constant(attribute.value, attribute.line),
                    TokenKind::Number => Expression::Constant {
                        value: self.parse_number(&attribute)?,
                        line: attribute.line,
                    },
                    _ => {
                        return Err(self.error(
                            format!("Expected name or number, got \"{}\".", attribute.value),
                            attribute.line,
                        ))
                    }
                };
                expression = Expression::GetAttr {
                    node: Box::new(expression),
                    attribute: Box::new(attribute),
                    line: token.line,
                };
            } else if token.is_punctuation("[") {
                self.stream.next();
                let attribute = self.parse_expression()?;
                self.stream.expect(TokenKind::Punctuation, Some("]"))?;
                expression = Expression::GetAttr {
                    node: Box::new(expression),
                    attribute: Box::new(attribute),
                    line: token.line,
                };
            } else if token.is_name("is") {
                self.stream.next();
                expression = self.parse_test(expression, token.line)?;
            } else {
                return Ok(expression);
            }
        }
    }

    fn parse_filter(&mut self, node: Expression) -> Result<Expression> {
        let name = self.stream.expect(TokenKind::Name, None)?;
        let filter = match self.env.filter(&name.value)? {
            Some(filter) => filter,
            None => {
                let known = self.env.vocabulary()?.filters.names();
                return Err(self.unknown("filter", &name, known));
            }
        };
        self.warn_deprecated(&filter, name.line);
        let arguments = if self.stream.current().is_punctuation("(") {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expression::Filter {
            filter,
            node: Box::new(node),
            arguments,
            line: name.line,
        })
    }

    fn parse_function(&mut self, name: Token) -> Result<Expression> {
        let function = match self.env.function(&name.value)? {
            Some(function) => function,
            None => {
                let known = self.env.vocabulary()?.functions.names();
                return Err(self.unknown("function", &name, known));
            }
        };
        self.warn_deprecated(&function, name.line);
        let arguments = self.parse_arguments()?;
        Ok(Expression::Function {
            function,
            arguments,
            line: name.line,
        })
    }

    fn parse_test(&mut self, node: Expression, line: usize) -> Result<Expression> {
        let negated = self.stream.next_if(TokenKind::Operator, Some("not")).is_some()
            || self.stream.next_if(TokenKind::Name, Some("not")).is_some();
        let name = self.stream.expect(TokenKind::Name, None)?;
        let test = match self.env.test(&name.value)? {
            Some(test) => test,
            None => {
                let known = self.env.vocabulary()?.tests.keys().map(String::as_str);
                return Err(self.unknown("test", &name, known));
            }
        };
        self.warn_deprecated(&test, name.line);
        let arguments = if self.stream.current().is_punctuation("(") {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        let expression = Expression::Test {
            test,
            node: Box::new(node),
            arguments,
            line,
        };
        if !negated {
            return Ok(expression);
        }
        let form = self
            .env
            .unary_operators()?
            .get("not")
            .map(|op| op.form.clone())
            .unwrap_or_else(|| OperatorForm::Infix("!".to_string()));
        Ok(Expression::Unary {
            operator: "not".to_string(),
            form,
            operand: Box::new(expression),
            line,
        })
    }

    /// Parses a parenthesized, comma separated argument list.
    pub fn parse_arguments(&mut self) -> Result<Vec<Expression>> {
        self.stream.expect(TokenKind::Punctuation, Some("("))?;
        let mut arguments = Vec::new();
        while !self.stream.current().is_punctuation(")") {
            if !arguments.is_empty() {
                self.stream.expect(TokenKind::Punctuation, Some(","))?;
            }
            arguments.push(self.parse_expression()?);
        }
        self.stream.expect(TokenKind::Punctuation, Some(")"))?;
        Ok(arguments)
    }

    fn warn_deprecated<K: CallableKind>(&self, callable: &Callable<K>, line: usize) {
        if let Some(note) = &callable.options().deprecated {
            tracing::warn!(
                template = self.stream.template_name(),
                line,
                "{} \"{}\" is deprecated: {}",
                K::LABEL,
                callable.name(),
                note
            );
        }
    }

    fn unknown<'a>(
        &self,
        kind: &str,
        name: &Token,
        known: impl IntoIterator<Item = &'a str>,
    ) -> Error {
        self.error(format!("Unknown \"{}\" {}.", name.value, kind), name.line)
            .with_suggestions(&name.value, known)
    }

    fn unknown_tag(&self, tag: &Token, end_tags: &[&str]) -> Result<Error> {
        let mut message = format!("Unknown \"{}\" tag.", tag.value);
        if !end_tags.is_empty() {
            message.push_str(&format!(
                " Expected one of the following tags: {}.",
                quoted(end_tags.iter().copied())
            ));
        }
        let known = self.env.tags()?.keys().map(String::as_str);
        Ok(self
            .error(message, tag.line)
            .with_suggestions(&tag.value, known))
    }

    /// Creates a syntax error located in the current template.
    pub fn error(&self, message: impl Into<String>, line: usize) -> Error {
        Error::syntax(message, Some(line)).with_template_name(self.stream.template_name())
    }
}

fn quoted<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names
        .map(|name| format!("\"{}\"", name))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::Filter;
    use crate::loader::ArrayLoader;

    fn parse(env: &Environment, source: &str) -> Result<ModuleNode> {
        let stream = env.tokenize(source, "t.tsl")?;
        DefaultParser::new().parse(env, stream)
    }

    fn print_expression(module: &ModuleNode) -> &Expression {
        module.body().nodes()[0]
            .as_any()
            .downcast_ref::<PrintNode>()
            .unwrap()
            .expression()
    }

    fn plain_env() -> Environment {
        let mut env = Environment::new(ArrayLoader::new());
        env.set_autoescape(crate::environment::Autoescape::Disabled);
        env
    }

    #[test]
    fn test_precedence_climbing() {
        let env = plain_env();
        let module = parse(&env, "{{ 1 + 2 * 3 }}").unwrap();
        match print_expression(&module) {
            Expression::Binary {
                operator, right, ..
            } => {
                assert_eq!(operator, "+");
                assert!(matches!(right.as_ref(), Expression::Binary { operator, .. } if operator == "*"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_right_associative_power() {
        let env = plain_env();
        let module = parse(&env, "{{ 2 ** 3 ** 2 }}").unwrap();
        match print_expression(&module) {
            Expression::Binary { left, right, .. } => {
                assert!(matches!(left.as_ref(), Expression::Constant { .. }));
                assert!(matches!(right.as_ref(), Expression::Binary { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_filters_chain_left_to_right() {
        let env = plain_env();
        let module = parse(&env, "{{ name|lower|upper }}").unwrap();
        let expression = print_expression(&module);
        assert_eq!(expression.filter_name(), Some("upper"));
    }

    #[test]
    fn test_unknown_filter_suggests() {
        let env = plain_env();
        let err = parse(&env, "{{ name|uper }}").unwrap_err();
        let payload = err.template_error().unwrap();
        assert_eq!(payload.template_name(), Some("t.tsl"));
        assert_eq!(payload.line(), Some(1));
        assert!(payload.suggestions().iter().any(|s| s == "upper"));
    }

    #[test]
    fn test_unknown_tag() {
        let env = plain_env();
        let err = parse(&env, "{% frobnicate %}").unwrap_err();
        assert!(err.to_string().starts_with("Unknown \"frobnicate\" tag"));
    }

    #[test]
    fn test_unclosed_if() {
        let env = plain_env();
        let err = parse(&env, "{% if a %}x").unwrap_err();
        assert!(err.to_string().contains("\"endif\""));
    }

    #[test]
    fn test_negated_test() {
        let env = plain_env();
        let module = parse(&env, "{{ a is not defined }}").unwrap();
        assert!(matches!(
            print_expression(&module),
            Expression::Unary { operand, .. } if matches!(operand.as_ref(), Expression::Test { .. })
        ));
    }

    #[test]
    fn test_literals_and_attributes() {
        let env = plain_env();
        let module = parse(&env, "{{ {a: [1, 2.5, 'x'], 'b': null}.a[0] }}").unwrap();
        assert!(matches!(print_expression(&module), Expression::GetAttr { .. }));
    }

    #[test]
    fn test_wildcard_filter_arguments_bound() {
        let mut env = plain_env();
        env.add_filter(Filter::new("date_*", "format_date")).unwrap();
        let module = parse(&env, "{{ when|date_short }}").unwrap();
        match print_expression(&module) {
            Expression::Filter { filter, .. } => assert_eq!(filter.arguments(), ["short"]),
            other => panic!("unexpected {:?}", other),
        }
    }
}
