//! The `core` extension: operators, base vocabulary and control tags.
//!
//! # Operators
//!
//! | Precedence | Operators | Associativity |
//! |-----------:|-----------|---------------|
//! | 10 | `or` | left |
//! | 15 | `and` | left |
//! | 20 | `==` `!=` `<` `>` `<=` `>=` `in` | left |
//! | 25 | `..` | left |
//! | 30 | `+` `-` | left |
//! | 40 | `~` | left |
//! | 50 | unary `not` | |
//! | 60 | `*` `/` `//` `%` | left |
//! | 200 | `**` | right |
//! | 500 | unary `-` `+` | |

use std::sync::Arc;

use super::operator::{BinaryOperator, Operators, UnaryOperator};
use super::{Extension, Filter, Function, Test};
use crate::error::Result;
use crate::syntax::node::{IfNode, Node, SetNode, SetValue};
use crate::syntax::parser::{ParserState, TokenParser};
use crate::syntax::token::{Token, TokenKind};

/// Built-in operators, vocabulary and the `set` and `if` tags.
#[derive(Debug, Default, Clone)]
pub struct CoreExtension;

impl CoreExtension {
    pub fn new() -> Self {
        Self
    }
}

impl Extension for CoreExtension {
    fn name(&self) -> &str {
        "core"
    }

    fn filters(&self) -> Vec<Filter> {
        vec![
            Filter::new("upper", "str_upper").needs_environment(),
            Filter::new("lower", "str_lower").needs_environment(),
            Filter::new("capitalize", "str_capitalize").needs_environment(),
            Filter::new("trim", "str_trim"),
            Filter::new("length", "length").needs_environment(),
            Filter::new("join", "join"),
            Filter::new("default", "default_value"),
            Filter::new("keys", "keys"),
            Filter::new("first", "first").needs_environment(),
            Filter::new("last", "last").needs_environment(),
            Filter::new("abs", "abs"),
            Filter::new("round", "round"),
        ]
    }

    fn functions(&self) -> Vec<Function> {
        vec![
            Function::new("range", "range"),
            Function::new("constant", "constant"),
            Function::new("max", "max"),
            Function::new("min", "min"),
            Function::new("cycle", "cycle"),
        ]
    }

    fn tests(&self) -> Vec<Test> {
        vec![
            Test::new("defined", "is_defined").needs_context(),
            Test::new("null", "is_null"),
            Test::new("none", "is_null"),
            Test::new("empty", "is_empty"),
            Test::new("even", "is_even"),
            Test::new("odd", "is_odd"),
            Test::new("iterable", "is_iterable"),
        ]
    }

    fn token_parsers(&self) -> Vec<Arc<dyn TokenParser>> {
        vec![Arc::new(SetTokenParser), Arc::new(IfTokenParser)]
    }

    fn operators(&self) -> Option<Operators> {
        Some(
            Operators::new()
                .unary("not", UnaryOperator::infix(50, "!"))
                .unary("-", UnaryOperator::infix(500, "-"))
                .unary("+", UnaryOperator::infix(500, "+"))
                .binary("or", BinaryOperator::infix(10, "||"))
                .binary("and", BinaryOperator::infix(15, "&&"))
                .binary("==", BinaryOperator::infix(20, "=="))
                .binary("!=", BinaryOperator::infix(20, "!="))
                .binary("<", BinaryOperator::infix(20, "<"))
                .binary(">", BinaryOperator::infix(20, ">"))
                .binary("<=", BinaryOperator::infix(20, "<="))
                .binary(">=", BinaryOperator::infix(20, ">="))
                .binary("in", BinaryOperator::call(20, "in_sequence"))
                .binary("..", BinaryOperator::call(25, "range"))
                .binary("+", BinaryOperator::infix(30, "+"))
                .binary("-", BinaryOperator::infix(30, "-"))
                .binary("~", BinaryOperator::call(40, "concat"))
                .binary("*", BinaryOperator::infix(60, "*"))
                .binary("/", BinaryOperator::infix(60, "/"))
                .binary("//", BinaryOperator::call(60, "floor_div"))
                .binary("%", BinaryOperator::infix(60, "%"))
                .binary("**", BinaryOperator::call(200, "pow").right()),
        )
    }
}

/// `{% set name = expr %}` and `{% set name %}…{% endset %}`.
struct SetTokenParser;

impl TokenParser for SetTokenParser {
    fn tag(&self) -> &str {
        "set"
    }

    fn parse(&self, token: Token, parser: &mut ParserState<'_>) -> Result<Box<dyn Node>> {
        let name = parser.stream().expect(TokenKind::Name, None)?;
        let value = if parser
            .stream()
            .next_if(TokenKind::Punctuation, Some("="))
            .is_some()
        {
            let value = parser.parse_expression()?;
            parser.stream().expect(TokenKind::BlockEnd, None)?;
            SetValue::Expression(value)
        } else {
            parser.stream().expect(TokenKind::BlockEnd, None)?;
            let (body, _) = parser.subparse(&["endset"])?;
            parser.stream().expect(TokenKind::BlockEnd, None)?;
            SetValue::Capture(body)
        };
        Ok(Box::new(SetNode::new(name.value, value, token.line)))
    }
}

/// `{% if %}…{% elseif %}…{% else %}…{% endif %}`.
struct IfTokenParser;

impl TokenParser for IfTokenParser {
    fn tag(&self) -> &str {
        "if"
    }

    fn parse(&self, token: Token, parser: &mut ParserState<'_>) -> Result<Box<dyn Node>> {
        let condition = parser.parse_expression()?;
        parser.stream().expect(TokenKind::BlockEnd, None)?;
        let (body, mut end) = parser.subparse(&["elseif", "else", "endif"])?;

        let mut branches = vec![(condition, body)];
        let mut otherwise = None;
        while let Some(tag) = end.take() {
            match tag.value.as_str() {
                "else" => {
                    parser.stream().expect(TokenKind::BlockEnd, None)?;
                    let (body, next) = parser.subparse(&["endif"])?;
                    otherwise = Some(body);
                    end = next;
                }
                "elseif" => {
                    let condition = parser.parse_expression()?;
                    parser.stream().expect(TokenKind::BlockEnd, None)?;
                    let (body, next) = parser.subparse(&["elseif", "else", "endif"])?;
                    branches.push((condition, body));
                    end = next;
                }
                _ => break,
            }
        }
        parser.stream().expect(TokenKind::BlockEnd, None)?;
        Ok(Box::new(IfNode::new(branches, otherwise, token.line)))
    }
}
