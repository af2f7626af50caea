//! Tokenizing, parsing and the template tree.
//!
//! The compiler pipeline is `source → Lexer → TokenStream → Parser →
//! ModuleNode → Compiler`. The environment owns one [`Lexer`] and one
//! [`Parser`]; both default to the implementations in this module and can be
//! replaced with [`Environment::set_lexer`](crate::Environment::set_lexer) and
//! [`Environment::set_parser`](crate::Environment::set_parser).

pub mod expression;
pub mod lexer;
pub mod node;
pub mod parser;
pub mod token;
pub mod visitor;

pub use expression::Expression;
pub use lexer::{DefaultLexer, Lexer};
pub use node::{BodyNode, IfNode, ModuleNode, Node, PrintNode, SetNode, SetValue, TextNode};
pub use parser::{DefaultParser, Parser, ParserState, TokenParser};
pub use token::{Token, TokenKind, TokenStream};
pub use visitor::{traverse, NodeVisitor, VisitContext};
