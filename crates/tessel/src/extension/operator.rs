//! Operator declarations.
//!
//! Extensions declare operators as a pair of tables, unary and binary, keyed
//! by the operator as written in templates. The parser climbs precedences from
//! these tables and the emitter writes each operator in its declared
//! [`OperatorForm`].

use indexmap::IndexMap;

/// How an operator is written into compiled units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorForm {
    /// Written in place: `(left op right)` or `(op operand)`.
    Infix(String),
    /// Written as a call: `name(left, right)` or `name(operand)`.
    Call(String),
}

/// Associativity of a binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

/// A prefix operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnaryOperator {
    pub precedence: u32,
    pub form: OperatorForm,
}

impl UnaryOperator {
    pub fn infix(precedence: u32, host: impl Into<String>) -> Self {
        Self {
            precedence,
            form: OperatorForm::Infix(host.into()),
        }
    }

    pub fn call(precedence: u32, host: impl Into<String>) -> Self {
        Self {
            precedence,
            form: OperatorForm::Call(host.into()),
        }
    }
}

/// An infix operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryOperator {
    pub precedence: u32,
    pub associativity: Associativity,
    pub form: OperatorForm,
}

impl BinaryOperator {
    pub fn infix(precedence: u32, host: impl Into<String>) -> Self {
        Self {
            precedence,
            associativity: Associativity::Left,
            form: OperatorForm::Infix(host.into()),
        }
    }

    pub fn call(precedence: u32, host: impl Into<String>) -> Self {
        Self {
            precedence,
            associativity: Associativity::Left,
            form: OperatorForm::Call(host.into()),
        }
    }

    /// Makes the operator right-associative.
    pub fn right(mut self) -> Self {
        self.associativity = Associativity::Right;
        self
    }
}

/// The (unary, binary) operator pair an extension declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Operators {
    pub unary: IndexMap<String, UnaryOperator>,
    pub binary: IndexMap<String, BinaryOperator>,
}

impl Operators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unary(mut self, name: impl Into<String>, op: UnaryOperator) -> Self {
        self.unary.insert(name.into(), op);
        self
    }

    pub fn binary(mut self, name: impl Into<String>, op: BinaryOperator) -> Self {
        self.binary.insert(name.into(), op);
        self
    }

    /// Checks that every operator can be tokenized and emitted.
    ///
    /// Returns a description of the first problem found.
    pub(crate) fn validate(&self) -> Result<(), String> {
        let names = self.unary.keys().chain(self.binary.keys());
        for name in names {
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(format!("operator \"{}\" is not a single token", name));
            }
        }
        let forms = self
            .unary
            .iter()
            .map(|(n, op)| (n, &op.form))
            .chain(self.binary.iter().map(|(n, op)| (n, &op.form)));
        for (name, form) in forms {
            let host = match form {
                OperatorForm::Infix(host) | OperatorForm::Call(host) => host,
            };
            if host.trim().is_empty() {
                return Err(format!("operator \"{}\" has no host form", name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_declaration_order() {
        let ops = Operators::new()
            .binary("or", BinaryOperator::infix(10, "||"))
            .binary("and", BinaryOperator::infix(15, "&&"));
        let names: Vec<&str> = ops.binary.keys().map(String::as_str).collect();
        assert_eq!(names, ["or", "and"]);
    }

    #[test]
    fn test_validate_rejects_blank_names_and_forms() {
        let ops = Operators::new().unary("", UnaryOperator::infix(50, "!"));
        assert!(ops.validate().is_err());

        let ops = Operators::new().binary("not in", BinaryOperator::call(20, "not_in"));
        assert!(ops.validate().is_err());

        let ops = Operators::new().binary("**", BinaryOperator::call(200, " "));
        assert!(ops.validate().is_err());

        let ops = Operators::new().binary("**", BinaryOperator::call(200, "pow").right());
        assert!(ops.validate().is_ok());
    }
}
