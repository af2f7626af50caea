//! Expression nodes.
//!
//! Expressions are a closed set, so they form an enum rather than a trait
//! object family. Each variant knows how to write itself through the
//! [`Compiler`]:
//!
//! | Variant | Emitted as |
//! |---------|------------|
//! | `Constant` | a literal |
//! | `Name` | `(context["name"] ?? null)`, or `variable(context, "name", line)` when strict |
//! | `Unary` / `Binary` | `(op x)` / `(x op y)`, or `call(x)` / `call(x, y)` |
//! | `Filter` / `Test` | `callable([env, ][context, ]args…, node, call args…)` |
//! | `Function` | `callable([env, ][context, ]args…, call args…)` |
//! | `GetAttr` | `attribute(env, node, attr)` |

use serde_json::Value;

use crate::compiler::Compiler;
use crate::error::Result;
use crate::extension::callable::{Callable, CallableKind, CallableOptions};
use crate::extension::operator::OperatorForm;
use crate::extension::{Filter, Function, Test};

/// A template expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Constant {
        value: Value,
        line: usize,
    },
    Name {
        name: String,
        line: usize,
    },
    Array {
        items: Vec<Expression>,
        line: usize,
    },
    Hash {
        entries: Vec<(Expression, Expression)>,
        line: usize,
    },
    Unary {
        operator: String,
        form: OperatorForm,
        operand: Box<Expression>,
        line: usize,
    },
    Binary {
        operator: String,
        form: OperatorForm,
        left: Box<Expression>,
        right: Box<Expression>,
        line: usize,
    },
    Filter {
        filter: Filter,
        node: Box<Expression>,
        arguments: Vec<Expression>,
        line: usize,
    },
    Function {
        function: Function,
        arguments: Vec<Expression>,
        line: usize,
    },
    Test {
        test: Test,
        node: Box<Expression>,
        arguments: Vec<Expression>,
        line: usize,
    },
    GetAttr {
        node: Box<Expression>,
        attribute: Box<Expression>,
        line: usize,
    },
}

impl Expression {
    pub fn constant(value: impl Into<Value>, line: usize) -> Self {
        Expression::Constant {
            value: value.into(),
            line,
        }
    }

    pub fn name(name: impl Into<String>, line: usize) -> Self {
        Expression::Name {
            name: name.into(),
            line,
        }
    }

    /// The source line the expression starts on.
    pub fn line(&self) -> usize {
        match self {
            Expression::Constant { line, .. }
            | Expression::Name { line, .. }
            | Expression::Array { line, .. }
            | Expression::Hash { line, .. }
            | Expression::Unary { line, .. }
            | Expression::Binary { line, .. }
            | Expression::Filter { line, .. }
            | Expression::Function { line, .. }
            | Expression::Test { line, .. }
            | Expression::GetAttr { line, .. } => *line,
        }
    }

    /// Direct sub-expressions, for visitors that rewrite the tree.
    pub fn children_mut(&mut self) -> Vec<&mut Expression> {
        match self {
            Expression::Constant { .. } | Expression::Name { .. } => Vec::new(),
            Expression::Array { items, .. } => items.iter_mut().collect(),
            Expression::Hash { entries, .. } => entries
                .iter_mut()
                .flat_map(|(key, value)| [key, value])
                .collect(),
            Expression::Unary { operand, .. } => vec![operand.as_mut()],
            Expression::Binary { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Expression::Filter {
                node, arguments, ..
            }
            | Expression::Test {
                node, arguments, ..
            } => std::iter::once(node.as_mut())
                .chain(arguments.iter_mut())
                .collect(),
            Expression::Function { arguments, .. } => arguments.iter_mut().collect(),
            Expression::GetAttr {
                node, attribute, ..
            } => vec![node.as_mut(), attribute.as_mut()],
        }
    }

    /// Removes every application of the filter `name`, keeping its input.
    pub fn strip_filter(&mut self, name: &str) {
        for child in self.children_mut() {
            child.strip_filter(name);
        }
        if let Expression::Filter { filter, node, .. } = self {
            if filter.name() == name {
                let inner = std::mem::replace(node.as_mut(), Expression::constant(Value::Null, 0));
                *self = inner;
            }
        }
    }

    /// Name of the outermost filter, if this is a filter application.
    pub fn filter_name(&self) -> Option<&str> {
        match self {
            Expression::Filter { filter, .. } => Some(filter.name()),
            _ => None,
        }
    }

    pub fn compile(&self, compiler: &mut Compiler<'_>) -> Result<()> {
        match self {
            Expression::Constant { value, .. } => {
                compiler.literal(value);
            }
            Expression::Name { name, line } => {
                if name == "_context" {
                    compiler.raw("context");
                } else if compiler.environment().is_strict_variables() {
                    compiler
                        .raw("variable(context, ")
                        .string(name)
                        .raw(&format!(", {})", line));
                } else {
                    compiler.raw("(context[").string(name).raw("] ?? null)");
                }
            }
            Expression::Array { items, .. } => {
                compiler.raw("[");
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        compiler.raw(", ");
                    }
                    compiler.raw(&format!("{} => ", index));
                    item.compile(compiler)?;
                }
                compiler.raw("]");
            }
            Expression::Hash { entries, .. } => {
                compiler.raw("[");
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        compiler.raw(", ");
                    }
                    key.compile(compiler)?;
                    compiler.raw(" => ");
                    value.compile(compiler)?;
                }
                compiler.raw("]");
            }
            Expression::Unary { form, operand, .. } => match form {
                OperatorForm::Infix(op) => {
                    compiler.raw("(").raw(op).raw(" ");
                    operand.compile(compiler)?;
                    compiler.raw(")");
                }
                OperatorForm::Call(call) => {
                    compiler.raw(call).raw("(");
                    operand.compile(compiler)?;
                    compiler.raw(")");
                }
            },
            Expression::Binary {
                form, left, right, ..
            } => {
                let (open, separator) = match form {
                    OperatorForm::Infix(op) => ("(".to_string(), format!(" {} ", op)),
                    OperatorForm::Call(call) => (format!("{}(", call), ", ".to_string()),
                };
                compiler.raw(&open);
                left.compile(compiler)?;
                compiler.raw(&separator);
                right.compile(compiler)?;
                compiler.raw(")");
            }
            Expression::Filter {
                filter,
                node,
                arguments,
                ..
            } => compile_call(compiler, filter, Some(node), arguments)?,
            Expression::Function {
                function,
                arguments,
                ..
            } => compile_call(compiler, function, None, arguments)?,
            Expression::Test {
                test,
                node,
                arguments,
                ..
            } => compile_call(compiler, test, Some(node), arguments)?,
            Expression::GetAttr {
                node, attribute, ..
            } => {
                compiler.raw("attribute(env, ");
                node.compile(compiler)?;
                compiler.raw(", ");
                attribute.compile(compiler)?;
                compiler.raw(")");
            }
        }
        Ok(())
    }
}

fn compile_call<K: CallableKind>(
    compiler: &mut Compiler<'_>,
    callable: &Callable<K>,
    node: Option<&Expression>,
    arguments: &[Expression],
) -> Result<()> {
    let CallableOptions {
        needs_environment,
        needs_context,
        ..
    } = *callable.options();

    compiler.raw(callable.callable()).raw("(");
    let mut first = true;
    let mut separate = |compiler: &mut Compiler<'_>| {
        if !std::mem::take(&mut first) {
            compiler.raw(", ");
        }
    };

    if needs_environment {
        separate(compiler);
        compiler.raw("env");
    }
    if needs_context {
        separate(compiler);
        compiler.raw("context");
    }
    for bound in callable.arguments() {
        separate(compiler);
        compiler.string(bound);
    }
    if let Some(node) = node {
        separate(compiler);
        node.compile(compiler)?;
    }
    for argument in arguments {
        separate(compiler);
        argument.compile(compiler)?;
    }
    compiler.raw(")");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Environment, EnvironmentOptions};
    use crate::loader::ArrayLoader;

    fn emit(env: &Environment, expr: &Expression) -> String {
        let mut compiler = Compiler::new(env);
        expr.compile(&mut compiler).unwrap();
        compiler.into_source()
    }

    fn name(n: &str) -> Box<Expression> {
        Box::new(Expression::name(n, 1))
    }

    #[test]
    fn test_name_lookup_respects_strictness() {
        let env = Environment::new(ArrayLoader::new());
        assert_eq!(emit(&env, &Expression::name("user", 1)), r#"(context["user"] ?? null)"#);

        let options = EnvironmentOptions {
            strict_variables: true,
            ..Default::default()
        };
        let env = Environment::with_options(ArrayLoader::new(), options);
        assert_eq!(
            emit(&env, &Expression::name("user", 3)),
            r#"variable(context, "user", 3)"#
        );
    }

    #[test]
    fn test_call_argument_order() {
        let env = Environment::new(ArrayLoader::new());
        let filter = Filter::new("date_*", "format_date")
            .needs_environment()
            .with_arguments(vec!["short".into()]);
        let expr = Expression::Filter {
            filter,
            node: name("when"),
            arguments: vec![Expression::constant("UTC", 1)],
            line: 1,
        };
        assert_eq!(
            emit(&env, &expr),
            r#"format_date(env, "short", (context["when"] ?? null), "UTC")"#
        );
    }

    #[test]
    fn test_binary_forms() {
        let env = Environment::new(ArrayLoader::new());
        let infix = Expression::Binary {
            operator: "+".into(),
            form: OperatorForm::Infix("+".into()),
            left: Box::new(Expression::constant(1, 1)),
            right: Box::new(Expression::constant(2, 1)),
            line: 1,
        };
        assert_eq!(emit(&env, &infix), "(1 + 2)");

        let call = Expression::Binary {
            operator: "**".into(),
            form: OperatorForm::Call("pow".into()),
            left: Box::new(Expression::constant(2, 1)),
            right: Box::new(Expression::constant(0.5, 1)),
            line: 1,
        };
        assert_eq!(emit(&env, &call), "pow(2, 0.5)");
    }

    #[test]
    fn test_strip_filter_keeps_input() {
        let mut expr = Expression::Filter {
            filter: Filter::new("upper", "upper"),
            node: Box::new(Expression::Filter {
                filter: Filter::new("raw", "raw"),
                node: name("body"),
                arguments: Vec::new(),
                line: 1,
            }),
            arguments: Vec::new(),
            line: 1,
        };
        expr.strip_filter("raw");
        assert_eq!(expr.filter_name(), Some("upper"));
        match expr {
            Expression::Filter { node, .. } => assert_eq!(*node, Expression::name("body", 1)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
