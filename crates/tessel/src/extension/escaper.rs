//! The `escaper` extension: output escaping.
//!
//! The extension provides the `escape` filter (alias `e`), the `raw` filter,
//! and a node visitor that wraps every printed expression in
//! `escape(strategy)` unless the expression is already safe for the
//! strategy. The strategy comes from the environment's
//! [`Autoescape`](crate::Autoescape) setting.
//!
//! An expression is safe when it is:
//!
//! - a constant;
//! - an `escape` filter for the same strategy;
//! - a filter or function declared [`safe`](crate::Filter::safe) for the strategy;
//! - a filter that [`preserves_safety`](crate::Filter::preserves_safety) for
//!   the strategy, applied to a safe expression.

use std::sync::Arc;

use serde_json::Value;

use super::{Extension, Filter};
use crate::error::Result;
use crate::syntax::expression::Expression;
use crate::syntax::node::{Node, PrintNode};
use crate::syntax::visitor::{NodeVisitor, VisitContext};

const DEFAULT_STRATEGY: &str = "html";

#[derive(Debug, Default, Clone)]
pub struct EscaperExtension;

impl EscaperExtension {
    pub fn new() -> Self {
        Self
    }
}

impl Extension for EscaperExtension {
    fn name(&self) -> &str {
        "escaper"
    }

    fn filters(&self) -> Vec<Filter> {
        vec![
            escape_filter("escape"),
            escape_filter("e"),
            Filter::new("raw", "raw").safe(&["all"]),
        ]
    }

    fn node_visitors(&self) -> Vec<Arc<dyn NodeVisitor>> {
        vec![Arc::new(EscaperVisitor)]
    }
}

fn escape_filter(name: &str) -> Filter {
    Filter::new(name, "escape").needs_environment()
}

struct EscaperVisitor;

impl NodeVisitor for EscaperVisitor {
    fn leave_node(&self, node: &mut dyn Node, ctx: &VisitContext<'_>) -> Result<()> {
        let Some(print) = node.as_any_mut().downcast_mut::<PrintNode>() else {
            return Ok(());
        };
        let env = ctx.environment();
        let Some(strategy) = env.autoescape().strategy_for(ctx.template_name()) else {
            return Ok(());
        };
        if is_safe(print.expression(), &strategy) {
            return Ok(());
        }

        let filter = env
            .filter("escape")?
            .unwrap_or_else(|| escape_filter("escape"));
        let expression = print.expression_mut();
        let line = expression.line();
        let inner = std::mem::replace(expression, Expression::constant(Value::Null, line));
        *expression = Expression::Filter {
            filter,
            node: Box::new(inner),
            arguments: vec![Expression::constant(strategy, line)],
            line,
        };
        Ok(())
    }
}

fn is_safe(expression: &Expression, strategy: &str) -> bool {
    match expression {
        Expression::Constant { .. } => true,
        Expression::Filter {
            filter,
            node,
            arguments,
            ..
        } => {
            if filter.callable() == "escape" {
                let applied = match arguments.first() {
                    Some(Expression::Constant {
                        value: Value::String(s),
                        ..
                    }) => s.as_str(),
                    _ => DEFAULT_STRATEGY,
                };
                return applied == strategy;
            }
            filter.is_safe_for(strategy)
                || (filter.preserves_safety_for(strategy) && is_safe(node, strategy))
        }
        Expression::Function { function, .. } => function.is_safe_for(strategy),
        _ => false,
    }
}
