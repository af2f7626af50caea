//! The `optimizer` extension.
//!
//! Registered by the environment unless `optimizations` is
//! [`OPTIMIZE_NONE`]. Its visitor runs last (priority 255), after escaping
//! decisions are made, and rewrites the tree according to the enabled flags.

use std::sync::Arc;

use super::Extension;
use crate::error::Result;
use crate::syntax::node::Node;
use crate::syntax::visitor::{NodeVisitor, VisitContext};

/// Enable every optimization.
pub const OPTIMIZE_ALL: i32 = -1;

/// Disable optimizations.
pub const OPTIMIZE_NONE: i32 = 0;

/// Drop `raw` filters, which only matter to the escaper.
pub const OPTIMIZE_RAW_FILTER: i32 = 4;

#[derive(Debug, Clone)]
pub struct OptimizerExtension {
    optimizations: i32,
}

impl OptimizerExtension {
    pub fn new(optimizations: i32) -> Self {
        Self { optimizations }
    }

    pub fn optimizations(&self) -> i32 {
        self.optimizations
    }
}

impl Default for OptimizerExtension {
    fn default() -> Self {
        Self::new(OPTIMIZE_ALL)
    }
}

impl Extension for OptimizerExtension {
    fn name(&self) -> &str {
        "optimizer"
    }

    fn node_visitors(&self) -> Vec<Arc<dyn NodeVisitor>> {
        vec![Arc::new(OptimizerVisitor {
            optimizations: self.optimizations,
        })]
    }
}

struct OptimizerVisitor {
    optimizations: i32,
}

impl NodeVisitor for OptimizerVisitor {
    fn leave_node(&self, node: &mut dyn Node, _ctx: &VisitContext<'_>) -> Result<()> {
        if self.optimizations & OPTIMIZE_RAW_FILTER != 0 {
            for expression in node.expressions_mut() {
                expression.strip_filter("raw");
            }
        }
        Ok(())
    }

    fn priority(&self) -> i32 {
        255
    }
}
