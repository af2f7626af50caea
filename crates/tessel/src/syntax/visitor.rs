//! Tree visitors.
//!
//! Visitors run over a finished [`ModuleNode`](crate::syntax::node::ModuleNode)
//! before it is compiled. The parser applies every registered visitor in
//! ascending [`priority`](NodeVisitor::priority) order; visitors with equal
//! priority keep their registration order.

use crate::environment::Environment;
use crate::error::Result;
use crate::syntax::node::Node;

/// Information available to visitors.
#[derive(Clone, Copy)]
pub struct VisitContext<'a> {
    env: &'a Environment,
    template_name: &'a str,
}

impl<'a> VisitContext<'a> {
    pub fn new(env: &'a Environment, template_name: &'a str) -> Self {
        Self { env, template_name }
    }

    pub fn environment(&self) -> &'a Environment {
        self.env
    }

    pub fn template_name(&self) -> &'a str {
        self.template_name
    }
}

/// Rewrites or inspects the tree before compilation.
pub trait NodeVisitor: Send + Sync {
    /// Called before the node's children are visited.
    fn enter_node(&self, _node: &mut dyn Node, _ctx: &VisitContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called after the node's children are visited.
    fn leave_node(&self, _node: &mut dyn Node, _ctx: &VisitContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Lower priorities run first. Built-in visitors use 0 (escaping) and 255
    /// (optimization).
    fn priority(&self) -> i32 {
        0
    }
}

/// Walks `node` depth first with `visitor`.
pub fn traverse(
    visitor: &dyn NodeVisitor,
    node: &mut dyn Node,
    ctx: &VisitContext<'_>,
) -> Result<()> {
    visitor.enter_node(node, ctx)?;
    for child in node.children_mut() {
        traverse(visitor, child, ctx)?;
    }
    visitor.leave_node(node, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ArrayLoader;
    use crate::syntax::node::{BodyNode, ModuleNode, TextNode};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl NodeVisitor for Recorder {
        fn enter_node(&self, node: &mut dyn Node, _ctx: &VisitContext<'_>) -> Result<()> {
            let label = if node.as_any().is::<TextNode>() { "enter text" } else { "enter" };
            self.events.lock().unwrap().push(label.to_string());
            Ok(())
        }

        fn leave_node(&self, _node: &mut dyn Node, _ctx: &VisitContext<'_>) -> Result<()> {
            self.events.lock().unwrap().push("leave".to_string());
            Ok(())
        }
    }

    #[test]
    fn test_traverse_is_depth_first() {
        let env = Environment::new(ArrayLoader::new());
        let ctx = VisitContext::new(&env, "t");
        let mut module = ModuleNode::new(
            "t",
            BodyNode::new(vec![Box::new(TextNode::new("a", 1))], 1),
        );
        let recorder = Recorder::default();
        traverse(&recorder, &mut module, &ctx).unwrap();
        let events = recorder.events.into_inner().unwrap();
        assert_eq!(
            events,
            ["enter", "enter", "enter text", "leave", "leave", "leave"]
        );
    }
}
