//! Statement nodes.
//!
//! Every node writes itself through the [`Compiler`]; the compiler only
//! orchestrates. Tag parsers may return their own node types, which is why
//! nodes are trait objects, unlike [`Expression`].
//!
//! A compiled module looks like:
//!
//! ```text
//! // source "index.tsl"
//! unit __TesselUnit_<hash> extends Unit {
//!     fn template_name() {
//!         return "index.tsl";
//!     }
//!
//!     fn render(env, context) {
//!         // line 1
//!         echo "Hello ";
//!         echo escape(env, (context["name"] ?? null), "html");
//!     }
//!
//!     fn debug_info() {
//!         return [8 => 1];
//!     }
//! }
//! ```
//!
//! Embedded modules follow as additional `unit …_<index>` declarations in the
//! same source.

use std::any::Any;
use std::fmt;

use crate::compiler::Compiler;
use crate::error::Result;
use crate::syntax::expression::Expression;

/// A statement in the template tree.
pub trait Node: fmt::Debug {
    /// Writes the node through `compiler`.
    fn compile(&self, compiler: &mut Compiler<'_>) -> Result<()>;

    /// The source line the node starts on.
    fn line(&self) -> usize;

    /// Child statements, in source order.
    fn children_mut(&mut self) -> Vec<&mut dyn Node> {
        Vec::new()
    }

    /// Expressions owned directly by this node.
    fn expressions_mut(&mut self) -> Vec<&mut Expression> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Root of a template, or of a template embedded in another one.
#[derive(Debug)]
pub struct ModuleNode {
    name: String,
    body: BodyNode,
    embedded: Vec<ModuleNode>,
    index: Option<usize>,
}

impl ModuleNode {
    pub fn new(name: impl Into<String>, body: BodyNode) -> Self {
        Self {
            name: name.into(),
            body,
            embedded: Vec::new(),
            index: None,
        }
    }

    /// Creates the module for an embedded template.
    pub fn embedded(name: impl Into<String>, body: BodyNode, index: usize) -> Self {
        Self {
            index: Some(index),
            ..Self::new(name, body)
        }
    }

    /// The template name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &BodyNode {
        &self.body
    }

    /// The embedding index, `None` for a top-level module.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn embedded_modules(&self) -> &[ModuleNode] {
        &self.embedded
    }

    pub(crate) fn set_embedded(&mut self, embedded: Vec<ModuleNode>) {
        self.embedded = embedded;
    }
}

impl Node for ModuleNode {
    fn compile(&self, compiler: &mut Compiler<'_>) -> Result<()> {
        let env = compiler.environment();
        let unit = env.unit_name(&self.name, self.index)?;

        if self.index.is_none() {
            compiler.write("// source ").string(&self.name).raw("\n");
        }
        compiler
            .write(&format!(
                "unit {} extends {} {{\n",
                unit,
                env.base_unit_type()
            ))
            .indent(1);

        compiler
            .write("fn template_name() {\n")
            .indent(1)
            .write("return ")
            .string(&self.name)
            .raw(";\n")
            .outdent(1)?
            .write("}\n\n");

        compiler.write("fn render(env, context) {\n").indent(1);
        let render_start = compiler.source().matches('\n').count() + 1;
        compiler.subcompile(&self.body, true)?;
        compiler.outdent(1)?.write("}\n\n");

        let entries: Vec<String> = compiler
            .debug_info()
            .range(render_start..)
            .map(|(output, source)| format!("{} => {}", output, source))
            .collect();
        compiler
            .write("fn debug_info() {\n")
            .indent(1)
            .write(&format!("return [{}];\n", entries.join(", ")))
            .outdent(1)?
            .write("}\n")
            .outdent(1)?
            .write("}\n");

        for module in &self.embedded {
            compiler.raw("\n").subcompile(module, true)?;
        }
        Ok(())
    }

    fn line(&self) -> usize {
        self.body.line
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Node> {
        let mut children: Vec<&mut dyn Node> = vec![&mut self.body];
        children.extend(self.embedded.iter_mut().map(|m| m as &mut dyn Node));
        children
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A sequence of statements.
#[derive(Debug, Default)]
pub struct BodyNode {
    nodes: Vec<Box<dyn Node>>,
    line: usize,
}

impl BodyNode {
    pub fn new(nodes: Vec<Box<dyn Node>>, line: usize) -> Self {
        Self { nodes, line }
    }

    pub fn nodes(&self) -> &[Box<dyn Node>] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Node for BodyNode {
    fn compile(&self, compiler: &mut Compiler<'_>) -> Result<()> {
        for node in &self.nodes {
            compiler.subcompile(node.as_ref(), true)?;
        }
        Ok(())
    }

    fn line(&self) -> usize {
        self.line
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Node> {
        self.nodes
            .iter_mut()
            .map(|n| -> &mut dyn Node { n.as_mut() })
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Literal template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextNode {
    text: String,
    line: usize,
}

impl TextNode {
    pub fn new(text: impl Into<String>, line: usize) -> Self {
        Self {
            text: text.into(),
            line,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Node for TextNode {
    fn compile(&self, compiler: &mut Compiler<'_>) -> Result<()> {
        compiler
            .add_debug_info(self)
            .write("echo ")
            .string(&self.text)
            .raw(";\n");
        Ok(())
    }

    fn line(&self) -> usize {
        self.line
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// `{{ expression }}`
#[derive(Debug, Clone, PartialEq)]
pub struct PrintNode {
    expression: Expression,
    line: usize,
}

impl PrintNode {
    pub fn new(expression: Expression, line: usize) -> Self {
        Self { expression, line }
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn expression_mut(&mut self) -> &mut Expression {
        &mut self.expression
    }
}

impl Node for PrintNode {
    fn compile(&self, compiler: &mut Compiler<'_>) -> Result<()> {
        compiler.add_debug_info(self).write("echo ");
        self.expression.compile(compiler)?;
        compiler.raw(";\n");
        Ok(())
    }

    fn line(&self) -> usize {
        self.line
    }

    fn expressions_mut(&mut self) -> Vec<&mut Expression> {
        vec![&mut self.expression]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// What a `set` tag assigns.
#[derive(Debug)]
pub enum SetValue {
    /// `{% set name = expression %}`
    Expression(Expression),
    /// `{% set name %}…{% endset %}`
    Capture(BodyNode),
}

/// Assigns a context variable.
#[derive(Debug)]
pub struct SetNode {
    name: String,
    value: SetValue,
    line: usize,
}

impl SetNode {
    pub fn new(name: impl Into<String>, value: SetValue, line: usize) -> Self {
        Self {
            name: name.into(),
            value,
            line,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Node for SetNode {
    fn compile(&self, compiler: &mut Compiler<'_>) -> Result<()> {
        compiler.add_debug_info(self);
        match &self.value {
            SetValue::Expression(expression) => {
                compiler.write("context[").string(&self.name).raw("] = ");
                expression.compile(compiler)?;
                compiler.raw(";\n");
            }
            SetValue::Capture(body) => {
                let buffer = compiler.temp_var_name();
                let charset = compiler.environment().charset().to_string();
                compiler
                    .write(&format!("capture {} {{\n", buffer))
                    .indent(1)
                    .subcompile(body, true)?
                    .outdent(1)?
                    .write("}\n")
                    .write("context[")
                    .string(&self.name)
                    .raw(&format!("] = markup({}, ", buffer))
                    .string(&charset)
                    .raw(");\n");
            }
        }
        Ok(())
    }

    fn line(&self) -> usize {
        self.line
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Node> {
        match &mut self.value {
            SetValue::Capture(body) => vec![body as &mut dyn Node],
            SetValue::Expression(_) => Vec::new(),
        }
    }

    fn expressions_mut(&mut self) -> Vec<&mut Expression> {
        match &mut self.value {
            SetValue::Expression(expression) => vec![expression],
            SetValue::Capture(_) => Vec::new(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// `{% if %}…{% elseif %}…{% else %}…{% endif %}`
#[derive(Debug)]
pub struct IfNode {
    branches: Vec<(Expression, BodyNode)>,
    otherwise: Option<BodyNode>,
    line: usize,
}

impl IfNode {
    pub fn new(
        branches: Vec<(Expression, BodyNode)>,
        otherwise: Option<BodyNode>,
        line: usize,
    ) -> Self {
        Self {
            branches,
            otherwise,
            line,
        }
    }
}

impl Node for IfNode {
    fn compile(&self, compiler: &mut Compiler<'_>) -> Result<()> {
        compiler.add_debug_info(self);
        for (index, (condition, body)) in self.branches.iter().enumerate() {
            if index == 0 {
                compiler.write("if (");
            } else {
                compiler.outdent(1)?.write("} elseif (");
            }
            condition.compile(compiler)?;
            compiler.raw(") {\n").indent(1).subcompile(body, true)?;
        }
        if let Some(body) = &self.otherwise {
            compiler
                .outdent(1)?
                .write("} else {\n")
                .indent(1)
                .subcompile(body, true)?;
        }
        compiler.outdent(1)?.write("}\n");
        Ok(())
    }

    fn line(&self) -> usize {
        self.line
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Node> {
        let mut children: Vec<&mut dyn Node> = self
            .branches
            .iter_mut()
            .map(|(_, body)| body as &mut dyn Node)
            .collect();
        if let Some(body) = &mut self.otherwise {
            children.push(body);
        }
        children
    }

    fn expressions_mut(&mut self) -> Vec<&mut Expression> {
        self.branches
            .iter_mut()
            .map(|(condition, _)| condition)
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
