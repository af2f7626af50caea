//! Code emission.
//!
//! [`Compiler`] turns a parsed template into unit source. It is a stateful,
//! indentation-aware text buffer: nodes write statements through it, render
//! literals with [`literal`](Compiler::literal) and [`string`](Compiler::string),
//! and mark their source line with [`add_debug_info`](Compiler::add_debug_info).
//!
//! Every call to [`compile`](Compiler::compile) starts a fresh session, so
//! compiling the same tree twice yields byte-identical output.
//!
//! # Debug Map
//!
//! `add_debug_info` writes a `// line N` marker whenever the source line
//! changes, and records `output line → source line`. Only the part of the
//! buffer written since the previous marker is scanned for newlines.
//!
//! ```text
//! unit __TesselUnit_… extends Unit {      output line 1
//!     …
//!         // line 3
//!         echo "Hello";                    output line 8 → source line 3
//! ```
//!
//! # Literals
//!
//! | Value | Emitted as |
//! |-------|------------|
//! | null / bool | `null`, `true`, `false` |
//! | integer | decimal digits |
//! | float | decimal point notation, never locale dependent (`1.25`, `2.0`) |
//! | array / object | `[key => value, …]` in iteration order |
//! | string | double-quoted, with `\`, NUL, tab, `"` and `$` escaped |

use std::collections::BTreeMap;

use serde_json::Value;

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::syntax::node::{ModuleNode, Node};
use crate::util::sha256_hex;

const INDENT: &str = "    ";

/// Stateful code emitter.
pub struct Compiler<'env> {
    env: &'env Environment,
    source: String,
    indentation: usize,
    filename: Option<String>,
    last_line: Option<usize>,
    source_offset: usize,
    source_line: usize,
    debug_info: BTreeMap<usize, usize>,
    var_name_salt: u64,
}

impl<'env> Compiler<'env> {
    pub fn new(env: &'env Environment) -> Self {
        Self {
            env,
            source: String::new(),
            indentation: 0,
            filename: None,
            last_line: None,
            source_offset: 0,
            source_line: 1,
            debug_info: BTreeMap::new(),
            var_name_salt: 0,
        }
    }

    /// The environment this compiler emits for.
    pub fn environment(&self) -> &'env Environment {
        self.env
    }

    /// Compiles `node` into a fresh buffer.
    ///
    /// All session state is reset first. If `node` is a [`ModuleNode`], its
    /// template name becomes the session's file name.
    pub fn compile(&mut self, node: &dyn Node, indentation: usize) -> Result<&mut Self> {
        self.source.clear();
        self.indentation = indentation;
        self.filename = node
            .as_any()
            .downcast_ref::<ModuleNode>()
            .map(|module| module.name().to_string());
        self.last_line = None;
        self.source_offset = 0;
        self.source_line = 1;
        self.debug_info.clear();
        self.var_name_salt = 0;

        node.compile(self)?;
        Ok(self)
    }

    /// Compiles a child node into the current buffer.
    ///
    /// Unless `raw`, the current indentation is written first.
    pub fn subcompile(&mut self, node: &dyn Node, raw: bool) -> Result<&mut Self> {
        if !raw {
            self.add_indentation();
        }
        node.compile(self)?;
        Ok(self)
    }

    /// Appends text verbatim.
    pub fn raw(&mut self, text: &str) -> &mut Self {
        self.source.push_str(text);
        self
    }

    /// Appends a statement fragment at the current indentation.
    pub fn write(&mut self, fragment: &str) -> &mut Self {
        self.add_indentation();
        self.source.push_str(fragment);
        self
    }

    /// Appends several fragments, each at the current indentation.
    pub fn write_all(&mut self, fragments: &[&str]) -> &mut Self {
        for fragment in fragments {
            self.write(fragment);
        }
        self
    }

    /// Appends a double-quoted string literal.
    pub fn string(&mut self, value: &str) -> &mut Self {
        self.source.push('"');
        self.source.push_str(&escape_string(value));
        self.source.push('"');
        self
    }

    /// Appends the literal representation of `value`.
    pub fn literal(&mut self, value: &Value) -> &mut Self {
        match value {
            Value::Null => self.raw("null"),
            Value::Bool(true) => self.raw("true"),
            Value::Bool(false) => self.raw("false"),
            Value::Number(number) => {
                let text = format_number(number);
                self.raw(&text)
            }
            Value::String(text) => self.string(text),
            Value::Array(items) => {
                self.raw("[");
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        self.raw(", ");
                    }
                    self.raw(&index.to_string()).raw(" => ").literal(item);
                }
                self.raw("]")
            }
            Value::Object(map) => {
                self.raw("[");
                for (index, (key, item)) in map.iter().enumerate() {
                    if index > 0 {
                        self.raw(", ");
                    }
                    self.string(key).raw(" => ").literal(item);
                }
                self.raw("]")
            }
        }
    }

    /// Marks the source line of `node` if it differs from the last one.
    pub fn add_debug_info(&mut self, node: &dyn Node) -> &mut Self {
        let line = node.line();
        if self.last_line != Some(line) {
            self.write(&format!("// line {}\n", line));
            self.source_line += self.source[self.source_offset..].matches('\n').count();
            self.source_offset = self.source.len();
            self.debug_info.insert(self.source_line, line);
            self.last_line = Some(line);
        }
        self
    }

    pub fn indent(&mut self, step: usize) -> &mut Self {
        self.indentation += step;
        self
    }

    /// Decreases indentation.
    ///
    /// Fails with a logic error, leaving indentation unchanged, if it would
    /// become negative.
    pub fn outdent(&mut self, step: usize) -> Result<&mut Self> {
        self.indentation = self.indentation.checked_sub(step).ok_or_else(|| {
            Error::logic("Unable to call outdent() as the indentation would become negative.")
        })?;
        Ok(self)
    }

    /// Returns a fresh host-level temporary variable name.
    ///
    /// Names are unique within one `compile` session and repeat across
    /// sessions. Each unit is emitted by a single session, so a repeated name
    /// never shares a scope with its twin, and recompiling unchanged input
    /// stays byte-identical.
    pub fn temp_var_name(&mut self) -> String {
        let salt = self.var_name_salt;
        self.var_name_salt += 1;
        format!(
            "__internal_{}",
            sha256_hex(&format!("Compiler::temp_var_name{}", salt))
        )
    }

    /// The current indentation depth.
    pub fn indentation(&self) -> usize {
        self.indentation
    }

    /// The template name of the module being compiled.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// The source emitted so far.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Recorded `output line → source line` entries.
    pub fn debug_info(&self) -> &BTreeMap<usize, usize> {
        &self.debug_info
    }

    pub fn into_source(self) -> String {
        self.source
    }

    fn add_indentation(&mut self) {
        for _ in 0..self.indentation {
            self.source.push_str(INDENT);
        }
    }
}

/// Escapes a string for a double-quoted literal.
pub(crate) fn escape_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '$' => escaped.push_str("\\$"),
            '\t' => escaped.push_str("\\t"),
            '\0' => escaped.push_str("\\000"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn format_number(number: &serde_json::Number) -> String {
    if let Some(int) = number.as_i64() {
        return int.to_string();
    }
    if let Some(int) = number.as_u64() {
        return int.to_string();
    }
    match number.as_f64() {
        // Debug formatting always keeps a decimal point or exponent.
        Some(float) => format!("{:?}", float),
        None => number.to_string(),
    }
}
