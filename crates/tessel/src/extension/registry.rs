//! Two-phase extension registry.
//!
//! The registry starts *open*: extensions and ad-hoc vocabulary can be added or
//! removed. On first lookup it *freezes*: every extension is read once, in
//! registration order, followed by the staging extension, and the declarations
//! are merged into flat tables. Freezing is one-way; any later mutation is a
//! [`Error::Logic`].
//!
//! ```text
//! Open ──(first lookup / init_runtime)──▶ Frozen
//! ```
//!
//! # Lookup Order
//!
//! Filters and functions resolve in three steps:
//!
//! 1. Exact name.
//! 2. Wildcard names (`*` captures anything, lazily), in registration order;
//!    the first full match wins and its captures become the descriptor's
//!    arguments.
//! 3. Fallback callbacks, in registration order.
//!
//! If all three miss, `None` is returned; the parser decides whether that is
//! a syntax error.

use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;

use super::callable::{Callable, CallableKind, FilterKind, FunctionKind};
use super::operator::{BinaryOperator, UnaryOperator};
use super::{Extension, Filter, Function, StagingExtension, Test};
use crate::error::{Error, Result};
use crate::syntax::parser::TokenParser;
use crate::syntax::visitor::NodeVisitor;

/// Fallback resolver consulted when no registered filter matches.
pub type FilterCallback = Box<dyn Fn(&str) -> Option<Filter> + Send + Sync>;

/// Fallback resolver consulted when no registered function matches.
pub type FunctionCallback = Box<dyn Fn(&str) -> Option<Function> + Send + Sync>;

pub(crate) struct Registry {
    extensions: IndexMap<String, Box<dyn Extension>>,
    staging: StagingExtension,
    filter_callbacks: Vec<FilterCallback>,
    function_callbacks: Vec<FunctionCallback>,
    vocabulary: OnceCell<Vocabulary>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            extensions: IndexMap::new(),
            staging: StagingExtension::default(),
            filter_callbacks: Vec::new(),
            function_callbacks: Vec::new(),
            vocabulary: OnceCell::new(),
        }
    }

    /// Creates an open registry seeded with `extensions`, in order.
    pub(crate) fn with_extensions(extensions: Vec<Box<dyn Extension>>) -> Self {
        let mut registry = Self::new();
        for extension in extensions {
            registry
                .extensions
                .insert(extension.name().to_string(), extension);
        }
        registry
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.vocabulary.get().is_some()
    }

    fn ensure_open(&self, action: impl FnOnce() -> String) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::logic(format!(
                "Unable to {} as extensions have already been initialized.",
                action()
            )));
        }
        Ok(())
    }

    pub(crate) fn add_extension(&mut self, extension: Box<dyn Extension>) -> Result<()> {
        let name = extension.name().to_string();
        self.ensure_open(|| format!("register extension \"{}\"", name))?;
        if self.extensions.contains_key(&name) {
            return Err(Error::logic(format!(
                "An extension named \"{}\" is already registered.",
                name
            )));
        }
        self.extensions.insert(name, extension);
        Ok(())
    }

    pub(crate) fn remove_extension(&mut self, name: &str) -> Result<Option<Box<dyn Extension>>> {
        self.ensure_open(|| format!("remove extension \"{}\"", name))?;
        Ok(self.extensions.shift_remove(name))
    }

    pub(crate) fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains_key(name)
    }

    pub(crate) fn extension(&self, name: &str) -> Option<&dyn Extension> {
        self.extensions.get(name).map(|ext| ext.as_ref())
    }

    pub(crate) fn extensions(&self) -> impl Iterator<Item = &dyn Extension> {
        self.extensions.values().map(|ext| ext.as_ref())
    }

    pub(crate) fn add_filter(&mut self, filter: Filter) -> Result<()> {
        self.ensure_open(|| format!("add filter \"{}\"", filter.name()))?;
        self.staging.filters.insert(filter.name().to_string(), filter);
        Ok(())
    }

    pub(crate) fn add_function(&mut self, function: Function) -> Result<()> {
        self.ensure_open(|| format!("add function \"{}\"", function.name()))?;
        self.staging
            .functions
            .insert(function.name().to_string(), function);
        Ok(())
    }

    pub(crate) fn add_test(&mut self, test: Test) -> Result<()> {
        self.ensure_open(|| format!("add test \"{}\"", test.name()))?;
        self.staging.tests.insert(test.name().to_string(), test);
        Ok(())
    }

    pub(crate) fn add_token_parser(&mut self, parser: Arc<dyn TokenParser>) -> Result<()> {
        self.ensure_open(|| format!("add token parser \"{}\"", parser.tag()))?;
        self.staging
            .token_parsers
            .insert(parser.tag().to_string(), parser);
        Ok(())
    }

    pub(crate) fn add_node_visitor(&mut self, visitor: Arc<dyn NodeVisitor>) -> Result<()> {
        self.ensure_open(|| "add a node visitor".to_string())?;
        self.staging.node_visitors.push(visitor);
        Ok(())
    }

    pub(crate) fn stage_global(&mut self, name: String, value: Value) -> Result<()> {
        self.ensure_open(|| format!("add global \"{}\"", name))?;
        self.staging.globals.insert(name, value);
        Ok(())
    }

    pub(crate) fn register_undefined_filter_callback(
        &mut self,
        callback: FilterCallback,
    ) -> Result<()> {
        self.ensure_open(|| "register an undefined filter callback".to_string())?;
        self.filter_callbacks.push(callback);
        Ok(())
    }

    pub(crate) fn register_undefined_function_callback(
        &mut self,
        callback: FunctionCallback,
    ) -> Result<()> {
        self.ensure_open(|| "register an undefined function callback".to_string())?;
        self.function_callbacks.push(callback);
        Ok(())
    }

    /// Returns the frozen vocabulary, freezing the registry on first call.
    pub(crate) fn vocabulary(&self) -> Result<&Vocabulary> {
        self.vocabulary.get_or_try_init(|| self.freeze())
    }

    fn freeze(&self) -> Result<Vocabulary> {
        let mut vocabulary = Vocabulary::default();
        for extension in self.extensions.values() {
            vocabulary.merge(extension.as_ref())?;
        }
        vocabulary.merge(&self.staging)?;
        for extension in self.global_sources() {
            checked_globals(extension)?;
        }
        vocabulary.filters.compile_patterns()?;
        vocabulary.functions.compile_patterns()?;

        tracing::debug!(
            extensions = self.extensions.len(),
            filters = vocabulary.filters.entries.len(),
            functions = vocabulary.functions.entries.len(),
            tests = vocabulary.tests.len(),
            tags = vocabulary.token_parsers.len(),
            "froze extension registry"
        );
        Ok(vocabulary)
    }

    pub(crate) fn filter(&self, name: &str) -> Result<Option<Filter>> {
        if let Some(filter) = self.vocabulary()?.filters.resolve(name) {
            return Ok(Some(filter));
        }
        Ok(self.filter_callbacks.iter().find_map(|callback| {
            let found = callback(name);
            if found.is_some() {
                tracing::trace!(name, "filter resolved by fallback callback");
            }
            found
        }))
    }

    pub(crate) fn function(&self, name: &str) -> Result<Option<Function>> {
        if let Some(function) = self.vocabulary()?.functions.resolve(name) {
            return Ok(Some(function));
        }
        Ok(self.function_callbacks.iter().find_map(|callback| {
            let found = callback(name);
            if found.is_some() {
                tracing::trace!(name, "function resolved by fallback callback");
            }
            found
        }))
    }

    pub(crate) fn test(&self, name: &str) -> Result<Option<Test>> {
        Ok(self.vocabulary()?.tests.get(name).cloned())
    }

    /// Merges every extension's globals, staging last.
    ///
    /// Later sources overwrite earlier ones on key collision.
    pub(crate) fn collect_globals(&self) -> Result<IndexMap<String, Value>> {
        let mut globals = IndexMap::new();
        for extension in self.global_sources() {
            globals.extend(checked_globals(extension)?);
        }
        Ok(globals)
    }

    fn global_sources(&self) -> impl Iterator<Item = &dyn Extension> {
        self.extensions
            .values()
            .map(|ext| -> &dyn Extension { ext.as_ref() })
            .chain(std::iter::once(&self.staging as &dyn Extension))
    }
}

fn checked_globals(extension: &dyn Extension) -> Result<serde_json::Map<String, Value>> {
    match extension.globals() {
        Value::Object(map) => Ok(map),
        other => Err(Error::Configuration(format!(
            "\"{}\" extension must return an object of globals, got {}.",
            extension.name(),
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Flat lookup tables produced by freezing the registry.
#[derive(Default)]
pub(crate) struct Vocabulary {
    pub(crate) filters: CallableTable<FilterKind>,
    pub(crate) functions: CallableTable<FunctionKind>,
    pub(crate) tests: IndexMap<String, Test>,
    pub(crate) token_parsers: IndexMap<String, Arc<dyn TokenParser>>,
    pub(crate) node_visitors: Vec<Arc<dyn NodeVisitor>>,
    pub(crate) unary_operators: IndexMap<String, UnaryOperator>,
    pub(crate) binary_operators: IndexMap<String, BinaryOperator>,
}

impl Vocabulary {
    fn merge(&mut self, extension: &dyn Extension) -> Result<()> {
        for filter in extension.filters() {
            self.filters.insert(filter);
        }
        for function in extension.functions() {
            self.functions.insert(function);
        }
        for test in extension.tests() {
            self.tests.insert(test.name().to_string(), test);
        }
        for parser in extension.token_parsers() {
            self.token_parsers.insert(parser.tag().to_string(), parser);
        }
        self.node_visitors.extend(extension.node_visitors());

        if let Some(operators) = extension.operators() {
            operators.validate().map_err(|reason| {
                Error::InvalidArgument(format!(
                    "\"{}\" extension does not declare a valid operators pair: {}.",
                    extension.name(),
                    reason
                ))
            })?;
            self.unary_operators.extend(operators.unary);
            self.binary_operators.extend(operators.binary);
        }
        Ok(())
    }
}

/// Name-keyed callables plus the compiled wildcard patterns among them.
pub(crate) struct CallableTable<K> {
    pub(crate) entries: IndexMap<String, Callable<K>>,
    patterns: Vec<WildcardPattern>,
}

impl<K> Default for CallableTable<K> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            patterns: Vec::new(),
        }
    }
}

impl<K: CallableKind> CallableTable<K> {
    fn insert(&mut self, callable: Callable<K>) {
        self.entries.insert(callable.name().to_string(), callable);
    }

    fn compile_patterns(&mut self) -> Result<()> {
        self.patterns = self
            .entries
            .values()
            .filter(|callable| callable.is_pattern())
            .map(|callable| WildcardPattern::new(callable.name()))
            .collect::<Result<_>>()?;
        Ok(())
    }

    fn resolve(&self, name: &str) -> Option<Callable<K>> {
        if let Some(callable) = self.entries.get(name) {
            return Some(callable.clone());
        }
        self.patterns.iter().find_map(|pattern| {
            let arguments = pattern.captures(name)?;
            tracing::trace!(name, pattern = %pattern.name, kind = K::LABEL, "wildcard match");
            self.entries
                .get(&pattern.name)
                .map(|callable| callable.with_arguments(arguments))
        })
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

struct WildcardPattern {
    name: String,
    regex: Regex,
}

impl WildcardPattern {
    fn new(name: &str) -> Result<Self> {
        let pattern = format!("^{}$", regex::escape(name).replace(r"\*", "(.*?)"));
        let regex = Regex::new(&pattern).map_err(|e| {
            Error::Configuration(format!("invalid wildcard name \"{}\": {}", name, e))
        })?;
        Ok(Self {
            name: name.to_string(),
            regex,
        })
    }

    fn captures(&self, name: &str) -> Option<Vec<String>> {
        let captures = self.regex.captures(name)?;
        Some(
            captures
                .iter()
                .skip(1)
                .map(|group| group.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect(),
        )
    }
}
