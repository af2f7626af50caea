//! Named callable descriptors: filters, functions and tests.
//!
//! A descriptor carries the name templates use, the host-level callable the
//! emitter writes into compiled units, and options describing how the call is
//! emitted. Descriptors always carry their own name, so registration takes a
//! single value:
//!
//! ```rust
//! use tessel::Filter;
//!
//! let upper = Filter::new("upper", "str_upper");
//! let dated = Filter::new("date_*", "format_date").needs_environment();
//! assert_eq!(dated.name(), "date_*");
//! ```
//!
//! Names may contain `*` wildcards. When a wildcard name matches a requested
//! name, the captured segments are bound as the descriptor's leading
//! [`arguments`](Callable::arguments).

use std::fmt;
use std::marker::PhantomData;

/// Distinguishes the three callable vocabularies.
pub trait CallableKind {
    /// Human readable kind, used in messages ("filter", "function", "test").
    const LABEL: &'static str;
}

/// Marker for filter descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {}

/// Marker for function descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {}

/// Marker for test descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {}

impl CallableKind for FilterKind {
    const LABEL: &'static str = "filter";
}

impl CallableKind for FunctionKind {
    const LABEL: &'static str = "function";
}

impl CallableKind for TestKind {
    const LABEL: &'static str = "test";
}

/// A filter applied with `value|name(args)`.
pub type Filter = Callable<FilterKind>;

/// A function called with `name(args)`.
pub type Function = Callable<FunctionKind>;

/// A test applied with `value is name(args)`.
pub type Test = Callable<TestKind>;

/// Options controlling how a call is emitted and analyzed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallableOptions {
    /// Pass the environment as the first argument.
    pub needs_environment: bool,
    /// Pass the render context after the environment.
    pub needs_context: bool,
    /// Escaping strategies whose output needs no further escaping.
    pub is_safe: Vec<String>,
    /// Strategies for which the output is as safe as the input.
    pub preserves_safety: Vec<String>,
    /// Deprecation note; using a deprecated callable logs a warning.
    pub deprecated: Option<String>,
}

/// Descriptor of a named callable.
pub struct Callable<K> {
    name: String,
    callable: String,
    options: CallableOptions,
    arguments: Vec<String>,
    kind: PhantomData<K>,
}

impl<K: CallableKind> Callable<K> {
    /// Creates a descriptor for `name`, emitted as a call to `callable`.
    pub fn new(name: impl Into<String>, callable: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            callable: callable.into(),
            options: CallableOptions::default(),
            arguments: Vec::new(),
            kind: PhantomData,
        }
    }

    /// Requests the environment as first argument.
    pub fn needs_environment(mut self) -> Self {
        self.options.needs_environment = true;
        self
    }

    /// Requests the render context as argument.
    pub fn needs_context(mut self) -> Self {
        self.options.needs_context = true;
        self
    }

    /// Declares the output safe for the given escaping strategies.
    pub fn safe(mut self, strategies: &[&str]) -> Self {
        self.options.is_safe = strategies.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Declares that output safety follows input safety for the strategies.
    pub fn preserves_safety(mut self, strategies: &[&str]) -> Self {
        self.options.preserves_safety = strategies.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Marks the callable deprecated.
    pub fn deprecated(mut self, note: impl Into<String>) -> Self {
        self.options.deprecated = Some(note.into());
        self
    }

    /// The registered name (may contain `*`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The host-level callable written into compiled units.
    pub fn callable(&self) -> &str {
        &self.callable
    }

    /// Emission options.
    pub fn options(&self) -> &CallableOptions {
        &self.options
    }

    /// Arguments bound by wildcard resolution.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Returns true if the name contains a wildcard.
    pub fn is_pattern(&self) -> bool {
        self.name.contains('*')
    }

    /// Returns true if output is safe for `strategy`.
    pub fn is_safe_for(&self, strategy: &str) -> bool {
        contains_strategy(&self.options.is_safe, strategy)
    }

    /// Returns true if output safety follows input safety for `strategy`.
    pub fn preserves_safety_for(&self, strategy: &str) -> bool {
        contains_strategy(&self.options.preserves_safety, strategy)
    }

    pub(crate) fn with_arguments(&self, arguments: Vec<String>) -> Self {
        let mut bound = self.clone();
        bound.arguments = arguments;
        bound
    }
}

fn contains_strategy(strategies: &[String], strategy: &str) -> bool {
    strategies.iter().any(|s| s == strategy || s == "all")
}

impl<K> Clone for Callable<K> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            callable: self.callable.clone(),
            options: self.options.clone(),
            arguments: self.arguments.clone(),
            kind: PhantomData,
        }
    }
}

impl<K> PartialEq for Callable<K> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.callable == other.callable
            && self.options == other.options
            && self.arguments == other.arguments
    }
}

impl<K: CallableKind> fmt::Debug for Callable<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(K::LABEL)
            .field("name", &self.name)
            .field("callable", &self.callable)
            .field("options", &self.options)
            .field("arguments", &self.arguments)
            .finish()
    }
}
