//! Extensions: pluggable template vocabulary.
//!
//! An [`Extension`] bundles filters, functions, tests, tag parsers, node
//! visitors, operators and globals under a unique name. The environment reads
//! every registered extension exactly once, when its registry freezes, and
//! merges the declarations into flat lookup tables (see [`registry`]).
//!
//! Registrations made directly on the environment (`add_filter`,
//! `add_global`, ...) are collected by an implicit staging extension that is
//! merged last, so ad-hoc registrations win name collisions.
//!
//! # Writing an Extension
//!
//! ```rust
//! use tessel::{Extension, Filter, Function};
//!
//! struct Assets;
//!
//! impl Extension for Assets {
//!     fn name(&self) -> &str {
//!         "assets"
//!     }
//!
//!     fn functions(&self) -> Vec<Function> {
//!         vec![Function::new("asset_*", "asset_url")]
//!     }
//!
//!     fn filters(&self) -> Vec<Filter> {
//!         vec![Filter::new("cdn", "cdn_url").safe(&["html"])]
//!     }
//! }
//! ```

pub mod callable;
pub mod core;
pub mod escaper;
pub mod operator;
pub mod optimizer;
pub(crate) mod registry;

use std::sync::Arc;
use std::time::SystemTime;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::environment::Environment;
use crate::error::Result;
use crate::syntax::parser::TokenParser;
use crate::syntax::visitor::NodeVisitor;

pub use callable::{Filter, Function, Test};
pub use operator::Operators;

/// A bundle of template vocabulary.
///
/// Every method except [`name`](Extension::name) has an empty default.
pub trait Extension: Send + Sync {
    /// Unique name of the extension.
    fn name(&self) -> &str;

    fn filters(&self) -> Vec<Filter> {
        Vec::new()
    }

    fn functions(&self) -> Vec<Function> {
        Vec::new()
    }

    fn tests(&self) -> Vec<Test> {
        Vec::new()
    }

    /// Tag parsers, in registration order.
    fn token_parsers(&self) -> Vec<Arc<dyn TokenParser>> {
        Vec::new()
    }

    /// Tree visitors, in registration order.
    fn node_visitors(&self) -> Vec<Arc<dyn NodeVisitor>> {
        Vec::new()
    }

    /// The (unary, binary) operator pair, if the extension declares operators.
    fn operators(&self) -> Option<Operators> {
        None
    }

    /// Global variables. Must be a JSON object.
    fn globals(&self) -> Value {
        Value::Object(Map::new())
    }

    /// Called once per environment before the first unit is instantiated.
    fn init_runtime(&self, _env: &Environment) -> Result<()> {
        Ok(())
    }

    /// When the extension's vocabulary last changed.
    ///
    /// Persisted units older than this are recompiled when auto-reload is on.
    /// `None` means the extension never invalidates cached units.
    fn last_modified(&self) -> Option<SystemTime> {
        None
    }
}

/// Holds registrations made directly on the environment.
#[derive(Default)]
pub(crate) struct StagingExtension {
    pub(crate) filters: IndexMap<String, Filter>,
    pub(crate) functions: IndexMap<String, Function>,
    pub(crate) tests: IndexMap<String, Test>,
    pub(crate) token_parsers: IndexMap<String, Arc<dyn TokenParser>>,
    pub(crate) node_visitors: Vec<Arc<dyn NodeVisitor>>,
    pub(crate) globals: Map<String, Value>,
}

impl Extension for StagingExtension {
    fn name(&self) -> &str {
        "staging"
    }

    fn filters(&self) -> Vec<Filter> {
        self.filters.values().cloned().collect()
    }

    fn functions(&self) -> Vec<Function> {
        self.functions.values().cloned().collect()
    }

    fn tests(&self) -> Vec<Test> {
        self.tests.values().cloned().collect()
    }

    fn token_parsers(&self) -> Vec<Arc<dyn TokenParser>> {
        self.token_parsers.values().cloned().collect()
    }

    fn node_visitors(&self) -> Vec<Arc<dyn NodeVisitor>> {
        self.node_visitors.clone()
    }

    fn globals(&self) -> Value {
        Value::Object(self.globals.clone())
    }
}
