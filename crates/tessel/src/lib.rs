//! # Tessel - Template Compiler
//!
//! `tessel` turns template source into *units*: emitted, loadable programs
//! named by a content hash of their template. Compiled units are cached in
//! memory and, optionally, on disk, so an unchanged template is compiled at
//! most once per cache directory.
//!
//! ## Core Concepts
//!
//! - [`Environment`]: configuration, loader, extension registry and caches
//! - [`Loader`]: maps template names to source, cache keys and freshness
//! - [`Extension`]: bundles filters, functions, tests, tags, visitors and operators
//! - [`Compiler`](compiler::Compiler): the code emitter behind every unit
//! - [`CompiledUnit`]: a loaded unit, shared as `Arc<CompiledUnit>`
//!
//! ## Quick Start
//!
//! ```rust
//! use tessel::{ArrayLoader, Environment};
//!
//! let loader = ArrayLoader::new()
//!     .with_template("greeting.tsl", "Hello {{ name|upper }}!");
//! let env = Environment::new(loader);
//!
//! let unit = env.resolve_unit("greeting.tsl", None).unwrap();
//! assert!(unit.name().to_string().starts_with("__TesselUnit_"));
//! assert!(unit.source().contains("str_upper(env, "));
//! ```
//!
//! ## Template Syntax
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `{{ expr }}` | print an expression (escaped per [`Autoescape`]) |
//! | `{% tag ... %}` | a tag, e.g. `set` and `if` |
//! | `{# ... #}` | a comment, dropped |
//!
//! Expressions support literals, arrays, hashes, attribute access, filters
//! (`x|f(a)`), function calls, tests (`x is even`) and the operators declared
//! by extensions.
//!
//! ## Persisted Cache
//!
//! ```rust,no_run
//! use tessel::{Environment, EnvironmentOptions, FilesystemLoader};
//!
//! let options = EnvironmentOptions {
//!     cache: Some("/var/cache/tessel".into()),
//!     auto_reload: Some(true),
//!     ..Default::default()
//! };
//! let loader = FilesystemLoader::new("templates");
//! let env = Environment::with_options(loader, options);
//! let unit = env.resolve_unit("index.html.tsl", None).unwrap();
//! println!("{:?}", unit.cache_path());
//! ```
//!
//! ## Custom Vocabulary
//!
//! ```rust
//! use tessel::{ArrayLoader, Environment, Filter};
//!
//! let mut env = Environment::new(ArrayLoader::new().with_template("a.tsl", "{{ x|md }}"));
//! env.add_filter(Filter::new("md", "markdown").safe(&["html"])).unwrap();
//! let unit = env.resolve_unit("a.tsl", None).unwrap();
//! assert!(unit.source().contains("markdown("));
//! assert!(!unit.source().contains("escape("));
//! ```

pub mod cache;
pub mod compiler;
pub mod environment;
pub mod error;
pub mod extension;
pub mod loader;
pub mod syntax;
pub mod unit;

mod util;

pub use cache::UnitCache;
pub use environment::{Autoescape, Candidate, Environment, EnvironmentOptions};
pub use error::{Error, Result, TemplateError};
pub use extension::{Extension, Filter, Function, Operators, Test};
pub use loader::{ArrayLoader, ChainLoader, FilesystemLoader, Loader};
pub use unit::{CompiledUnit, UnitName, UnitOrigin};
