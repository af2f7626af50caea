//! The compilation environment.
//!
//! [`Environment`] is the single entry point for turning a template name into
//! a loaded [`CompiledUnit`]. It owns the configuration, the [`Loader`], the
//! lexer and parser, the extension registry and the persisted unit cache.
//!
//! # Resolving a Unit
//!
//! ```text
//! resolve_unit(name)
//!   ├─ unit name = prefix + sha256(loader.cache_key(name)) [+ _index]
//!   ├─ already loaded?            → same Arc as before
//!   ├─ cache disabled             → compile in memory
//!   └─ cache enabled
//!        ├─ no file, or auto_reload and stale → compile, write atomically
//!        └─ read the cache file
//!   ├─ init_runtime() once
//!   └─ record in the loaded-unit map
//! ```
//!
//! Once loaded, a unit is never recompiled by the same environment, even if
//! its cache file changes; call [`clear_compiled_units`](Environment::clear_compiled_units)
//! to drop the in-memory map.
//!
//! # Lifecycle
//!
//! Extensions and ad-hoc vocabulary are registered while the registry is
//! open. The first lookup of filters, functions, tests, tags, operators or
//! visitors (which every compile performs) freezes it, after which
//! registration fails with [`Error::Logic`]. Build and freeze one environment
//! before sharing it across threads; the loaded-unit map is guarded by a
//! read-mostly lock.
//!
//! ```rust
//! use tessel::{ArrayLoader, Environment};
//!
//! let loader = ArrayLoader::new().with_template("hello.tsl", "Hello {{ name }}!");
//! let env = Environment::new(loader);
//! let unit = env.resolve_unit("hello.tsl", None).unwrap();
//! assert!(unit.source().contains("echo \"Hello \";"));
//! ```

mod options;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use serde_json::{Map, Value};

use crate::cache::UnitCache;
use crate::compiler::Compiler;
use crate::error::{Error, Result};
use crate::extension::core::CoreExtension;
use crate::extension::escaper::EscaperExtension;
use crate::extension::operator::{BinaryOperator, UnaryOperator};
use crate::extension::optimizer::{OptimizerExtension, OPTIMIZE_NONE};
use crate::extension::registry::{Registry, Vocabulary};
use crate::extension::{Extension, Filter, Function, Test};
use crate::loader::Loader;
use crate::syntax::lexer::{DefaultLexer, Lexer};
use crate::syntax::node::ModuleNode;
use crate::syntax::parser::{DefaultParser, Parser, TokenParser};
use crate::syntax::token::TokenStream;
use crate::syntax::visitor::NodeVisitor;
use crate::unit::{CompiledUnit, UnitName, UnitOrigin, UNIT_NAME_PREFIX};
use crate::util::sha256_hex;

pub use options::{
    guess_strategy, Autoescape, AutoescapeCallback, EnvironmentOptions, DEFAULT_BASE_UNIT_TYPE,
    TEMPLATE_SUFFIX,
};

/// Name prefix of templates created with [`Environment::create_template`].
pub const STRING_TEMPLATE_PREFIX: &str = "__string_template__";

/// A template to try in [`Environment::resolve_first_available`].
#[derive(Debug, Clone)]
pub enum Candidate<'a> {
    /// A template name to resolve.
    Name(&'a str),
    /// An already loaded unit, returned as is.
    Unit(Arc<CompiledUnit>),
}

impl<'a> From<&'a str> for Candidate<'a> {
    fn from(name: &'a str) -> Self {
        Candidate::Name(name)
    }
}

impl<'a> From<&'a String> for Candidate<'a> {
    fn from(name: &'a String) -> Self {
        Candidate::Name(name)
    }
}

impl From<Arc<CompiledUnit>> for Candidate<'_> {
    fn from(unit: Arc<CompiledUnit>) -> Self {
        Candidate::Unit(unit)
    }
}

/// Orchestrates loading, compiling and caching templates.
pub struct Environment {
    charset: String,
    debug: bool,
    auto_reload: Option<bool>,
    strict_variables: bool,
    autoescape: Autoescape,
    base_unit_type: String,
    optimizations: i32,
    cache: Option<UnitCache>,
    loader: Option<Box<dyn Loader>>,
    lexer: OnceCell<Box<dyn Lexer>>,
    parser: OnceCell<Box<dyn Parser>>,
    registry: Registry,
    globals: OnceCell<IndexMap<String, Value>>,
    runtime_initialized: OnceCell<()>,
    units: RwLock<HashMap<UnitName, Arc<CompiledUnit>>>,
    string_templates: RwLock<HashMap<String, String>>,
}

impl Environment {
    /// Creates an environment with default options.
    pub fn new(loader: impl Loader + 'static) -> Self {
        Self::with_options(loader, EnvironmentOptions::default())
    }

    pub fn with_options(loader: impl Loader + 'static, options: EnvironmentOptions) -> Self {
        let mut env = Self::from_options(options);
        env.set_loader(loader);
        env
    }

    /// Creates an environment without a loader.
    ///
    /// Only [`create_template`](Self::create_template) works until a loader
    /// is set with [`set_loader`](Self::set_loader).
    pub fn from_options(options: EnvironmentOptions) -> Self {
        let mut builtins: Vec<Box<dyn Extension>> = vec![
            Box::new(CoreExtension::new()),
            Box::new(EscaperExtension::new()),
        ];
        if options.optimizations != OPTIMIZE_NONE {
            builtins.push(Box::new(OptimizerExtension::new(options.optimizations)));
        }

        Self {
            charset: options.charset.to_uppercase(),
            debug: options.debug,
            auto_reload: options.auto_reload,
            strict_variables: options.strict_variables,
            autoescape: options.autoescape,
            base_unit_type: options.base_unit_type,
            optimizations: options.optimizations,
            cache: options.cache.map(UnitCache::new),
            loader: None,
            lexer: OnceCell::new(),
            parser: OnceCell::new(),
            registry: Registry::with_extensions(builtins),
            globals: OnceCell::new(),
            runtime_initialized: OnceCell::new(),
            units: RwLock::new(HashMap::new()),
            string_templates: RwLock::new(HashMap::new()),
        }
    }

    // ---- configuration ----

    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Sets the charset, normalized to uppercase.
    pub fn set_charset(&mut self, charset: &str) {
        self.charset = charset.to_uppercase();
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn enable_debug(&mut self) {
        self.debug = true;
    }

    pub fn disable_debug(&mut self) {
        self.debug = false;
    }

    /// Whether stale cache files are recompiled. Mirrors debug unless set.
    pub fn is_auto_reload(&self) -> bool {
        self.auto_reload.unwrap_or(self.debug)
    }

    pub fn enable_auto_reload(&mut self) {
        self.auto_reload = Some(true);
    }

    pub fn disable_auto_reload(&mut self) {
        self.auto_reload = Some(false);
    }

    pub fn is_strict_variables(&self) -> bool {
        self.strict_variables
    }

    pub fn enable_strict_variables(&mut self) {
        self.strict_variables = true;
    }

    pub fn disable_strict_variables(&mut self) {
        self.strict_variables = false;
    }

    pub fn autoescape(&self) -> &Autoescape {
        &self.autoescape
    }

    pub fn set_autoescape(&mut self, autoescape: Autoescape) {
        self.autoescape = autoescape;
    }

    /// The type every compiled unit extends.
    pub fn base_unit_type(&self) -> &str {
        &self.base_unit_type
    }

    pub fn set_base_unit_type(&mut self, base: impl Into<String>) {
        self.base_unit_type = base.into();
    }

    pub fn optimizations(&self) -> i32 {
        self.optimizations
    }

    pub fn unit_name_prefix(&self) -> &'static str {
        UNIT_NAME_PREFIX
    }

    /// The cache root, `None` when caching is disabled.
    pub fn cache(&self) -> Option<&Path> {
        self.cache.as_ref().map(UnitCache::root)
    }

    /// Enables caching under `root`, or disables it with `None`.
    pub fn set_cache(&mut self, root: Option<PathBuf>) {
        self.cache = root.map(UnitCache::new);
    }

    // ---- collaborators ----

    /// The loader. Using the environment without one is a logic error.
    pub fn loader(&self) -> Result<&dyn Loader> {
        self.loader
            .as_deref()
            .ok_or_else(|| Error::logic("You must set a loader first."))
    }

    pub fn set_loader(&mut self, loader: impl Loader + 'static) {
        self.loader = Some(Box::new(loader));
    }

    pub fn lexer(&self) -> &dyn Lexer {
        self.lexer
            .get_or_init(|| Box::new(DefaultLexer::new()) as Box<dyn Lexer>)
            .as_ref()
    }

    pub fn set_lexer(&mut self, lexer: impl Lexer + 'static) {
        self.lexer = OnceCell::with_value(Box::new(lexer));
    }

    pub fn parser(&self) -> &dyn Parser {
        self.parser
            .get_or_init(|| Box::new(DefaultParser::new()) as Box<dyn Parser>)
            .as_ref()
    }

    pub fn set_parser(&mut self, parser: impl Parser + 'static) {
        self.parser = OnceCell::with_value(Box::new(parser));
    }

    // ---- units ----

    /// Derives the content-addressed unit name of a template.
    pub fn unit_name(&self, name: &str, index: Option<usize>) -> Result<UnitName> {
        Ok(UnitName::new(&self.cache_key(name)?, index))
    }

    /// Loads the unit for `name`, compiling and caching it as needed.
    ///
    /// `index` selects a unit embedded in the template.
    pub fn resolve_unit(&self, name: &str, index: Option<usize>) -> Result<Arc<CompiledUnit>> {
        let unit_name = self.unit_name(name, index)?;
        if let Some(unit) = read(&self.units).get(&unit_name) {
            return Ok(Arc::clone(unit));
        }

        let persisted = self.cache.as_ref().filter(|_| !self.is_string_template(name));
        let (source, origin) = match persisted {
            Some(cache) => {
                let path = cache.path_for(&unit_name);
                let stale = match cache.modified(&path) {
                    None => true,
                    Some(mtime) => self.is_auto_reload() && !self.is_fresh(name, mtime)?,
                };
                if stale {
                    let source = self.compile_template(name)?;
                    cache.write(&path, &source)?;
                    tracing::debug!(template = name, path = %path.display(), "wrote compiled unit");
                } else {
                    tracing::debug!(template = name, path = %path.display(), "compiled unit cache hit");
                }
                (cache.read(&path)?, UnitOrigin::Cache(path))
            }
            None => (self.compile_template(name)?, UnitOrigin::Memory),
        };

        self.init_runtime()?;
        let unit = Arc::new(CompiledUnit::load(
            unit_name.clone(),
            name,
            source.into(),
            origin,
        )?);
        let mut units = write(&self.units);
        Ok(Arc::clone(units.entry(unit_name).or_insert(unit)))
    }

    /// Resolves the first candidate that exists.
    ///
    /// Candidates that fail with a loader error are skipped; any other error
    /// is returned immediately. If none resolve, a single candidate's own
    /// error is returned unchanged, while several candidates produce one
    /// error naming them all.
    pub fn resolve_first_available<'a, I, C>(&self, candidates: I) -> Result<Arc<CompiledUnit>>
    where
        I: IntoIterator<Item = C>,
        C: Into<Candidate<'a>>,
    {
        let mut names = Vec::new();
        let mut last_error = None;
        for candidate in candidates {
            match candidate.into() {
                Candidate::Unit(unit) => return Ok(unit),
                Candidate::Name(name) => {
                    names.push(name);
                    match self.resolve_unit(name, None) {
                        Ok(unit) => return Ok(unit),
                        Err(err) if err.is_loader_error() => last_error = Some(err),
                        Err(err) => return Err(err),
                    }
                }
            }
        }

        match (names.len(), last_error) {
            (1, Some(err)) => Err(err),
            _ => {
                let quoted: Vec<String> = names.iter().map(|n| format!("\"{}\"", n)).collect();
                Err(Error::loader(format!(
                    "Unable to find one of the following templates: {}.",
                    quoted.join(", ")
                )))
            }
        }
    }

    /// Compiles a template from a string, bypassing the loader.
    ///
    /// The template is named after a digest of its source and is never
    /// written to the persisted cache.
    pub fn create_template(&self, source: &str) -> Result<Arc<CompiledUnit>> {
        let name = format!("{}{}", STRING_TEMPLATE_PREFIX, sha256_hex(source));
        write(&self.string_templates)
            .entry(name.clone())
            .or_insert_with(|| source.to_string());
        self.resolve_unit(&name, None)
    }

    /// Whether the template and every extension are unchanged since `since`.
    pub fn is_fresh(&self, name: &str, since: SystemTime) -> Result<bool> {
        let extension_changed = self
            .registry
            .extensions()
            .any(|ext| ext.last_modified().is_some_and(|modified| modified > since));
        if extension_changed {
            return Ok(false);
        }
        if self.is_string_template(name) {
            return Ok(true);
        }
        self.loader()?.is_fresh(name, since)
    }

    /// Drops the in-memory map of loaded units.
    pub fn clear_compiled_units(&self) {
        write(&self.units).clear();
    }

    /// Deletes persisted unit files. Returns how many were removed.
    pub fn clear_persisted_cache(&self) -> usize {
        self.cache.as_ref().map_or(0, UnitCache::clear)
    }

    // ---- pipeline ----

    pub fn tokenize(&self, source: &str, name: &str) -> Result<TokenStream> {
        self.lexer().tokenize(self, source, name)
    }

    pub fn parse(&self, stream: TokenStream) -> Result<ModuleNode> {
        self.parser().parse(self, stream)
    }

    /// Emits unit source for a parsed module.
    pub fn compile(&self, module: &ModuleNode) -> Result<String> {
        let mut compiler = Compiler::new(self);
        compiler.compile(module, 0)?;
        Ok(compiler.into_source())
    }

    /// Runs tokenize, parse and emit over `source`.
    ///
    /// Template errors are annotated with `name`. Failures from foreign code
    /// (I/O, custom collaborators) become syntax errors with an unknown line.
    pub fn compile_source(&self, source: &str, name: &str) -> Result<String> {
        let compiled = self
            .tokenize(source, name)
            .and_then(|stream| self.parse(stream))
            .and_then(|module| self.compile(&module));

        match compiled {
            Ok(code) => {
                tracing::debug!(template = name, bytes = code.len(), "compiled template");
                Ok(code)
            }
            Err(err @ (Error::Io(_) | Error::Other(_))) => Err(Error::syntax(
                format!(
                    "An exception has been thrown during the compilation of a template (\"{}\").",
                    err
                ),
                None,
            )
            .with_template_name(name)),
            Err(err) => Err(err.with_template_name(name)),
        }
    }

    fn compile_template(&self, name: &str) -> Result<String> {
        let source = self.template_source(name)?;
        self.compile_source(&source, name)
    }

    fn template_source(&self, name: &str) -> Result<String> {
        if let Some(source) = read(&self.string_templates).get(name) {
            return Ok(source.clone());
        }
        self.loader()?.source(name)
    }

    fn cache_key(&self, name: &str) -> Result<String> {
        if self.is_string_template(name) {
            return Ok(name.to_string());
        }
        self.loader()?.cache_key(name)
    }

    fn is_string_template(&self, name: &str) -> bool {
        read(&self.string_templates).contains_key(name)
    }

    // ---- extensions ----

    pub fn add_extension(&mut self, extension: impl Extension + 'static) -> Result<()> {
        self.registry.add_extension(Box::new(extension))
    }

    /// Removes an extension before the registry freezes.
    pub fn remove_extension(&mut self, name: &str) -> Result<Option<Box<dyn Extension>>> {
        self.registry.remove_extension(name)
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.registry.has_extension(name)
    }

    pub fn extension(&self, name: &str) -> Result<&dyn Extension> {
        self.registry
            .extension(name)
            .ok_or_else(|| Error::runtime(format!("The \"{}\" extension is not enabled.", name)))
    }

    pub fn extensions(&self) -> impl Iterator<Item = &dyn Extension> {
        self.registry.extensions()
    }

    pub fn add_filter(&mut self, filter: Filter) -> Result<()> {
        self.registry.add_filter(filter)
    }

    pub fn add_function(&mut self, function: Function) -> Result<()> {
        self.registry.add_function(function)
    }

    pub fn add_test(&mut self, test: Test) -> Result<()> {
        self.registry.add_test(test)
    }

    pub fn add_token_parser(&mut self, parser: impl TokenParser + 'static) -> Result<()> {
        self.registry.add_token_parser(Arc::new(parser))
    }

    pub fn add_node_visitor(&mut self, visitor: impl NodeVisitor + 'static) -> Result<()> {
        self.registry.add_node_visitor(Arc::new(visitor))
    }

    /// Adds a resolver consulted when no registered filter matches a name.
    pub fn register_undefined_filter_callback<F>(&mut self, callback: F) -> Result<()>
    where
        F: Fn(&str) -> Option<Filter> + Send + Sync + 'static,
    {
        self.registry
            .register_undefined_filter_callback(Box::new(callback))
    }

    /// Adds a resolver consulted when no registered function matches a name.
    pub fn register_undefined_function_callback<F>(&mut self, callback: F) -> Result<()>
    where
        F: Fn(&str) -> Option<Function> + Send + Sync + 'static,
    {
        self.registry
            .register_undefined_function_callback(Box::new(callback))
    }

    /// Resolves a filter: exact name, then wildcards, then callbacks.
    pub fn filter(&self, name: &str) -> Result<Option<Filter>> {
        self.registry.filter(name)
    }

    pub fn function(&self, name: &str) -> Result<Option<Function>> {
        self.registry.function(name)
    }

    pub fn test(&self, name: &str) -> Result<Option<Test>> {
        self.registry.test(name)
    }

    pub fn tags(&self) -> Result<&IndexMap<String, Arc<dyn TokenParser>>> {
        Ok(&self.registry.vocabulary()?.token_parsers)
    }

    pub fn node_visitors(&self) -> Result<&[Arc<dyn NodeVisitor>]> {
        Ok(&self.registry.vocabulary()?.node_visitors)
    }

    pub fn unary_operators(&self) -> Result<&IndexMap<String, UnaryOperator>> {
        Ok(&self.registry.vocabulary()?.unary_operators)
    }

    pub fn binary_operators(&self) -> Result<&IndexMap<String, BinaryOperator>> {
        Ok(&self.registry.vocabulary()?.binary_operators)
    }

    pub(crate) fn vocabulary(&self) -> Result<&Vocabulary> {
        self.registry.vocabulary()
    }

    // ---- globals and runtime ----

    /// Adds a global variable.
    ///
    /// Before the registry freezes the global is staged. Afterwards only the
    /// materialized globals are updated; introducing a name that no extension
    /// declared logs a warning.
    pub fn add_global(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let name = name.into();
        let value = value.into();
        if !self.registry.is_frozen() {
            return self.registry.stage_global(name, value);
        }
        if self.globals.get().is_none() {
            let collected = self.registry.collect_globals()?;
            self.globals = OnceCell::with_value(collected);
        }
        if let Some(globals) = self.globals.get_mut() {
            if !globals.contains_key(&name) {
                tracing::warn!(
                    global = %name,
                    "new global added after extensions were initialized"
                );
            }
            globals.insert(name, value);
        }
        Ok(())
    }

    /// All globals, later extensions overriding earlier ones.
    ///
    /// Once the registry is frozen the merged map is cached.
    pub fn globals(&self) -> Result<Cow<'_, IndexMap<String, Value>>> {
        if self.registry.is_frozen() {
            let globals = self
                .globals
                .get_or_try_init(|| self.registry.collect_globals())?;
            return Ok(Cow::Borrowed(globals));
        }
        Ok(Cow::Owned(self.registry.collect_globals()?))
    }

    /// Fills in globals missing from `context`. Context values win.
    pub fn merge_globals(&self, mut context: Map<String, Value>) -> Result<Map<String, Value>> {
        for (name, value) in self.globals()?.iter() {
            if !context.contains_key(name) {
                context.insert(name.clone(), value.clone());
            }
        }
        Ok(context)
    }

    /// Freezes the registry and runs every extension's `init_runtime`, once.
    ///
    /// Extensions must not resolve units from their `init_runtime`.
    pub fn init_runtime(&self) -> Result<()> {
        self.runtime_initialized.get_or_try_init(|| {
            self.registry.vocabulary()?;
            for extension in self.registry.extensions() {
                extension.init_runtime(self)?;
            }
            tracing::debug!("initialized extension runtime");
            Ok::<(), Error>(())
        })?;
        Ok(())
    }

    /// Whether the extension registry is frozen.
    pub fn is_initialized(&self) -> bool {
        self.registry.is_frozen()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extensions: Vec<&str> = self.registry.extensions().map(|ext| ext.name()).collect();
        f.debug_struct("Environment")
            .field("charset", &self.charset)
            .field("debug", &self.debug)
            .field("auto_reload", &self.is_auto_reload())
            .field("strict_variables", &self.strict_variables)
            .field("autoescape", &self.autoescape)
            .field("cache", &self.cache())
            .field("extensions", &extensions)
            .field("frozen", &self.registry.is_frozen())
            .finish_non_exhaustive()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ArrayLoader;
    use serde_json::json;

    struct Globals(Value);

    impl Extension for Globals {
        fn name(&self) -> &str {
            "globals"
        }

        fn globals(&self) -> Value {
            self.0.clone()
        }
    }

    #[test]
    fn test_charset_is_uppercased() {
        let options = EnvironmentOptions {
            charset: "iso-8859-1".into(),
            ..Default::default()
        };
        let mut env = Environment::with_options(ArrayLoader::new(), options);
        assert_eq!(env.charset(), "ISO-8859-1");
        env.set_charset("utf-8");
        assert_eq!(env.charset(), "UTF-8");
    }

    #[test]
    fn test_auto_reload_mirrors_debug_until_set() {
        let mut env = Environment::new(ArrayLoader::new());
        assert!(!env.is_auto_reload());
        env.enable_debug();
        assert!(env.is_auto_reload());
        env.disable_auto_reload();
        assert!(!env.is_auto_reload());
    }

    #[test]
    fn test_missing_loader_is_logic_error() {
        let env = Environment::from_options(EnvironmentOptions::default());
        let err = env.resolve_unit("a.tsl", None).unwrap_err();
        assert!(matches!(err, Error::Logic(ref msg) if msg == "You must set a loader first."));
    }

    #[test]
    fn test_builtin_extensions() {
        let env = Environment::new(ArrayLoader::new());
        assert!(env.has_extension("core"));
        assert!(env.has_extension("escaper"));
        assert!(env.has_extension("optimizer"));

        let options = EnvironmentOptions {
            optimizations: OPTIMIZE_NONE,
            ..Default::default()
        };
        let env = Environment::with_options(ArrayLoader::new(), options);
        assert!(!env.has_extension("optimizer"));
        assert!(env.extension("optimizer").is_err());
    }

    #[test]
    fn test_globals_before_and_after_freeze() {
        let mut env = Environment::new(ArrayLoader::new());
        env.add_extension(Globals(json!({"site": "docs", "year": 2024})))
            .unwrap();
        env.add_global("site", "override").unwrap();
        assert_eq!(env.globals().unwrap()["site"], "override");

        env.init_runtime().unwrap();
        assert!(env.is_initialized());
        env.add_global("year", 2025).unwrap();
        env.add_global("brand_new", true).unwrap();
        let globals = env.globals().unwrap();
        assert_eq!(globals["year"], 2025);
        assert_eq!(globals["brand_new"], true);
    }

    #[test]
    fn test_merge_globals_context_wins() {
        let mut env = Environment::new(ArrayLoader::new());
        env.add_global("user", "global").unwrap();
        env.add_global("site", "docs").unwrap();
        let mut context = Map::new();
        context.insert("user".into(), json!("local"));
        let merged = env.merge_globals(context).unwrap();
        assert_eq!(merged["user"], "local");
        assert_eq!(merged["site"], "docs");
    }

    #[test]
    fn test_create_template_without_loader() {
        let env = Environment::from_options(EnvironmentOptions::default());
        let unit = env.create_template("Hi {{ name }}").unwrap();
        assert!(unit.template_name().starts_with(STRING_TEMPLATE_PREFIX));
        assert_eq!(unit.origin(), &UnitOrigin::Memory);
        let again = env.create_template("Hi {{ name }}").unwrap();
        assert!(Arc::ptr_eq(&unit, &again));
    }

    #[test]
    fn test_unknown_extension_lookup() {
        let env = Environment::new(ArrayLoader::new());
        let err = env.extension("nope").err().unwrap();
        assert!(matches!(err, Error::Runtime(_)));
    }
}
