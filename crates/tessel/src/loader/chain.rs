use std::time::SystemTime;

use super::Loader;
use crate::error::{Error, Result};

/// Delegates to several loaders, in order.
///
/// The first loader that knows a name answers for it. Loader errors from the
/// others are collected into a single not-found message.
#[derive(Default)]
pub struct ChainLoader {
    loaders: Vec<Box<dyn Loader>>,
}

impl ChainLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.add_loader(loader);
        self
    }

    pub fn add_loader(&mut self, loader: impl Loader + 'static) {
        self.loaders.push(Box::new(loader));
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    fn first<T>(&self, name: &str, op: impl Fn(&dyn Loader) -> Result<T>) -> Result<T> {
        let mut messages = Vec::new();
        for loader in &self.loaders {
            match op(loader.as_ref()) {
                Err(err) if err.is_loader_error() => messages.push(err.to_string()),
                other => return other,
            }
        }
        Err(Error::loader(format!(
            "Template \"{}\" is not defined ({}).",
            name,
            messages.join(", ")
        )))
    }
}

impl Loader for ChainLoader {
    fn source(&self, name: &str) -> Result<String> {
        self.first(name, |loader| loader.source(name))
    }

    fn cache_key(&self, name: &str) -> Result<String> {
        self.first(name, |loader| loader.cache_key(name))
    }

    fn is_fresh(&self, name: &str, since: SystemTime) -> Result<bool> {
        self.first(name, |loader| loader.is_fresh(name, since))
    }

    fn exists(&self, name: &str) -> bool {
        self.loaders.iter().any(|loader| loader.exists(name))
    }
}
