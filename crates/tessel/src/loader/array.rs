use std::time::SystemTime;

use indexmap::IndexMap;

use super::Loader;
use crate::error::{Error, Result};

/// Loads templates from an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct ArrayLoader {
    templates: IndexMap<String, String>,
}

impl ArrayLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a template, builder style.
    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.set_template(name, source);
        self
    }

    /// Adds or replaces a template.
    pub fn set_template(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    fn get(&self, name: &str) -> Result<&str> {
        self.templates
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::loader(format!("Template \"{}\" is not defined.", name)))
    }
}

impl<N, S> FromIterator<(N, S)> for ArrayLoader
where
    N: Into<String>,
    S: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, S)>>(iter: I) -> Self {
        Self {
            templates: iter
                .into_iter()
                .map(|(name, source)| (name.into(), source.into()))
                .collect(),
        }
    }
}

impl Loader for ArrayLoader {
    fn source(&self, name: &str) -> Result<String> {
        self.get(name).map(str::to_string)
    }

    fn cache_key(&self, name: &str) -> Result<String> {
        Ok(format!("{}:{}", name, self.get(name)?))
    }

    fn is_fresh(&self, name: &str, _since: SystemTime) -> Result<bool> {
        self.get(name).map(|_| true)
    }

    fn exists(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}
