//! Compiled units and their content-addressed names.
//!
//! A *unit* is the emitted, loadable form of one template. Its name is a pure
//! function of the loader's cache key and the embedding index:
//!
//! ```text
//! __TesselUnit_<sha256(cache_key)>[_<index>]
//! ```
//!
//! Wall-clock time never enters the name, so recompiling an unchanged template
//! produces the same unit name and hits the cache.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::util::sha256_hex;

/// Prefix shared by every unit name.
pub const UNIT_NAME_PREFIX: &str = "__TesselUnit_";

/// Content-addressed identity of a compiled unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitName {
    hash: String,
    index: Option<usize>,
}

impl UnitName {
    /// Derives the unit name for a loader cache key and optional embedding index.
    pub fn new(cache_key: &str, index: Option<usize>) -> Self {
        Self {
            hash: sha256_hex(cache_key),
            index,
        }
    }

    /// The hex digest portion of the name.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// The embedding index, for units declared inside another template.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// The name of the top-level unit this one is declared in.
    pub fn base(&self) -> UnitName {
        Self {
            hash: self.hash.clone(),
            index: None,
        }
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", UNIT_NAME_PREFIX, self.hash)?;
        if let Some(index) = self.index {
            write!(f, "_{}", index)?;
        }
        Ok(())
    }
}

/// Where a loaded unit's source came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOrigin {
    /// Compiled in memory because caching is disabled (or for string templates).
    Memory,
    /// Read from the persisted unit cache.
    Cache(PathBuf),
}

/// A compiled template unit, loaded into the running process.
///
/// Units are shared as `Arc<CompiledUnit>`; the environment hands out the same
/// instance for every request of the same unit name until its in-memory unit
/// map is cleared.
#[derive(Debug)]
pub struct CompiledUnit {
    name: UnitName,
    template_name: String,
    source: Arc<str>,
    origin: UnitOrigin,
}

impl CompiledUnit {
    /// Loads the unit `name` out of emitted source.
    ///
    /// Fails with a runtime error if the source does not declare the unit,
    /// e.g. when an embedding index is requested that the template never
    /// produced.
    pub(crate) fn load(
        name: UnitName,
        template_name: impl Into<String>,
        source: Arc<str>,
        origin: UnitOrigin,
    ) -> Result<Self> {
        let template_name = template_name.into();
        let declaration = unit_declaration(&name);
        if !source
            .lines()
            .any(|line| line.trim_start().starts_with(&declaration))
        {
            return Err(Error::runtime(format!(
                "Unit \"{}\" is not declared in the compiled source.",
                name
            ))
            .with_template_name(template_name));
        }
        Ok(Self {
            name,
            template_name,
            source,
            origin,
        })
    }

    /// The unit's content-addressed name.
    pub fn name(&self) -> &UnitName {
        &self.name
    }

    /// The template this unit was compiled from.
    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    /// The full emitted source the unit was loaded from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Where the source came from.
    pub fn origin(&self) -> &UnitOrigin {
        &self.origin
    }

    /// The cache path, if the unit was loaded from the persisted cache.
    pub fn cache_path(&self) -> Option<&Path> {
        match &self.origin {
            UnitOrigin::Cache(path) => Some(path),
            UnitOrigin::Memory => None,
        }
    }
}

/// The line prefix the emitter writes to declare `name`.
pub(crate) fn unit_declaration(name: &UnitName) -> String {
    format!("unit {} ", name)
}
