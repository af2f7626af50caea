//! Template loaders.
//!
//! A [`Loader`] maps a template name to its source, a stable cache key and a
//! freshness answer. The cache key feeds the content-addressed unit name, so
//! it must change whenever the template's identity or content does.
//!
//! | Loader | Source | Cache key | Fresh when |
//! |--------|--------|-----------|------------|
//! | [`ArrayLoader`] | in-memory map | `name:source` | always |
//! | [`FilesystemLoader`] | files under one or more roots | canonical path | file mtime ≤ since |
//! | [`ChainLoader`] | first loader that knows the name | delegated | delegated |

mod array;
mod chain;
mod filesystem;

use std::time::SystemTime;

use crate::error::Result;

pub use array::ArrayLoader;
pub use chain::ChainLoader;
pub use filesystem::FilesystemLoader;

/// Resolves template names to source.
///
/// Unknown names fail with [`Error::Loader`](crate::Error::Loader).
pub trait Loader: Send + Sync {
    /// The template source.
    fn source(&self, name: &str) -> Result<String>;

    /// A stable key identifying the template's identity and content.
    fn cache_key(&self, name: &str) -> Result<String>;

    /// Whether the template is unchanged since `since`.
    fn is_fresh(&self, name: &str, since: SystemTime) -> Result<bool>;

    /// Whether the loader knows `name`.
    fn exists(&self, name: &str) -> bool {
        self.cache_key(name).is_ok()
    }
}
