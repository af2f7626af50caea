//! Persisted unit cache.
//!
//! Compiled units are written below a cache root using a 2/2/rest fan-out of
//! the unit hash, which bounds the number of entries per directory:
//!
//! ```text
//! <root>/<hash[0:2]>/<hash[2:4]>/<hash[4:]>.unit
//! ```
//!
//! Units declared inside another template (embedding index set) live in the
//! same file as the template's top-level unit.
//!
//! # Atomic Writes
//!
//! Writes go to a temporary file in the destination directory which is then
//! renamed over the destination. If the rename fails the temporary file is
//! copied into place and removed. Readers therefore see either the previous
//! complete file or the new complete file. There is no cross-process locking:
//! concurrent writers of the same unit race, and the last rename wins.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::unit::UnitName;

/// File extension of persisted units.
pub const CACHE_FILE_EXTENSION: &str = "unit";

/// On-disk store of compiled units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitCache {
    root: PathBuf,
}

impl UnitCache {
    /// Creates a cache rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file a unit is persisted to.
    pub fn path_for(&self, name: &UnitName) -> PathBuf {
        let hash = name.hash();
        self.root
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(format!("{}.{}", &hash[4..], CACHE_FILE_EXTENSION))
    }

    /// Modification time of a cache file, or `None` if it does not exist.
    pub fn modified(&self, path: &Path) -> Option<SystemTime> {
        fs::metadata(path)
            .ok()
            .filter(|meta| meta.is_file())
            .and_then(|meta| meta.modified().ok())
    }

    /// Reads a persisted unit.
    pub fn read(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .map_err(|e| Error::cache_io(path, "failed to read cache file", Some(e)))
    }

    /// Atomically writes `content` to `path`.
    pub fn write(&self, path: &Path, content: &str) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| Error::cache_io(path, "cache file has no parent directory", None))?;

        if !dir.is_dir() {
            if let Err(e) = fs::create_dir_all(dir) {
                // Another process may have created it in the meantime.
                if !dir.is_dir() {
                    return Err(Error::cache_io(
                        dir,
                        "unable to create the cache directory",
                        Some(e),
                    ));
                }
            }
        }

        let prefix = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .tempfile_in(dir)
            .map_err(|e| Error::cache_io(dir, "unable to write in the cache directory", Some(e)))?;
        tmp.write_all(content.as_bytes())
            .and_then(|_| tmp.flush())
            .map_err(|e| Error::cache_io(tmp.path(), "failed to write cache file", Some(e)))?;

        if let Err(persist) = tmp.persist(path) {
            let tmp = persist.file;
            fs::copy(tmp.path(), path)
                .map_err(|e| Error::cache_io(path, "failed to write cache file", Some(e)))?;
            // Dropping the handle removes the temporary file.
            drop(tmp);
        }

        set_permissive_mode(path);
        tracing::debug!(path = %path.display(), bytes = content.len(), "wrote cache file");
        Ok(())
    }

    /// Deletes every persisted unit below the root, leaves first.
    ///
    /// Individual failures are logged and skipped. Returns the number of unit
    /// files removed.
    pub fn clear(&self) -> usize {
        if !self.root.is_dir() {
            return 0;
        }
        let mut removed = 0;
        clear_dir(&self.root, &mut removed);
        removed
    }
}

fn clear_dir(dir: &Path, removed: &mut usize) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "unable to list cache directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            clear_dir(&path, removed);
            // Only empty fan-out directories go; anything else stays.
            if let Err(e) = fs::remove_dir(&path) {
                tracing::debug!(dir = %path.display(), error = %e, "kept cache directory");
            }
        } else if is_interrupted_write(&path) {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "unable to delete temporary cache file");
            }
        } else if path.extension().is_some_and(|ext| ext == CACHE_FILE_EXTENSION) {
            match fs::remove_file(&path) {
                Ok(()) => *removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unable to delete cache file")
                }
            }
        }
    }
}

/// A temporary file left by a write that never reached `persist`.
///
/// [`UnitCache::write`] names them after the target file plus a random
/// suffix, e.g. `<hash>.unitAb3xYz`.
fn is_interrupted_write(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| ext.strip_prefix(CACHE_FILE_EXTENSION))
        .is_some_and(|suffix| !suffix.is_empty())
}

#[cfg(unix)]
fn set_permissive_mode(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o644));
}

#[cfg(not(unix))]
fn set_permissive_mode(_path: &Path) {}
