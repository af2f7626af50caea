use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use super::Loader;
use crate::error::{Error, Result};

/// Loads templates from one or more directories.
///
/// Names are relative paths using `/`. Roots are searched in order and the
/// first one containing the name wins.
#[derive(Debug, Clone, Default)]
pub struct FilesystemLoader {
    roots: Vec<PathBuf>,
}

impl FilesystemLoader {
    /// Creates a loader searching `root`.
    ///
    /// The directory is checked lazily, on lookup.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
        }
    }

    pub fn with_roots<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    /// Appends a root, searched after the existing ones.
    pub fn add_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = checked_dir(path.as_ref())?;
        self.roots.push(path);
        Ok(())
    }

    /// Prepends a root, searched before the existing ones.
    pub fn prepend_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = checked_dir(path.as_ref())?;
        self.roots.insert(0, path);
        Ok(())
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Every template name reachable through the roots, sorted.
    ///
    /// Missing roots are skipped. A name present under several roots is
    /// listed once.
    pub fn template_names(&self) -> Result<Vec<String>> {
        let mut names = BTreeSet::new();
        for root in self.roots.iter().filter(|root| root.is_dir()) {
            walk_dir(root, root, &mut names)?;
        }
        Ok(names.into_iter().collect())
    }

    /// Resolves `name` to the canonical path of the first matching file.
    pub fn find(&self, name: &str) -> Result<PathBuf> {
        let relative = validate_name(name)?;
        for root in &self.roots {
            let candidate = root.join(&relative);
            if candidate.is_file() {
                return candidate.canonicalize().map_err(|e| {
                    Error::loader(format!("Unable to resolve template \"{}\": {}.", name, e))
                });
            }
        }
        let looked_into: Vec<String> = self
            .roots
            .iter()
            .map(|root| root.display().to_string())
            .collect();
        Err(Error::loader(format!(
            "Unable to find template \"{}\" (looked into: {}).",
            name,
            looked_into.join(", ")
        )))
    }
}

impl Loader for FilesystemLoader {
    fn source(&self, name: &str) -> Result<String> {
        let path = self.find(name)?;
        std::fs::read_to_string(&path).map_err(|e| {
            Error::loader(format!(
                "Unable to read template \"{}\" ({}): {}.",
                name,
                path.display(),
                e
            ))
        })
    }

    fn cache_key(&self, name: &str) -> Result<String> {
        Ok(self.find(name)?.to_string_lossy().into_owned())
    }

    fn is_fresh(&self, name: &str, since: SystemTime) -> Result<bool> {
        let path = self.find(name)?;
        let modified = std::fs::metadata(&path)?.modified()?;
        Ok(modified <= since)
    }

    fn exists(&self, name: &str) -> bool {
        self.find(name).is_ok()
    }
}

fn checked_dir(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        return Err(Error::loader(format!(
            "The \"{}\" directory does not exist.",
            path.display()
        )));
    }
    Ok(path.to_path_buf())
}

/// Normalizes a template name, rejecting names that escape the root.
fn validate_name(name: &str) -> Result<PathBuf> {
    if name.contains('\0') {
        return Err(Error::loader("A template name cannot contain NUL bytes."));
    }
    let normalized = name.replace('\\', "/");
    let mut depth: usize = 0;
    let mut relative = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => {
                depth += 1;
                relative.push(part);
            }
            Component::ParentDir => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    Error::loader(format!(
                        "Looks like you try to load a template outside configured directories (\"{}\").",
                        name
                    ))
                })?;
                relative.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    if depth == 0 {
        return Err(Error::loader(format!(
            "Unable to find template \"{}\" (empty name).",
            name
        )));
    }
    Ok(relative)
}

fn walk_dir(current: &Path, root: &Path, names: &mut BTreeSet<String>) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_dir(&path, root, names)?;
        } else if path.is_file() {
            if let Ok(relative) = path.strip_prefix(root) {
                names.insert(
                    relative
                        .to_string_lossy()
                        .replace(std::path::MAIN_SEPARATOR, "/"),
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_file(dir: &Path, relative_path: &str, content: &str) {
        let full_path = dir.join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full_path, content).unwrap();
    }

    #[test]
    fn test_first_root_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        create_file(first.path(), "page.tsl", "first");
        create_file(second.path(), "page.tsl", "second");
        create_file(second.path(), "only.tsl", "only");

        let loader = FilesystemLoader::with_roots([first.path(), second.path()]);
        assert_eq!(loader.source("page.tsl").unwrap(), "first");
        assert_eq!(loader.source("only.tsl").unwrap(), "only");
    }

    #[test]
    fn test_rejects_escaping_names() {
        let dir = TempDir::new().unwrap();
        create_file(dir.path(), "a/b.tsl", "x");
        let loader = FilesystemLoader::new(dir.path());

        assert!(loader.source("a/../a/b.tsl").is_ok());
        let err = loader.source("../secret.tsl").unwrap_err();
        assert!(err.is_loader_error());
        assert!(err.to_string().contains("outside configured directories"));
        assert!(loader.source("a\0b").unwrap_err().is_loader_error());
    }

    #[test]
    fn test_missing_template_lists_roots() {
        let dir = TempDir::new().unwrap();
        let loader = FilesystemLoader::new(dir.path());
        let err = loader.cache_key("nope.tsl").unwrap_err();
        assert!(err.to_string().contains("looked into"));
        assert!(!loader.exists("nope.tsl"));
    }

    #[test]
    fn test_cache_key_is_canonical_path() {
        let dir = TempDir::new().unwrap();
        create_file(dir.path(), "page.tsl", "x");
        let loader = FilesystemLoader::new(dir.path());
        let key = loader.cache_key("./page.tsl").unwrap();
        assert_eq!(key, loader.cache_key("page.tsl").unwrap());
        assert!(Path::new(&key).is_absolute());
    }

    #[test]
    fn test_freshness_compares_mtime() {
        let dir = TempDir::new().unwrap();
        create_file(dir.path(), "page.tsl", "x");
        let loader = FilesystemLoader::new(dir.path());
        let later = SystemTime::now() + std::time::Duration::from_secs(60);
        let earlier = SystemTime::UNIX_EPOCH;
        assert!(loader.is_fresh("page.tsl", later).unwrap());
        assert!(!loader.is_fresh("page.tsl", earlier).unwrap());
    }

    #[test]
    fn test_template_names_walks_nested_dirs() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        create_file(first.path(), "index.tsl", "");
        create_file(first.path(), "partials/nav.tsl", "");
        create_file(second.path(), "index.tsl", "");

        let loader = FilesystemLoader::with_roots([first.path(), second.path()]);
        assert_eq!(
            loader.template_names().unwrap(),
            ["index.tsl", "partials/nav.tsl"]
        );
    }

    #[test]
    fn test_add_path_requires_directory() {
        let mut loader = FilesystemLoader::default();
        let err = loader.add_path("/definitely/not/here").unwrap_err();
        assert!(err.is_loader_error());
    }
}
