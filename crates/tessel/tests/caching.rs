use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tessel::{
    ArrayLoader, Environment, EnvironmentOptions, Error, Extension, FilesystemLoader, UnitOrigin,
};

fn cached_options(cache: &Path, auto_reload: bool) -> EnvironmentOptions {
    EnvironmentOptions {
        cache: Some(cache.to_path_buf()),
        auto_reload: Some(auto_reload),
        ..Default::default()
    }
}

fn unit_files(root: &Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap().flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found
}

fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

#[test]
fn test_resolve_writes_one_cache_file() {
    let cache = tempfile::tempdir().unwrap();
    let loader = ArrayLoader::new().with_template("index.tsl", "Hello {{ name }}");
    let env = Environment::with_options(loader, cached_options(cache.path(), false));

    let unit = env.resolve_unit("index.tsl", None).unwrap();
    let files = unit_files(cache.path());
    assert_eq!(files.len(), 1);
    assert_eq!(unit.cache_path(), Some(files[0].as_path()));
    assert!(files[0].extension().is_some_and(|ext| ext == "unit"));

    let hash = unit.name().hash();
    let relative = files[0].strip_prefix(cache.path()).unwrap();
    assert_eq!(
        relative,
        Path::new(&hash[0..2])
            .join(&hash[2..4])
            .join(format!("{}.unit", &hash[4..]))
    );
}

#[test]
fn test_resolving_twice_returns_same_unit() {
    let cache = tempfile::tempdir().unwrap();
    let loader = ArrayLoader::new().with_template("index.tsl", "Hello");
    let env = Environment::with_options(loader, cached_options(cache.path(), false));

    let first = env.resolve_unit("index.tsl", None).unwrap();
    let second = env.resolve_unit("index.tsl", None).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_existing_cache_file_is_not_rewritten() {
    let cache = tempfile::tempdir().unwrap();
    let loader = ArrayLoader::new().with_template("index.tsl", "Hello");
    let env = Environment::with_options(loader.clone(), cached_options(cache.path(), true));
    let unit = env.resolve_unit("index.tsl", None).unwrap();
    let path = unit.cache_path().unwrap().to_path_buf();

    let past = SystemTime::now() - Duration::from_secs(3600);
    set_mtime(&path, past);

    let other = Environment::with_options(loader, cached_options(cache.path(), true));
    let reloaded = other.resolve_unit("index.tsl", None).unwrap();
    assert_eq!(reloaded.source(), unit.source());
    assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), past);
}

#[test]
fn test_loaded_units_ignore_cache_changes() {
    let cache = tempfile::tempdir().unwrap();
    let loader = ArrayLoader::new().with_template("index.tsl", "Hello");
    let env = Environment::with_options(loader, cached_options(cache.path(), true));

    let unit = env.resolve_unit("index.tsl", None).unwrap();
    fs::write(unit.cache_path().unwrap(), "tampered").unwrap();

    let again = env.resolve_unit("index.tsl", None).unwrap();
    assert!(Arc::ptr_eq(&unit, &again));

    // Once dropped from memory, the tampered file is what gets loaded.
    env.clear_compiled_units();
    let err = env.resolve_unit("index.tsl", None).unwrap_err();
    assert!(matches!(err, Error::Runtime(_)));
}

#[test]
fn test_stale_template_recompiled_with_auto_reload() {
    let templates = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let template = templates.path().join("page.tsl");
    fs::write(&template, "first version").unwrap();
    set_mtime(&template, SystemTime::now() - Duration::from_secs(3600));

    let env = Environment::with_options(
        FilesystemLoader::new(templates.path()),
        cached_options(cache.path(), true),
    );
    let unit = env.resolve_unit("page.tsl", None).unwrap();
    assert!(unit.source().contains("first version"));

    fs::write(&template, "second version").unwrap();
    set_mtime(&template, SystemTime::now() + Duration::from_secs(3600));
    env.clear_compiled_units();

    let unit = env.resolve_unit("page.tsl", None).unwrap();
    assert!(unit.source().contains("second version"));
}

#[test]
fn test_stale_template_kept_without_auto_reload() {
    let templates = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    let template = templates.path().join("page.tsl");
    fs::write(&template, "first version").unwrap();

    let env = Environment::with_options(
        FilesystemLoader::new(templates.path()),
        cached_options(cache.path(), false),
    );
    env.resolve_unit("page.tsl", None).unwrap();

    fs::write(&template, "second version").unwrap();
    set_mtime(&template, SystemTime::now() + Duration::from_secs(3600));
    env.clear_compiled_units();

    let unit = env.resolve_unit("page.tsl", None).unwrap();
    assert!(unit.source().contains("first version"));
}

struct Touched;

impl Extension for Touched {
    fn name(&self) -> &str {
        "touched"
    }

    fn last_modified(&self) -> Option<SystemTime> {
        Some(SystemTime::now() + Duration::from_secs(3600))
    }
}

#[test]
fn test_newer_extension_invalidates_cache() {
    let cache = tempfile::tempdir().unwrap();
    let loader = ArrayLoader::new().with_template("index.tsl", "Hello");

    let env = Environment::with_options(loader.clone(), cached_options(cache.path(), true));
    let unit = env.resolve_unit("index.tsl", None).unwrap();
    fs::write(unit.cache_path().unwrap(), "tampered").unwrap();

    let mut touched = Environment::with_options(loader, cached_options(cache.path(), true));
    touched.add_extension(Touched).unwrap();
    let recompiled = touched.resolve_unit("index.tsl", None).unwrap();
    assert_eq!(recompiled.source(), unit.source());
}

#[test]
fn test_string_templates_are_never_persisted() {
    let cache = tempfile::tempdir().unwrap();
    let env = Environment::with_options(ArrayLoader::new(), cached_options(cache.path(), false));

    let unit = env.create_template("Inline {{ x }}").unwrap();
    assert_eq!(unit.origin(), &UnitOrigin::Memory);
    assert!(unit_files(cache.path()).is_empty());
}

#[test]
fn test_clear_persisted_cache() {
    let cache = tempfile::tempdir().unwrap();
    let loader = ArrayLoader::new()
        .with_template("a.tsl", "A")
        .with_template("b.tsl", "B");
    let env = Environment::with_options(loader, cached_options(cache.path(), false));
    env.resolve_unit("a.tsl", None).unwrap();
    env.resolve_unit("b.tsl", None).unwrap();

    assert_eq!(env.clear_persisted_cache(), 2);
    assert!(unit_files(cache.path()).is_empty());
}

#[test]
fn test_unwritable_cache_fails() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "a file, not a directory").unwrap();

    let loader = ArrayLoader::new().with_template("index.tsl", "Hello");
    let env = Environment::with_options(loader, cached_options(&blocker, false));
    let err = env.resolve_unit("index.tsl", None).unwrap_err();
    assert!(matches!(err, Error::CacheIo { .. }));
}
