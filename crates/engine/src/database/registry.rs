//! Process-wide registry of open database paths
//!
//! Two live handles on the same file would each replay the log and then
//! append to it independently. The registry makes the second `open` fail
//! with `Busy` instead.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

// =============================================================================
// Global Database Registry
// =============================================================================
//
// Keys are absolute paths. Uses parking_lot::Mutex so a panic while the lock
// is held never poisons every later open.

/// Paths that currently have an open handle in this process
static OPEN_DATABASES: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Registry key for `path`
///
/// Canonical if the path (or its parent directory) exists, otherwise made
/// absolute against the current directory.
pub(crate) fn registry_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(parent) = parent.canonicalize() {
            return parent.join(name);
        }
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Claim `key`; false if it is already held
pub(crate) fn acquire(key: &Path) -> bool {
    OPEN_DATABASES.lock().insert(key.to_path_buf())
}

/// Release `key`
pub(crate) fn release(key: &Path) {
    OPEN_DATABASES.lock().remove(key);
}

/// True if `key` is held
pub(crate) fn is_open(key: &Path) -> bool {
    OPEN_DATABASES.lock().contains(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let key = registry_key(&dir.path().join("db"));

        assert!(acquire(&key));
        assert!(!acquire(&key));
        assert!(is_open(&key));
        release(&key);
        assert!(!is_open(&key));
        assert!(acquire(&key));
        release(&key);
    }

    #[test]
    fn existing_paths_are_canonical() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("db");
        std::fs::write(&file, b"x").unwrap();

        let dotted = dir.path().join(".").join("db");
        assert_eq!(registry_key(&dotted), registry_key(&file));
    }
}
