//! Finding and reading style-sheet sources.
//!
//! This module covers everything that touches the filesystem on the way
//! in: the `wt.yaml` manifest, the permission-checked source loader,
//! `@import` resolution with cycle detection, and discovery of top-level
//! inputs for batch builds.
//!
//! # Example
//!
//! ```ignore
//! use wt::discovery::{resolve, ImportStack};
//!
//! let path = resolve("mixins", Path::new("sass"), &include_paths)?;
//! let mut stack = ImportStack::new();
//! stack.push(path)?;
//! ```

mod inputs;
mod loader;
mod manifest;
mod resolver;

use std::path::{Path, PathBuf};

use crate::error::Result;

pub use inputs::{find_inputs, Input};
pub use loader::{normalize_newlines, SourceLoader};
pub use manifest::Manifest;
pub use resolver::{candidates, is_partial, resolve, ImportStack, DEFAULT_EXTENSION, PARTIAL_PREFIX};

/// The name of the manifest file.
pub const MANIFEST_FILENAME: &str = "wt.yaml";

/// Find the manifest for a project rooted at `dir`, if there is one.
pub fn find_manifest(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(MANIFEST_FILENAME);
    path.is_file().then_some(path)
}

/// Load the manifest in `dir`, or the defaults if there is none.
///
/// Returns whether a manifest was found.
pub fn load_manifest(dir: &Path) -> Result<(Manifest, bool)> {
    match find_manifest(dir) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading manifest");
            Ok((Manifest::load(&path)?, true))
        }
        None => Ok((Manifest::default(), false)),
    }
}

/// Make `path` absolute against the working directory, without touching
/// the filesystem otherwise.
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_manifest_missing() {
        let dir = tempdir().unwrap();
        let (manifest, found) = load_manifest(dir.path()).unwrap();

        assert!(!found);
        assert_eq!(manifest, Manifest::default());
    }

    #[test]
    fn test_load_manifest_present() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("wt.yaml"), "spacing: 4\n").unwrap();

        let (manifest, found) = load_manifest(dir.path()).unwrap();
        assert!(found);
        assert_eq!(manifest.spacing, Some(4));
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(absolutize(Path::new("/x/y")), PathBuf::from("/x/y"));
        assert!(absolutize(Path::new("rel")).is_absolute());
    }
}
