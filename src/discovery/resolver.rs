//! Import resolution.
//!
//! Maps an `@import` target to a file: the importing file's directory is
//! searched first, then each include path in order. Within a directory the
//! exact name wins over the partial (`_name`), and both win over the forms
//! with the default extension appended.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ImportError;

/// Extension appended to targets that have none.
pub const DEFAULT_EXTENSION: &str = "scss";

/// File name prefix marking a partial, a file meant only to be imported.
pub const PARTIAL_PREFIX: &str = "_";

/// Whether `path` names a partial.
pub fn is_partial(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with(PARTIAL_PREFIX))
        .unwrap_or(false)
}

/// Relative file names tried for `target`, in order.
pub fn candidates(target: &str) -> Vec<PathBuf> {
    let exact = PathBuf::from(target);
    let mut names = vec![exact.clone()];

    if let Some(name) = exact.file_name() {
        let name = name.to_string_lossy();
        if !name.starts_with(PARTIAL_PREFIX) {
            names.push(exact.with_file_name(format!("{}{}", PARTIAL_PREFIX, name)));
        }
    }

    if exact.extension().is_none() {
        let with_ext: Vec<PathBuf> = names
            .iter()
            .map(|n| {
                let mut s = n.clone().into_os_string();
                s.push(".");
                s.push(DEFAULT_EXTENSION);
                PathBuf::from(s)
            })
            .collect();
        names.extend(with_ext);
    }

    names
}

/// Resolve `target` to the canonical path of an existing file.
pub fn resolve(target: &str, current_dir: &Path, include_paths: &[PathBuf]) -> Result<PathBuf, ImportError> {
    let names = candidates(target);
    let mut searched = Vec::new();

    for dir in std::iter::once(current_dir).chain(include_paths.iter().map(PathBuf::as_path)) {
        for name in &names {
            let path = dir.join(name);
            if path.is_file() {
                let resolved = fs::canonicalize(&path).unwrap_or(path);
                tracing::debug!(target, path = %resolved.display(), "resolved import");
                return Ok(resolved);
            }
            searched.push(path);
        }
    }

    Err(ImportError::NotFound {
        target: target.to_string(),
        searched,
    })
}

/// Files currently being resolved in one compilation, outermost first.
#[derive(Debug, Default, Clone)]
pub struct ImportStack {
    paths: Vec<PathBuf>,
}

impl ImportStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `path`, failing if it is already being resolved.
    pub fn push(&mut self, path: PathBuf) -> Result<(), ImportError> {
        if let Some(start) = self.paths.iter().position(|p| *p == path) {
            let mut chain = self.paths[start..].to_vec();
            chain.push(path.clone());
            return Err(ImportError::Cyclic { path, chain });
        }
        self.paths.push(path);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<PathBuf> {
        self.paths.pop()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
