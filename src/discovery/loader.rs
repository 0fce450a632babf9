//! Source loader.
//!
//! Reads style-sheet files, refusing anything outside the permitted
//! directories.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::FileError;

/// Reads source files from a fixed set of permitted directories.
#[derive(Debug, Clone, Default)]
pub struct SourceLoader {
    permitted: Vec<PathBuf>,
}

impl SourceLoader {
    /// Permit files under each of `dirs`. Directories that do not exist are
    /// ignored.
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut permitted = Vec::new();
        for dir in dirs {
            if let Ok(dir) = fs::canonicalize(dir.as_ref()) {
                if !permitted.contains(&dir) {
                    permitted.push(dir);
                }
            }
        }
        Self { permitted }
    }

    pub fn permitted(&self) -> &[PathBuf] {
        &self.permitted
    }

    /// Whether a canonical path lies inside a permitted directory.
    pub fn permits(&self, path: &Path) -> bool {
        self.permitted.iter().any(|dir| path.starts_with(dir))
    }

    /// Read `path` as UTF-8 text with `\n` line endings.
    ///
    /// Returns the canonical path alongside the text.
    pub fn load(&self, path: &Path) -> Result<(PathBuf, String), FileError> {
        let canonical = fs::canonicalize(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FileError::NotFound {
                path: path.to_path_buf(),
            },
            _ => FileError::ReadFailure {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })?;

        if !self.permits(&canonical) {
            return Err(FileError::NotPermitted { path: canonical });
        }

        let text = fs::read_to_string(&canonical).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FileError::NotFound {
                path: canonical.clone(),
            },
            ErrorKind::InvalidData => FileError::ReadFailure {
                path: canonical.clone(),
                message: "file is not valid UTF-8".to_string(),
            },
            _ => FileError::ReadFailure {
                path: canonical.clone(),
                message: e.to_string(),
            },
        })?;

        tracing::trace!(path = %canonical.display(), bytes = text.len(), "loaded source");
        Ok((canonical, normalize_newlines(text)))
    }
}

/// Convert `\r\n` line endings to `\n`.
pub fn normalize_newlines(text: String) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n")
    } else {
        text
    }
}
