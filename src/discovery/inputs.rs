//! Top-level input discovery for batch builds.

use std::path::{Path, PathBuf};

use globset::GlobSet;
use walkdir::WalkDir;

use super::resolver::{is_partial, DEFAULT_EXTENSION};

/// A style sheet to build.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Input {
    pub path: PathBuf,
    /// Path below the directory argument it was found in; just the file
    /// name for files named directly. Outputs mirror this layout.
    pub relative: PathBuf,
}

impl Input {
    /// `<relative dir>/<stem>.css`.
    pub fn css_path(&self) -> PathBuf {
        self.relative.with_extension("css")
    }
}

/// Collect the style sheets to build from `paths`.
///
/// Directories are walked for `.scss` files. Partials and excluded paths are
/// skipped, whether found by walking or named directly. The result is
/// sorted by path and free of duplicates.
pub fn find_inputs(paths: &[PathBuf], excludes: &GlobSet) -> Vec<Input> {
    let mut inputs = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let file = entry.path();
                if entry.file_type().is_file() && is_stylesheet(file) && is_input(file, excludes) {
                    let relative = file.strip_prefix(path).unwrap_or(file).to_path_buf();
                    inputs.push(Input {
                        path: file.to_path_buf(),
                        relative,
                    });
                }
            }
        } else if is_input(path, excludes) {
            let relative = path.file_name().map(PathBuf::from).unwrap_or_else(|| path.clone());
            inputs.push(Input {
                path: path.clone(),
                relative,
            });
        }
    }

    inputs.sort();
    inputs.dedup_by(|a, b| a.path == b.path);
    inputs
}

fn is_stylesheet(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == DEFAULT_EXTENSION)
}

fn is_input(path: &Path, excludes: &GlobSet) -> bool {
    if is_partial(path) {
        tracing::debug!(path = %path.display(), "skipping partial");
        return false;
    }
    !excludes.is_match(path)
}
