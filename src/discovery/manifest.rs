//! Project manifest (wt.yaml) parsing.
//!
//! The manifest holds the project defaults that would otherwise be passed
//! on every invocation: include paths, sprite directories and registered
//! custom functions. Command-line flags override it.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WtError};

/// Project manifest loaded from wt.yaml.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Files or directories built when `wt build` is given no inputs.
    pub sources: Vec<String>,

    /// Directories searched for `@import` targets, in order.
    pub include_paths: Vec<PathBuf>,

    /// Custom function signatures, e.g. `foo($bar, $baz: 10px)`.
    pub custom_functions: Vec<String>,

    /// Directory images and sprite globs are relative to.
    pub image_dir: Option<PathBuf>,

    /// Directory generated sprite sheets are written to.
    pub gen_dir: Option<PathBuf>,

    /// Directory compiled CSS is written to.
    pub build_dir: Option<PathBuf>,

    /// Default spacing between packed sprite images, in pixels.
    pub spacing: Option<u32>,

    /// Glob patterns of inputs to skip in batch builds.
    pub excludes: Vec<String>,
}

impl Manifest {
    /// Load manifest from a wt.yaml file.
    ///
    /// Relative paths in the manifest are taken relative to its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| WtError::Io {
            path: path.to_path_buf(),
            message: format!("Failed to read manifest: {}", e),
        })?;

        let manifest = Self::parse(&content)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(manifest.relative_to(base))
    }

    /// Parse manifest from YAML string.
    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| WtError::Config {
            message: format!("Invalid manifest: {}", e),
            help: Some("Check wt.yaml syntax".to_string()),
        })
    }

    fn relative_to(mut self, base: &Path) -> Self {
        let dirs = self
            .include_paths
            .iter_mut()
            .chain(self.image_dir.as_mut())
            .chain(self.gen_dir.as_mut())
            .chain(self.build_dir.as_mut());
        for dir in dirs {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        self.sources = self
            .sources
            .into_iter()
            .map(|s| {
                if Path::new(&s).is_relative() {
                    base.join(&s).to_string_lossy().into_owned()
                } else {
                    s
                }
            })
            .collect();
        self
    }

    /// Compile the exclude patterns.
    pub fn exclude_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.excludes {
            let glob = Glob::new(pattern).map_err(|e| WtError::Config {
                message: format!("invalid exclude pattern '{}': {}", pattern, e),
                help: None,
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|e| WtError::Config {
            message: format!("failed to build exclude patterns: {}", e),
            help: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_full_manifest() {
        let yaml = r#"
sources:
  - sass/
include_paths:
  - vendor/bourbon
  - shared
custom_functions:
  - "foo($bar, $baz: 10px)"
image_dir: img
gen_dir: build/img
build_dir: build/css
spacing: 2
excludes:
  - "**/legacy/*"
"#;
        let manifest = Manifest::parse(yaml).unwrap();

        assert_eq!(manifest.sources, vec!["sass/"]);
        assert_eq!(
            manifest.include_paths,
            vec![PathBuf::from("vendor/bourbon"), PathBuf::from("shared")]
        );
        assert_eq!(manifest.custom_functions, vec!["foo($bar, $baz: 10px)"]);
        assert_eq!(manifest.image_dir, Some(PathBuf::from("img")));
        assert_eq!(manifest.spacing, Some(2));
        assert_eq!(manifest.excludes, vec!["**/legacy/*"]);
    }

    #[test]
    fn test_parse_empty_manifest() {
        let manifest = Manifest::parse("").unwrap();
        assert_eq!(manifest, Manifest::default());
    }

    #[test]
    fn test_parse_invalid_manifest() {
        let err = Manifest::parse("spacing: wide").unwrap_err();
        assert!(matches!(err, WtError::Config { .. }));
    }

    #[test]
    fn test_load_rebases_relative_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wt.yaml");
        fs::write(&path, "include_paths: [lib, /abs/lib]\nimage_dir: img\n").unwrap();

        let manifest = Manifest::load(&path).unwrap();

        assert_eq!(
            manifest.include_paths,
            vec![dir.path().join("lib"), PathBuf::from("/abs/lib")]
        );
        assert_eq!(manifest.image_dir, Some(dir.path().join("img")));
        assert_eq!(manifest.gen_dir, None);
    }

    #[test]
    fn test_exclude_set() {
        let manifest = Manifest {
            excludes: vec!["**/legacy/*".to_string()],
            ..Default::default()
        };
        let set = manifest.exclude_set().unwrap();

        assert!(set.is_match("sass/legacy/old.scss"));
        assert!(!set.is_match("sass/app.scss"));
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let manifest = Manifest {
            excludes: vec!["[".to_string()],
            ..Default::default()
        };
        assert!(manifest.exclude_set().is_err());
    }
}
