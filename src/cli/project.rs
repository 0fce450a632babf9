//! Options shared by the commands that preprocess style sheets.

use std::path::{Path, PathBuf};

use clap::Args;

use crate::discovery::{load_manifest, Manifest};
use crate::error::Result;
use crate::parser::{CustomFunctions, ParserOptions};
use crate::sprite::SpriteConfig;

#[derive(Args, Debug, Default, Clone)]
pub struct ProjectArgs {
    /// Add a directory to the import search path (repeatable)
    #[arg(long = "includes", short = 'p', value_name = "DIR")]
    pub include_paths: Vec<PathBuf>,

    /// Directory images and sprite globs are relative to
    #[arg(long = "dir", short = 'd', value_name = "DIR")]
    pub image_dir: Option<PathBuf>,

    /// Directory generated sprite sheets are written to
    #[arg(long = "gen", value_name = "DIR")]
    pub gen_dir: Option<PathBuf>,

    /// Directory compiled CSS is written to; stdout when absent
    #[arg(long = "build", short = 'b', value_name = "DIR")]
    pub build_dir: Option<PathBuf>,

    /// Spacing between packed sprite images, in pixels
    #[arg(long)]
    pub spacing: Option<u32>,

    /// Register a custom function signature, e.g. 'foo($a, $b: 1px)'
    #[arg(long = "function", value_name = "SIGNATURE")]
    pub functions: Vec<String>,

    /// Manifest to read instead of wt.yaml in the project directory
    #[arg(long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,
}

impl ProjectArgs {
    /// Load the manifest for `project_dir` and merge these flags over it.
    pub fn resolve(&self, project_dir: &Path) -> Result<(ParserOptions, Manifest)> {
        let manifest = match &self.manifest {
            Some(path) => Manifest::load(path)?,
            None => match load_manifest(project_dir)? {
                (manifest, true) => manifest,
                _ => load_manifest(Path::new("."))?.0,
            },
        };
        let options = self.merge(&manifest)?;
        Ok((options, manifest))
    }

    /// Flags win over manifest values; include paths from both are searched,
    /// flags first.
    pub fn merge(&self, manifest: &Manifest) -> Result<ParserOptions> {
        let mut include_paths = self.include_paths.clone();
        include_paths.extend(manifest.include_paths.iter().cloned());

        let mut signatures = manifest.custom_functions.clone();
        signatures.extend(self.functions.iter().cloned());
        let custom_functions = CustomFunctions::from_signatures(&signatures)?;

        let image_dir = pick(&self.image_dir, &manifest.image_dir).unwrap_or_else(|| PathBuf::from("."));
        let build_dir = pick(&self.build_dir, &manifest.build_dir);
        // Sheets default to the CSS output directory so their URLs stay short.
        let gen_dir = pick(&self.gen_dir, &manifest.gen_dir)
            .or_else(|| build_dir.clone())
            .unwrap_or_else(|| image_dir.clone());

        Ok(ParserOptions {
            include_paths,
            custom_functions,
            sprites: SpriteConfig {
                image_dir,
                gen_dir,
                build_dir: build_dir.unwrap_or_else(|| PathBuf::from(".")),
                spacing: self.spacing.or(manifest.spacing).unwrap_or(0),
            },
        })
    }

    /// CSS output directory, if any.
    pub fn build_dir(&self, manifest: &Manifest) -> Option<PathBuf> {
        pick(&self.build_dir, &manifest.build_dir)
    }
}

fn pick(flag: &Option<PathBuf>, manifest: &Option<PathBuf>) -> Option<PathBuf> {
    flag.clone().or_else(|| manifest.clone())
}
