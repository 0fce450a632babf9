//! Build command implementation.
//!
//! Preprocesses each top-level style sheet, feeds the result to the
//! compiler and writes `<name>.css` into the build directory (or stdout),
//! keeping the input's directory below the source it was found in.
//! Inputs are compiled in parallel and share one sprite cache.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Args;
use rayon::prelude::*;

use crate::compiler::{compile, Passthrough, StyleCompiler};
use crate::discovery::{absolutize, find_inputs, Input};
use crate::error::{Result, WtError};
use crate::output::{display_path, plural, Printer};
use crate::parser::Parser;

use super::ProjectArgs;

/// Preprocess and compile style sheets to CSS
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Style sheets or directories to build; the manifest's sources when
    /// omitted
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Outcome of building one input.
#[derive(Debug)]
pub struct Built {
    pub input: PathBuf,
    /// Where the CSS was written; `None` when it went to stdout.
    pub output: Option<PathBuf>,
}

pub fn run(args: BuildArgs, printer: &Printer) -> Result<Vec<Built>> {
    let project_dir = args
        .files
        .first()
        .map(|f| if f.is_dir() { f.clone() } else { f.parent().map(Path::to_path_buf).unwrap_or_default() })
        .unwrap_or_else(|| PathBuf::from("."));
    let (options, manifest) = args.project.resolve(&project_dir)?;

    let sources: Vec<PathBuf> = if args.files.is_empty() {
        manifest.sources.iter().map(PathBuf::from).collect()
    } else {
        args.files.clone()
    };
    if sources.is_empty() {
        return Err(WtError::Config {
            message: "no input files".to_string(),
            help: Some("Pass style sheets to build, or list them under `sources` in wt.yaml".to_string()),
        });
    }

    let inputs = find_inputs(&sources, &manifest.exclude_set()?);
    if inputs.is_empty() {
        printer.warning("Warning", "no style sheets to build (partials are skipped)");
        return Ok(vec![]);
    }
    let build_dir = args.project.build_dir(&manifest).map(|d| absolutize(&d));
    if let Some(dir) = &build_dir {
        fs::create_dir_all(dir).map_err(|e| WtError::Io {
            path: dir.clone(),
            message: format!("Failed to create build directory: {}", e),
        })?;
    }

    printer.verbose("Inputs", &plural(inputs.len(), "file", "files"));
    let parser = Parser::new(options);
    build_all(&parser, &Passthrough, &inputs, build_dir.as_deref(), printer)
}

/// Build every input, reporting each failure and carrying on with the rest.
///
/// With a build directory, each input's CSS lands at its path relative to
/// the source it was found in, so same-named sheets in different
/// directories do not collide.
pub fn build_all(
    parser: &Parser,
    compiler: &dyn StyleCompiler,
    inputs: &[Input],
    build_dir: Option<&Path>,
    printer: &Printer,
) -> Result<Vec<Built>> {
    let results: Vec<Result<String>> = inputs
        .par_iter()
        .map(|input| {
            let compilation = parser.parse_file(&input.path)?;
            compile(&compilation, compiler)
        })
        .collect();

    let mut built = Vec::new();
    let mut failed = 0;

    for (input, result) in inputs.iter().zip(results) {
        let display = display_path(&absolutize(&input.path));
        let written = result.and_then(|css| write_output(input, &css, build_dir));
        let output = match written {
            Ok(output) => output,
            Err(e) => {
                failed += 1;
                printer.error("Error", &format!("encountered in {}", display));
                eprintln!("{:?}", miette::Report::new(e));
                continue;
            }
        };

        match &output {
            Some(path) => printer.status("Compiled", &format!("{} -> {}", display, printer.cyan(&display_path(path)))),
            None => printer.status("Compiled", &display),
        }
        built.push(Built {
            input: input.path.clone(),
            output,
        });
    }

    if failed > 0 {
        return Err(WtError::BuildFailed {
            failed,
            total: inputs.len(),
        });
    }

    printer.info(
        "Finished",
        &format!(
            "{} {}",
            plural(built.len(), "style sheet", "style sheets"),
            printer.dim(&format!("({} cached)", plural(parser.cache().len(), "sprite sheet", "sprite sheets")))
        ),
    );
    Ok(built)
}

/// Write one input's CSS below `build_dir`, or to stdout without one.
fn write_output(input: &Input, css: &str, build_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let Some(dir) = build_dir else {
        io::stdout().lock().write_all(css.as_bytes()).map_err(|e| WtError::Io {
            path: PathBuf::from("<stdout>"),
            message: e.to_string(),
        })?;
        return Ok(None);
    };

    let path = dir.join(input.css_path());
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| WtError::Io {
            path: parent.to_path_buf(),
            message: format!("Failed to create output directory: {}", e),
        })?;
    }
    fs::write(&path, css).map_err(|e| WtError::Io {
        path: path.clone(),
        message: format!("Failed to write CSS: {}", e),
    })?;
    Ok(Some(path))
}
