//! Preprocess command: print the assembled buffer without compiling it.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::Args;

use crate::error::{Result, WtError};
use crate::output::{display_path, plural, Printer};
use crate::parser::{Compilation, Parser};

use super::ProjectArgs;

/// Print the preprocessed buffer or its line map
#[derive(Args, Debug)]
pub struct PreprocessArgs {
    /// Style sheet to preprocess; reads stdin when omitted or `-`
    pub file: Option<PathBuf>,

    /// Print the line map as JSON instead of the buffer
    #[arg(long)]
    pub map: bool,

    /// Print the source location of an output line and exit
    #[arg(long, value_name = "LINE")]
    pub lookup: Option<usize>,

    #[command(flatten)]
    pub project: ProjectArgs,
}

pub fn run(args: PreprocessArgs, printer: &Printer) -> Result<()> {
    let file = args.file.as_ref().filter(|f| f.as_os_str() != "-");
    let project_dir = file
        .and_then(|f| f.parent())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let (options, _) = args.project.resolve(&project_dir)?;
    let parser = Parser::new(options);

    let compilation = match file {
        Some(path) => {
            printer.status("Preprocessing", &display_path(path));
            parser.parse_file(path)?
        }
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text).map_err(|e| WtError::Io {
                path: PathBuf::from("<stdin>"),
                message: e.to_string(),
            })?;
            parser.parse_source("<stdin>", &text)?
        }
    };

    printer.verbose(
        "Assembled",
        &format!(
            "{} from {}",
            plural(compilation.line_map().line_count(), "line", "lines"),
            plural(compilation.files().len(), "file", "files")
        ),
    );

    let out = render(&compilation, &args)?;
    io::stdout().write_all(out.as_bytes()).map_err(|e| WtError::Io {
        path: PathBuf::from("<stdout>"),
        message: e.to_string(),
    })
}

fn render(compilation: &Compilation, args: &PreprocessArgs) -> Result<String> {
    if let Some(line) = args.lookup {
        return Ok(format!("{}\n", compilation.describe_line(line)));
    }
    if args.map {
        return Ok(format!("{}\n", compilation.line_map_json()?));
    }
    Ok(compilation.output().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserOptions;
    use std::fs;
    use tempfile::tempdir;

    fn args(map: bool, lookup: Option<usize>) -> PreprocessArgs {
        PreprocessArgs {
            file: None,
            map,
            lookup,
            project: ProjectArgs::default(),
        }
    }

    #[test]
    fn test_render_modes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.scss"), "span { color: blue; }").unwrap();
        let a = dir.path().join("a.scss");
        fs::write(&a, "@import \"b\";\ndiv { color: red; }\n").unwrap();

        let compilation = Parser::new(ParserOptions::default()).parse_file(&a).unwrap();

        let buffer = render(&compilation, &args(false, None)).unwrap();
        assert_eq!(buffer, "span { color: blue; }\ndiv { color: red; }\n");

        let lookup = render(&compilation, &args(false, Some(2))).unwrap();
        assert!(lookup.trim_end().ends_with("a.scss:2"), "{}", lookup);

        let unknown = render(&compilation, &args(false, Some(9))).unwrap();
        assert_eq!(unknown, "unknown\n");

        let json: serde_json::Value =
            serde_json::from_str(&render(&compilation, &args(true, None)).unwrap()).unwrap();
        assert_eq!(json["lines"][0]["file"], 1);
        assert_eq!(json["lines"][1]["line"], 2);
    }
}
