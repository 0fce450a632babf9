use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Failures reading a source file.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("{} is outside the permitted include directories", .path.display())]
    NotPermitted { path: PathBuf },

    #[error("failed to read {}: {message}", .path.display())]
    ReadFailure { path: PathBuf, message: String },
}

/// Failures resolving an `@import` target.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("could not find import \"{target}\"")]
    NotFound {
        target: String,
        searched: Vec<PathBuf>,
    },

    #[error("cyclic import of {}: {}", .path.display(), format_chain(.chain))]
    Cyclic { path: PathBuf, chain: Vec<PathBuf> },
}

/// Failures expanding sprite and image directives.
#[derive(Error, Debug)]
pub enum SpriteError {
    #[error("missing image: {name}")]
    MissingImage { name: String },

    #[error("failed to process {name}: {message}")]
    PackFailure { name: String, message: String },
}

/// Failures recognizing directives in source text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("malformed directive on line {line}: {message}")]
    MalformedDirective { line: u32, message: String },
}

impl ScanError {
    pub fn malformed(line: u32, message: impl Into<String>) -> Self {
        ScanError::MalformedDirective {
            line,
            message: message.into(),
        }
    }
}

/// Main error type for wt operations
#[derive(Error, Diagnostic, Debug)]
pub enum WtError {
    #[error(transparent)]
    #[diagnostic(code(wt::file), help("check the include paths (-p) and file permissions"))]
    File(#[from] FileError),

    #[error(transparent)]
    #[diagnostic(code(wt::import))]
    Import(#[from] ImportError),

    #[error(transparent)]
    #[diagnostic(code(wt::sprite), help("check the image directory (-d)"))]
    Sprite(#[from] SpriteError),

    #[error(transparent)]
    #[diagnostic(code(wt::scan))]
    Scan(#[from] ScanError),

    /// An error raised while processing a directive, with its source location.
    #[error("{location}: {source}")]
    #[diagnostic(code(wt::directive))]
    At {
        location: String,
        #[source]
        source: Box<WtError>,
    },

    #[error("IO error with {path}: {message}")]
    #[diagnostic(code(wt::io))]
    Io { path: PathBuf, message: String },

    #[error("Config error: {message}")]
    #[diagnostic(code(wt::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Compile error: {message}")]
    #[diagnostic(code(wt::compile))]
    Compile {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{failed} of {total} inputs failed to build")]
    #[diagnostic(code(wt::build))]
    BuildFailed { failed: usize, total: usize },
}

impl WtError {
    /// Attach a `path:line` location, unless one is already attached.
    pub fn at(self, location: impl fmt::Display) -> Self {
        match self {
            WtError::At { .. } => self,
            other => WtError::At {
                location: location.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with any location wrappers removed.
    pub fn root(&self) -> &WtError {
        match self {
            WtError::At { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, WtError>;

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_message_lists_chain() {
        let err = ImportError::Cyclic {
            path: PathBuf::from("/s/a.scss"),
            chain: vec![
                PathBuf::from("/s/a.scss"),
                PathBuf::from("/s/b.scss"),
                PathBuf::from("/s/a.scss"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "cyclic import of /s/a.scss: /s/a.scss -> /s/b.scss -> /s/a.scss"
        );
    }

    #[test]
    fn test_at_does_not_nest() {
        let err = WtError::from(ScanError::malformed(3, "bad"))
            .at("a.scss:3")
            .at("b.scss:1");
        assert_eq!(err.to_string(), "a.scss:3: malformed directive on line 3: bad");
        assert!(matches!(err.root(), WtError::Scan(_)));
    }
}
