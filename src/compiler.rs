//! Downstream style-sheet compiler interface.
//!
//! The preprocessor hands its assembled buffer to a [`StyleCompiler`]. When
//! the compiler reports an error on a buffer line, [`compile`] translates
//! that line back to the file and line the user wrote.

use thiserror::Error;

use crate::error::{Result, WtError};
use crate::parser::Compilation;

/// An error reported by a style-sheet compiler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CompileError {
    /// 1-indexed line of the preprocessed buffer, when known.
    pub line: Option<usize>,
    pub message: String,
}

impl CompileError {
    pub fn new(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }

    pub fn line(&self) -> Option<usize> {
        self.line
    }
}

/// A style-sheet compiler the preprocessed buffer is fed to.
pub trait StyleCompiler: Send + Sync {
    fn compile(&self, source: &str) -> std::result::Result<String, CompileError>;
}

/// Emits the buffer unchanged after checking that blocks are balanced.
///
/// Stands in for a real engine so the pipeline can run end to end.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl StyleCompiler for Passthrough {
    fn compile(&self, source: &str) -> std::result::Result<String, CompileError> {
        let mut open: Vec<usize> = Vec::new();
        let mut line = 1;
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\n' => line += 1,
                '"' | '\'' => {
                    for s in chars.by_ref() {
                        if s == c {
                            break;
                        }
                        if s == '\n' {
                            return Err(CompileError::new(Some(line), "unterminated string"));
                        }
                    }
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    let start = line;
                    let mut prev = ' ';
                    let mut closed = false;
                    for s in chars.by_ref() {
                        if s == '\n' {
                            line += 1;
                        }
                        if prev == '*' && s == '/' {
                            closed = true;
                            break;
                        }
                        prev = s;
                    }
                    if !closed {
                        return Err(CompileError::new(Some(start), "unterminated comment"));
                    }
                }
                '/' if chars.peek() == Some(&'/') => {
                    for s in chars.by_ref() {
                        if s == '\n' {
                            line += 1;
                            break;
                        }
                    }
                }
                '{' => open.push(line),
                '}' => {
                    if open.pop().is_none() {
                        return Err(CompileError::new(Some(line), "unexpected '}'"));
                    }
                }
                _ => {}
            }
        }

        match open.last() {
            Some(&unclosed) => Err(CompileError::new(Some(unclosed), "unclosed block")),
            None => Ok(source.to_string()),
        }
    }
}

/// Compile a preprocessed buffer, attributing errors to their source file.
pub fn compile(compilation: &Compilation, compiler: &dyn StyleCompiler) -> Result<String> {
    compiler.compile(compilation.output()).map_err(|e| {
        let location = match e.line() {
            Some(line) => compilation.describe_line(line),
            None => "unknown".to_string(),
        };
        tracing::debug!(buffer_line = ?e.line(), %location, "compile error");
        WtError::Compile {
            message: format!("{}: {}", location, e.message),
            help: Some(format!("error at {}", location)),
        }
    })
}
