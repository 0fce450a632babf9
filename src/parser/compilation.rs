//! The result of preprocessing one root file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Result, WtError};

use super::linemap::{FileId, LineMap, LineMapError, Origin};

/// A file read during a compilation.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: FileId,
    /// Canonical path, or the name given for stdin input.
    pub path: PathBuf,
    pub text: Arc<str>,
    /// The file that imported this one.
    pub parent: Option<FileId>,
}

/// Preprocessed output plus the provenance of every output line.
#[derive(Debug, Clone)]
pub struct Compilation {
    map: LineMap,
    files: Vec<SourceFile>,
}

#[derive(Serialize)]
struct LineMapExport<'a> {
    files: Vec<String>,
    lines: &'a [Origin],
}

impl Compilation {
    pub(crate) fn new(map: LineMap, files: Vec<SourceFile>) -> Self {
        Self { map, files }
    }

    /// The buffer to hand to the style-sheet compiler.
    pub fn output(&self) -> &str {
        self.map.buffer()
    }

    pub fn into_output(self) -> String {
        self.map.into_parts().0
    }

    pub fn line_map(&self) -> &LineMap {
        &self.map
    }

    /// Every file read, the root first.
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn file(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.0 as usize)
    }

    pub fn root(&self) -> Option<&SourceFile> {
        self.files.first()
    }

    /// Origin of a 1-indexed output line.
    pub fn lookup(&self, output_line: usize) -> std::result::Result<Origin, LineMapError> {
        self.map.lookup(output_line)
    }

    /// File path and line a 1-indexed output line came from.
    pub fn lookup_file(&self, output_line: usize) -> Option<(&Path, u32)> {
        let origin = self.map.lookup(output_line).ok()?;
        let file = self.file(origin.file)?;
        Some((file.path.as_path(), origin.line))
    }

    /// `path:line` for an output line, or `unknown` when out of range.
    pub fn describe_line(&self, output_line: usize) -> String {
        match self.lookup_file(output_line) {
            Some((path, line)) => format!("{}:{}", path.display(), line),
            None => "unknown".to_string(),
        }
    }

    /// Import chain leading to `id`, root first.
    pub fn import_chain(&self, id: FileId) -> Vec<&Path> {
        let mut chain = Vec::new();
        let mut current = self.file(id);
        while let Some(file) = current {
            chain.push(file.path.as_path());
            current = file.parent.and_then(|parent| self.file(parent));
        }
        chain.reverse();
        chain
    }

    /// The line map as JSON: the file table and one `{file, line}` entry per
    /// output line.
    pub fn line_map_json(&self) -> Result<String> {
        let export = LineMapExport {
            files: self
                .files
                .iter()
                .map(|f| f.path.display().to_string())
                .collect(),
            lines: self.map.entries(),
        };
        serde_json::to_string_pretty(&export).map_err(|e| WtError::Io {
            path: PathBuf::from("line map"),
            message: e.to_string(),
        })
    }
}
