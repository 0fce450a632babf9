//! Line-map assembler.
//!
//! Builds the output buffer and, alongside it, one provenance entry per
//! output line naming the file and line the text came from. Entries are
//! append-only; an imported file is assembled into its own `LineMap` first
//! and then spliced into its parent as one unit, keeping its entries as-is.

use serde::Serialize;
use thiserror::Error;

/// Index of a source file within one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FileId(pub u32);

/// Where an output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Origin {
    pub file: FileId,
    /// 1-indexed line within `file`.
    pub line: u32,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMapError {
    #[error("output line {line} is out of range (buffer has {len} lines)")]
    OutOfRange { line: usize, len: usize },
}

/// Output buffer plus per-line provenance.
#[derive(Debug, Clone, Default)]
pub struct LineMap {
    buffer: String,
    entries: Vec<Origin>,
    /// The last output line has no terminating newline yet.
    open: bool,
}

impl LineMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append source text starting at `start_line` of `file`.
    ///
    /// Each output line this text starts maps to the source line it starts on.
    pub fn append(&mut self, text: &str, file: FileId, start_line: u32) {
        let mut line = start_line;
        for piece in text.split_inclusive('\n') {
            self.push_piece(piece, Origin { file, line });
            if piece.ends_with('\n') {
                line += 1;
            }
        }
    }

    /// Append generated text; every line it starts maps to `line` of `file`.
    pub fn append_generated(&mut self, text: &str, file: FileId, line: u32) {
        for piece in text.split_inclusive('\n') {
            self.push_piece(piece, Origin { file, line });
        }
    }

    /// Splice a fully assembled child map in as one unit.
    ///
    /// The child starts on a fresh line and the line after it is fresh too,
    /// so its entries carry over unchanged.
    pub fn splice(&mut self, child: LineMap) {
        if child.buffer.is_empty() {
            return;
        }
        self.close_line();
        self.buffer.push_str(&child.buffer);
        self.entries.extend(child.entries);
        self.open = child.open;
        self.close_line();
    }

    fn push_piece(&mut self, piece: &str, origin: Origin) {
        if piece.is_empty() {
            return;
        }
        if !self.open {
            self.entries.push(origin);
        }
        self.buffer.push_str(piece);
        self.open = !piece.ends_with('\n');
    }

    fn close_line(&mut self) {
        if self.open {
            self.buffer.push('\n');
            self.open = false;
        }
    }

    /// Origin of a 1-indexed output line.
    pub fn lookup(&self, output_line: usize) -> Result<Origin, LineMapError> {
        output_line
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .copied()
            .ok_or(LineMapError::OutOfRange {
                line: output_line,
                len: self.entries.len(),
            })
    }

    /// Number of output lines.
    pub fn line_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn entries(&self) -> &[Origin] {
        &self.entries
    }

    pub fn into_parts(self) -> (String, Vec<Origin>) {
        (self.buffer, self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: FileId = FileId(0);
    const B: FileId = FileId(1);

    fn physical_lines(map: &LineMap) -> usize {
        let buffer = map.buffer();
        let newlines = buffer.matches('\n').count();
        if buffer.is_empty() || buffer.ends_with('\n') {
            newlines
        } else {
            newlines + 1
        }
    }

    #[test]
    fn test_append_maps_each_line() {
        let mut map = LineMap::new();
        map.append("a\nb\nc", A, 1);

        assert_eq!(map.line_count(), 3);
        assert_eq!(map.lookup(1), Ok(Origin { file: A, line: 1 }));
        assert_eq!(map.lookup(3), Ok(Origin { file: A, line: 3 }));
    }

    #[test]
    fn test_fragments_continue_open_line() {
        let mut map = LineMap::new();
        map.append("a { b: ", A, 1);
        map.append_generated("10px", A, 1);
        map.append("; }\nc {}\n", A, 1);

        assert_eq!(map.buffer(), "a { b: 10px; }\nc {}\n");
        assert_eq!(map.line_count(), 2);
        assert_eq!(map.lookup(2), Ok(Origin { file: A, line: 2 }));
    }

    #[test]
    fn test_generated_lines_share_directive_line() {
        let mut map = LineMap::new();
        map.append("a {\n  ", A, 1);
        map.append_generated("width: 4px;\n  height: 8px", A, 2);
        map.append(";\n}\n", A, 2);

        assert_eq!(map.line_count(), 4);
        assert_eq!(map.lookup(2), Ok(Origin { file: A, line: 2 }));
        assert_eq!(map.lookup(3), Ok(Origin { file: A, line: 2 }));
        assert_eq!(map.lookup(4), Ok(Origin { file: A, line: 3 }));
    }

    #[test]
    fn test_splice_keeps_child_entries() {
        let mut child = LineMap::new();
        child.append("span { color: blue; }", B, 1);

        let mut parent = LineMap::new();
        parent.splice(child);
        parent.append("div { color: red; }\n", A, 2);

        assert_eq!(parent.buffer(), "span { color: blue; }\ndiv { color: red; }\n");
        assert_eq!(parent.lookup(1), Ok(Origin { file: B, line: 1 }));
        assert_eq!(parent.lookup(2), Ok(Origin { file: A, line: 2 }));
    }

    #[test]
    fn test_splice_closes_open_parent_line() {
        let mut child = LineMap::new();
        child.append("x {}\n", B, 1);

        let mut parent = LineMap::new();
        parent.append("a {} ", A, 1);
        parent.splice(child);
        parent.append("b {}", A, 1);

        assert_eq!(parent.buffer(), "a {} \nx {}\nb {}");
        assert_eq!(parent.line_count(), physical_lines(&parent));
        assert_eq!(parent.lookup(3), Ok(Origin { file: A, line: 1 }));
    }

    #[test]
    fn test_splice_empty_child_is_noop() {
        let mut parent = LineMap::new();
        parent.append("a", A, 1);
        parent.splice(LineMap::new());
        parent.append("b", A, 1);
        assert_eq!(parent.buffer(), "ab");
        assert_eq!(parent.line_count(), 1);
    }

    #[test]
    fn test_one_entry_per_line() {
        let mut child = LineMap::new();
        child.append("1\n2\n", B, 1);
        let mut map = LineMap::new();
        map.append("x\n", A, 1);
        map.splice(child);
        map.append_generated("g\ng", A, 2);
        map.append("\nend", A, 3);

        assert_eq!(map.line_count(), physical_lines(&map));
    }

    #[test]
    fn test_lookup_out_of_range() {
        let mut map = LineMap::new();
        map.append("a\n", A, 1);
        assert_eq!(
            map.lookup(0),
            Err(LineMapError::OutOfRange { line: 0, len: 1 })
        );
        assert_eq!(
            map.lookup(2),
            Err(LineMapError::OutOfRange { line: 2, len: 1 })
        );
    }
}
