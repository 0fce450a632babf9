//! Block-scoped variable table.
//!
//! Tracks the variables the preprocessor needs to resolve directive
//! arguments: plain values (so `image-url($logo)` works) and sprite maps
//! bound by `$name: sprite-map(...)`.
//!
//! Scoping rules:
//! - a plain assignment writes the innermost open block, shadowing outer
//!   definitions of the same name;
//! - `!global` writes the root scope;
//! - `!default` assigns only when no visible definition exists;
//! - an imported file's top level is the block the `@import` sits in.

use std::collections::HashMap;
use std::sync::Arc;

use crate::sprite::PackedSheet;

use super::linemap::FileId;
use super::scanner::AssignFlags;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Source text of the assigned value, after directive expansion.
    Raw(String),
    SpriteMap(Arc<PackedSheet>),
}

#[derive(Debug, Default)]
struct Frame {
    /// Block this frame belongs to; `None` for the root scope.
    block: Option<(FileId, u32)>,
    vars: HashMap<String, Value>,
}

/// Variables visible at the current point of a compilation.
#[derive(Debug)]
pub struct VariableTable {
    frames: Vec<Frame>,
}

impl Default for VariableTable {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableTable {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }

    /// Index of the innermost open scope; a file parsed from here uses it
    /// as its base.
    pub fn innermost(&self) -> usize {
        self.frames.len() - 1
    }

    /// Make the open scopes match `blocks` (outermost first) of `file`,
    /// nested under scope `base`.
    pub fn sync(&mut self, base: usize, file: FileId, blocks: &[u32]) {
        let mut keep = base + 1;
        for &block in blocks {
            match self.frames.get(keep) {
                Some(frame) if frame.block == Some((file, block)) => keep += 1,
                _ => break,
            }
        }
        self.frames.truncate(keep);

        let opened = keep - (base + 1);
        for &block in &blocks[opened..] {
            self.frames.push(Frame {
                block: Some((file, block)),
                vars: HashMap::new(),
            });
        }
    }

    pub fn assign(&mut self, name: &str, value: Value, flags: AssignFlags) {
        if flags.default && self.get(name).is_some() {
            return;
        }
        let frame = if flags.global {
            &mut self.frames[0]
        } else {
            let innermost = self.innermost();
            &mut self.frames[innermost]
        };
        frame.vars.insert(name.to_string(), value);
    }

    /// Innermost visible definition of `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.vars.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const F: FileId = FileId(0);
    const G: FileId = FileId(1);

    fn raw(s: &str) -> Value {
        Value::Raw(s.to_string())
    }

    fn plain() -> AssignFlags {
        AssignFlags::default()
    }

    #[test]
    fn test_last_write_wins_in_scope() {
        let mut vars = VariableTable::new();
        vars.assign("hex", raw("#00FF00"), plain());
        vars.assign("hex", raw("#00DD00"), plain());
        assert_eq!(vars.get("hex"), Some(&raw("#00DD00")));
    }

    #[test]
    fn test_nested_assignment_shadows() {
        let mut vars = VariableTable::new();
        vars.assign("hex", raw("#00FF00"), plain());

        vars.sync(0, F, &[0]);
        vars.assign("hex", raw("#00DD00"), plain());
        assert_eq!(vars.get("hex"), Some(&raw("#00DD00")));

        vars.sync(0, F, &[]);
        assert_eq!(vars.get("hex"), Some(&raw("#00FF00")));
    }

    #[test]
    fn test_sibling_blocks_do_not_share() {
        let mut vars = VariableTable::new();
        vars.sync(0, F, &[0]);
        vars.assign("x", raw("1"), plain());
        vars.sync(0, F, &[1]);
        assert_eq!(vars.get("x"), None);
    }

    #[test]
    fn test_global_and_default_flags() {
        let mut vars = VariableTable::new();
        vars.sync(0, F, &[0, 1]);
        vars.assign(
            "g",
            raw("1"),
            AssignFlags {
                global: true,
                ..plain()
            },
        );
        let default = AssignFlags {
            default: true,
            ..plain()
        };
        vars.assign("g", raw("2"), default);
        vars.assign("d", raw("3"), default);

        vars.sync(0, F, &[]);
        assert_eq!(vars.get("g"), Some(&raw("1")));
        assert_eq!(vars.get("d"), None);
    }

    #[test]
    fn test_imported_file_nests_under_base() {
        let mut vars = VariableTable::new();
        vars.sync(0, F, &[0]);
        let base = vars.innermost();

        vars.sync(base, G, &[0]);
        assert_eq!(vars.innermost(), 2);
        vars.sync(base, G, &[]);
        vars.assign("from_import", raw("yes"), plain());

        // Back in the importer, still inside the same block.
        vars.sync(0, F, &[0]);
        assert_eq!(vars.get("from_import"), Some(&raw("yes")));
    }
}
