//! wt - style-sheet preprocessor with sprite support
//!
//! Resolves `@import` directives across include paths, rewrites sprite and
//! image functions into plain CSS values backed by packed sprite sheets, and
//! emits one buffer for a downstream style-sheet compiler. Every output line
//! maps back to the file and line it came from, so compiler errors point at
//! the source the user wrote.

pub mod cli;
pub mod compiler;
pub mod discovery;
pub mod error;
pub mod output;
pub mod parser;
pub mod sprite;

pub use compiler::{compile, CompileError, Passthrough, StyleCompiler};
pub use discovery::{resolve, ImportStack, Manifest, SourceLoader};
pub use error::{FileError, ImportError, Result, ScanError, SpriteError, WtError};
pub use parser::{Compilation, CustomFunctions, FileId, LineMap, Origin, Parser, ParserOptions, SourceFile};
pub use sprite::{ImagePacker, PackOptions, PackedSheet, SpriteCache, SpriteConfig, SpritePacker, SpriteSource};
