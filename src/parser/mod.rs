//! The preprocessor.
//!
//! A [`Parser`] turns a root style sheet into one [`Compilation`]: imports
//! are resolved and spliced in place, sprite and image functions are
//! rewritten into plain values, and custom function calls are normalized
//! against their signatures. Every output line keeps a record of the file
//! and line it came from.
//!
//! # Usage
//!
//! ```ignore
//! use wt::parser::{Parser, ParserOptions};
//!
//! let parser = Parser::new(ParserOptions::default());
//! let compilation = parser.parse_file(Path::new("sass/app.scss"))?;
//! println!("{}", compilation.output());
//! println!("line 3 is {}", compilation.describe_line(3));
//! ```

mod compilation;
mod session;
pub mod custom;
pub mod linemap;
pub mod scanner;
pub mod span;
pub mod variables;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::discovery::{absolutize, normalize_newlines, SourceLoader};
use crate::error::Result;
use crate::sprite::{Expander, ImagePacker, SpriteCache, SpriteConfig, SpritePacker};

pub use compilation::{Compilation, SourceFile};
pub use custom::{CustomFunctions, Signature};
pub use linemap::{FileId, LineMap, LineMapError, Origin};
pub use scanner::{scan, Directive, DirectiveKind};
pub use span::{Location, Span};

use session::Session;

/// Settings shared by every compilation a parser runs.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Directories searched for imports after the importer's own directory.
    pub include_paths: Vec<PathBuf>,
    pub custom_functions: CustomFunctions,
    pub sprites: SpriteConfig,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            include_paths: vec![],
            custom_functions: CustomFunctions::new(),
            sprites: SpriteConfig {
                image_dir: PathBuf::from("."),
                gen_dir: PathBuf::from("."),
                build_dir: PathBuf::from("."),
                spacing: 0,
            },
        }
    }
}

impl ParserOptions {
    /// Make every configured directory absolute.
    fn absolutized(mut self) -> Self {
        self.include_paths = self.include_paths.iter().map(|p| absolutize(p)).collect();
        self.sprites.image_dir = absolutize(&self.sprites.image_dir);
        self.sprites.gen_dir = absolutize(&self.sprites.gen_dir);
        self.sprites.build_dir = absolutize(&self.sprites.build_dir);
        self
    }
}

/// Preprocessor entry point.
///
/// A parser can be shared between threads; each call runs an independent
/// compilation that only shares the sprite cache.
pub struct Parser {
    options: ParserOptions,
    cache: Arc<SpriteCache>,
    packer: Arc<dyn SpritePacker>,
}

impl Parser {
    /// Create a parser with its own sprite cache and the PNG packer.
    pub fn new(options: ParserOptions) -> Self {
        Self::with_cache(options, Arc::new(SpriteCache::new()), Arc::new(ImagePacker::new()))
    }

    pub fn with_cache(options: ParserOptions, cache: Arc<SpriteCache>, packer: Arc<dyn SpritePacker>) -> Self {
        Self {
            options: options.absolutized(),
            cache,
            packer,
        }
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn cache(&self) -> &Arc<SpriteCache> {
        &self.cache
    }

    /// Preprocess the style sheet at `path`.
    pub fn parse_file(&self, path: &Path) -> Result<Compilation> {
        let path = absolutize(path);
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let loader = self.loader(&dir);
        let (path, text) = loader.load(&path)?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or(dir);

        self.session(loader).run(path, text, &dir)
    }

    /// Preprocess text that did not come from a file, such as stdin.
    ///
    /// Imports are resolved against the working directory.
    pub fn parse_source(&self, name: &str, text: &str) -> Result<Compilation> {
        let dir = absolutize(Path::new("."));
        let loader = self.loader(&dir);
        self.session(loader)
            .run(PathBuf::from(name), normalize_newlines(text.to_string()), &dir)
    }

    fn loader(&self, root_dir: &Path) -> SourceLoader {
        SourceLoader::new(self.options.include_paths.iter().map(PathBuf::as_path).chain([root_dir]))
    }

    fn session(&self, loader: SourceLoader) -> Session<'_> {
        let expander = Expander::new(&self.options.sprites, &self.cache, self.packer.as_ref());
        Session::new(&self.options, loader, expander)
    }
}
