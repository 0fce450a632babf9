//! Sprite sheets and image directives.
//!
//! `sprite-map(...)` globs images from the image directory and packs them
//! into one sheet through a [`SpritePacker`]. Sheets are shared across
//! compilations through a [`SpriteCache`], and the [`Expander`] rewrites the
//! sprite and image functions into plain values that reference them.

mod cache;
mod expander;
mod sheet;

use std::path::PathBuf;

use crate::error::SpriteError;

pub use cache::{fingerprint, SpriteCache};
pub use expander::{Expander, Expansion, SpriteConfig};
pub use sheet::ImagePacker;

/// One image to be packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteSource {
    /// Name used to refer to the image, the file stem.
    pub name: String,
    pub path: PathBuf,
}

/// Options passed to the packer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackOptions {
    /// Pixels between neighbouring images.
    pub spacing: u32,
    /// Directory the sheet is written to.
    pub out_dir: PathBuf,
    /// File name of the sheet, without extension.
    pub file_stem: String,
}

/// Position of one image within a packed sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub name: String,
    pub path: PathBuf,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// A written sprite sheet and the offsets of its images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedSheet {
    pub path: PathBuf,
    pub size: (u32, u32),
    pub frames: Vec<Frame>,
}

impl PackedSheet {
    pub fn frame(&self, name: &str) -> Option<&Frame> {
        self.frames.iter().find(|f| f.name == name)
    }
}

/// Lays images out into a sheet and writes it.
///
/// Shared by concurrent compilations through the sprite cache.
pub trait SpritePacker: Send + Sync {
    fn pack(&self, images: &[SpriteSource], options: &PackOptions) -> Result<PackedSheet, SpriteError>;
}
