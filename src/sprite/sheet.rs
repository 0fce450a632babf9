//! Sprite sheet packer.
//!
//! Packs images into a single PNG sheet using shelf packing.

use std::fs;

use image::{imageops, RgbaImage};

use crate::error::SpriteError;

use super::{Frame, PackOptions, PackedSheet, SpritePacker, SpriteSource};

/// Shelf (row-based) packer writing PNG sheets with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImagePacker;

impl ImagePacker {
    pub fn new() -> Self {
        Self
    }
}

impl SpritePacker for ImagePacker {
    fn pack(&self, images: &[SpriteSource], options: &PackOptions) -> Result<PackedSheet, SpriteError> {
        let mut decoded = Vec::with_capacity(images.len());
        for source in images {
            if !source.path.is_file() {
                return Err(SpriteError::MissingImage {
                    name: source.path.display().to_string(),
                });
            }
            let img = image::open(&source.path).map_err(|e| SpriteError::PackFailure {
                name: source.name.clone(),
                message: e.to_string(),
            })?;
            decoded.push(img.to_rgba8());
        }

        let sizes: Vec<(u32, u32)> = decoded.iter().map(|img| img.dimensions()).collect();
        let (placements, width, height) = layout(&sizes, options.spacing);

        let mut sheet = RgbaImage::new(width.max(1), height.max(1));
        for (img, &(x, y)) in decoded.iter().zip(&placements) {
            imageops::replace(&mut sheet, img, i64::from(x), i64::from(y));
        }

        fs::create_dir_all(&options.out_dir).map_err(|e| SpriteError::PackFailure {
            name: options.file_stem.clone(),
            message: format!("failed to create {}: {}", options.out_dir.display(), e),
        })?;
        let path = options.out_dir.join(format!("{}.png", options.file_stem));
        sheet.save(&path).map_err(|e| SpriteError::PackFailure {
            name: options.file_stem.clone(),
            message: format!("failed to write {}: {}", path.display(), e),
        })?;

        let frames = images
            .iter()
            .zip(&placements)
            .zip(&sizes)
            .map(|((source, &(x, y)), &(w, h))| Frame {
                name: source.name.clone(),
                path: source.path.clone(),
                x,
                y,
                w,
                h,
            })
            .collect();

        Ok(PackedSheet {
            path,
            size: (width, height),
            frames,
        })
    }
}

/// Place images on shelves, tallest first.
///
/// Returns the position of each image (in input order) and the sheet size.
fn layout(sizes: &[(u32, u32)], spacing: u32) -> (Vec<(u32, u32)>, u32, u32) {
    if sizes.is_empty() {
        return (vec![], 0, 0);
    }

    // Stable sort keeps input order among equal heights
    let mut indices: Vec<usize> = (0..sizes.len()).collect();
    indices.sort_by(|&a, &b| sizes[b].1.cmp(&sizes[a].1).then_with(|| a.cmp(&b)));

    let max_w = sizes.iter().map(|&(w, _)| w).max().unwrap_or(1);
    let total_area: u64 = sizes
        .iter()
        .map(|&(w, h)| u64::from(w + spacing) * u64::from(h + spacing))
        .sum();
    let sqrt_area = (total_area as f64).sqrt().ceil() as u32;
    let sheet_width = next_power_of_two(max_w.max(sqrt_area));

    let mut placements = vec![(0, 0); sizes.len()];
    let mut cursor_x = 0;
    let mut cursor_y = 0;
    let mut row_height = 0;
    let mut used_width = 0;

    for &idx in &indices {
        let (w, h) = sizes[idx];

        if cursor_x + w > sheet_width && cursor_x > 0 {
            cursor_y += row_height + spacing;
            cursor_x = 0;
            row_height = 0;
        }

        placements[idx] = (cursor_x, cursor_y);
        used_width = used_width.max(cursor_x + w);
        row_height = row_height.max(h);
        cursor_x += w + spacing;
    }

    (placements, used_width, cursor_y + row_height)
}

/// Find the smallest power of two >= n.
fn next_power_of_two(n: u32) -> u32 {
    if n == 0 {
        return 1;
    }
    n.next_power_of_two()
}
