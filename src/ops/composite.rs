// ============================================================================
// TEXTURE COMPOSITOR: tile a reference material into the selected region
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::{PixelGrid, SelectionMask, SELECTED};
use crate::error::VisError;
use crate::io::{encode_jpeg, DEFAULT_JPEG_QUALITY};
use crate::ops::transform::{downscale_to_fit, resample_bilinear, Interpolation};

/// Smallest tile side, in pixels.
pub const MIN_TILE_SIZE: u32 = 300;

/// Default cap on either side of the uploaded composite.
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;

/// Square texture sample repeated across the selection. Read-only once built.
#[derive(Clone, Debug)]
pub struct TextureTile {
    pixels: RgbaImage,
}

impl TextureTile {
    /// Resample `texture` into a `size` × `size` square.
    pub fn from_texture(texture: &PixelGrid, size: u32) -> Result<Self, VisError> {
        if texture.width() == 0 || texture.height() == 0 {
            return Err(VisError::InvalidState("reference texture is empty".into()));
        }
        Ok(Self {
            pixels: resample_bilinear(texture, size, size),
        })
    }

    /// Tile side for a base image of the given size.
    pub fn size_for(width: u32, height: u32) -> u32 {
        MIN_TILE_SIZE.max(width.min(height) / 3)
    }

    pub fn size(&self) -> u32 {
        self.pixels.width()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// Composited image ready for upload.
#[derive(Clone, Debug)]
pub struct CompositeImage {
    pub pixels: PixelGrid,
    /// JPEG encoding of `pixels`.
    pub encoded: Vec<u8>,
    /// True when the composite was downscaled to fit the size cap.
    pub downscaled: bool,
}

impl CompositeImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

/// Composite options. Defaults: 1024 px cap, JPEG quality 92, bilinear downscale.
#[derive(Clone, Copy, Debug)]
pub struct CompositeOptions {
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    pub downscale_filter: Interpolation,
}

impl Default for CompositeOptions {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            downscale_filter: Interpolation::Bilinear,
        }
    }
}

/// Replace selected pixels of `original` with the tiled `texture`, bound the
/// result to `max_dimension` and encode it.
pub fn composite(
    original: &PixelGrid,
    mask: &SelectionMask,
    texture: &PixelGrid,
    max_dimension: u32,
) -> Result<CompositeImage, VisError> {
    composite_with(
        original,
        mask,
        texture,
        CompositeOptions {
            max_dimension,
            ..CompositeOptions::default()
        },
    )
}

pub fn composite_with(
    original: &PixelGrid,
    mask: &SelectionMask,
    texture: &PixelGrid,
    options: CompositeOptions,
) -> Result<CompositeImage, VisError> {
    let (w, h) = original.dimensions();
    mask.ensure_dimensions(w, h)?;

    let tile = TextureTile::from_texture(texture, TextureTile::size_for(w, h))?;
    let tiled = apply_tile(original, mask, &tile);

    // Downscale last so the texture keeps full detail until here.
    let pixels = downscale_to_fit(tiled, options.max_dimension, options.downscale_filter);
    let downscaled = pixels.dimensions() != (w, h);
    if downscaled {
        crate::log_info!(
            "Composite downscaled {}x{} -> {}x{}",
            w,
            h,
            pixels.width(),
            pixels.height()
        );
    }

    let encoded = encode_jpeg(&pixels, options.jpeg_quality)?;
    Ok(CompositeImage {
        pixels,
        encoded,
        downscaled,
    })
}

/// Per-pixel selection: tile colour (opaque) where selected, original elsewhere.
pub fn apply_tile(original: &PixelGrid, mask: &SelectionMask, tile: &TextureTile) -> PixelGrid {
    let (w, _) = original.dimensions();
    let mut out = original.clone();
    if w == 0 {
        return out;
    }
    let tile_size = tile.size() as usize;
    let tile_raw = tile.pixels().as_raw();
    let tile_stride = tile_size * 4;
    let mask_raw = mask.as_raw();
    let row_bytes = w as usize * 4;

    out.as_mut()
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let mask_row = &mask_raw[y * w as usize..(y + 1) * w as usize];
            let tile_row = &tile_raw[(y % tile_size) * tile_stride..][..tile_stride];
            for (x, &m) in mask_row.iter().enumerate() {
                if m != SELECTED {
                    continue;
                }
                let t = (x % tile_size) * 4;
                let px = x * 4;
                row[px..px + 3].copy_from_slice(&tile_row[t..t + 3]);
                row[px + 3] = 255;
            }
        });
    out
}
