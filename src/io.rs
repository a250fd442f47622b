// ============================================================================
// IMAGE I/O: decode inputs, encode composites (JPEG) and masks (PNG)
// ============================================================================

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, RgbaImage};
use std::fs;
use std::path::Path;

use crate::canvas::{PixelGrid, SelectionMask};
use crate::error::VisError;

/// JPEG quality used for composites (≈0.92 on a 0–1 scale).
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Decode any supported raster format into RGBA.
pub fn decode_rgba(bytes: &[u8]) -> Result<PixelGrid, VisError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Decode a mask image: luma above 128 means selected.
pub fn decode_mask(bytes: &[u8]) -> Result<SelectionMask, VisError> {
    let img = image::load_from_memory(bytes)?;
    Ok(SelectionMask::from_image(&img))
}

/// Load an image file from disk as RGBA.
pub fn load_image(path: &Path) -> Result<PixelGrid, VisError> {
    let img = image::open(path)
        .map_err(|e| VisError::Decoding(format!("{}: {}", path.display(), e)))?;
    Ok(img.to_rgba8())
}

/// Load a mask image from disk.
pub fn load_mask(path: &Path) -> Result<SelectionMask, VisError> {
    let img = image::open(path)
        .map_err(|e| VisError::Decoding(format!("{}: {}", path.display(), e)))?;
    Ok(SelectionMask::from_image(&img))
}

/// Encode RGBA pixels as baseline JPEG. Alpha is dropped.
pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>, VisError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(VisError::Encoding("cannot encode an empty image".into()));
    }
    let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder
        .encode(
            rgb_image.as_raw(),
            rgb_image.width(),
            rgb_image.height(),
            image::ColorType::Rgb8,
        )
        .map_err(|e| VisError::Encoding(e.to_string()))?;
    Ok(out)
}

/// Encode a selection as a black/white PNG (white = selected).
pub fn encode_mask_png(mask: &SelectionMask) -> Result<Vec<u8>, VisError> {
    let gray = mask.as_gray();
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(gray.as_raw(), gray.width(), gray.height(), image::ColorType::L8)
        .map_err(|e| VisError::Encoding(e.to_string()))?;
    Ok(out)
}

/// Write encoded bytes to `path`, creating parent directories.
pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), VisError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| VisError::Encoding(format!("{}: {}", parent.display(), e)))?;
    }
    fs::write(path, bytes).map_err(|e| VisError::Encoding(format!("{}: {}", path.display(), e)))
}
