// ============================================================================
// RESAMPLING: texture scaling and memory-bounding downscale
// ============================================================================

use image::{imageops, Rgba, RgbaImage};
use rayon::prelude::*;

/// Interpolation method for resize operations.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl Interpolation {
    pub const ALL: [Interpolation; 4] = [
        Interpolation::Nearest,
        Interpolation::Bilinear,
        Interpolation::Bicubic,
        Interpolation::Lanczos3,
    ];

    /// Case-insensitive lookup by [`label`](Self::label).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.label().eq_ignore_ascii_case(name))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Interpolation::Nearest => "Nearest",
            Interpolation::Bilinear => "Bilinear",
            Interpolation::Bicubic => "Bicubic",
            Interpolation::Lanczos3 => "Lanczos3",
        }
    }

    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
            Interpolation::Bicubic => imageops::FilterType::CatmullRom,
            Interpolation::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

/// Resample `src` to exactly `width` × `height` with bilinear filtering,
/// clamping samples at the source edges. Rows are processed in parallel.
pub fn resample_bilinear(src: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let mut dst = RgbaImage::new(width, height);
    if width == 0 || height == 0 || src.width() == 0 || src.height() == 0 {
        return dst;
    }

    // Pixel-centre mapping: dst centre (x + 0.5) lands on src (x + 0.5) * ratio.
    let sx_ratio = src.width() as f32 / width as f32;
    let sy_ratio = src.height() as f32 / height as f32;
    let row_bytes = width as usize * 4;

    dst.as_mut()
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(dy, row)| {
            let sy = (dy as f32 + 0.5) * sy_ratio - 0.5;
            for dx in 0..width as usize {
                let sx = (dx as f32 + 0.5) * sx_ratio - 0.5;
                let p = bilinear_sample_clamped(src, sx, sy);
                row[dx * 4..dx * 4 + 4].copy_from_slice(&p.0);
            }
        });
    dst
}

/// Bilinear interpolation sampling from an RgbaImage, clamping to the edges.
fn bilinear_sample_clamped(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let max_x = img.width() as i32 - 1;
    let max_y = img.height() as i32 - 1;
    let x = x.clamp(0.0, max_x as f32);
    let y = y.clamp(0.0, max_y as f32);
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |sx: i32, sy: i32| -> [f32; 4] {
        let p = img.get_pixel(sx.min(max_x) as u32, sy.min(max_y) as u32);
        [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        out[c] = lerp(top, bot, fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// Target size for fitting `(width, height)` inside `max_dimension`.
/// `None` when the image already fits.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    if width <= max_dimension && height <= max_dimension {
        return None;
    }
    // scale = min(max/w, max/h); integer math keeps the limiting side exact.
    let max = max_dimension.max(1) as u64;
    let (w, h) = (width as u64, height as u64);
    let (new_w, new_h) = if w >= h {
        (max, h * max / w)
    } else {
        (w * max / h, max)
    };
    Some((new_w.max(1) as u32, new_h.max(1) as u32))
}

/// Downscale so neither side exceeds `max_dimension`. Returns the image
/// untouched when it already fits.
pub fn downscale_to_fit(img: RgbaImage, max_dimension: u32, filter: Interpolation) -> RgbaImage {
    match fit_within(img.width(), img.height(), max_dimension) {
        Some((w, h)) => imageops::resize(&img, w, h, filter.to_filter()),
        None => img,
    }
}
