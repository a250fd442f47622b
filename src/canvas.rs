// ============================================================================
// CANVAS TYPES: pixel grids, strokes and the binary selection mask
// ============================================================================

use image::{imageops, DynamicImage, GrayImage, Luma, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::VisError;

/// RGBA8 pixel buffer. `image::RgbaImage` already guarantees
/// `width * height * 4 == buffer length`.
pub type PixelGrid = RgbaImage;

/// Mask byte for a selected pixel.
pub const SELECTED: u8 = 255;

/// Grayscale values strictly above this decode as "selected".
pub const MASK_DECODE_THRESHOLD: u8 = 128;

// -- Strokes -----------------------------------------------------------------

/// A point in grid (pixel) coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
}

impl StrokePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: StrokePoint) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(&self, other: StrokePoint, t: f32) -> StrokePoint {
        StrokePoint {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

/// One freehand stroke: every stamped point (input and interpolated) plus
/// the brush radius it was painted with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    points: Vec<StrokePoint>,
    radius: f32,
}

impl Stroke {
    pub(crate) fn new(start: StrokePoint, radius: f32) -> Self {
        Self {
            points: vec![start],
            radius,
        }
    }

    pub fn points(&self) -> &[StrokePoint] {
        &self.points
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn last_point(&self) -> Option<StrokePoint> {
        self.points.last().copied()
    }

    pub(crate) fn push(&mut self, point: StrokePoint) {
        self.points.push(point);
    }
}

/// Brush presets offered by the painting UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BrushSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl BrushSize {
    pub fn label(&self) -> &'static str {
        match self {
            BrushSize::Small => "S",
            BrushSize::Medium => "M",
            BrushSize::Large => "L",
        }
    }

    pub fn all() -> &'static [BrushSize] {
        &[BrushSize::Small, BrushSize::Medium, BrushSize::Large]
    }

    /// Brush diameter in pixels.
    pub fn diameter(&self) -> f32 {
        match self {
            BrushSize::Small => 15.0,
            BrushSize::Medium => 30.0,
            BrushSize::Large => 50.0,
        }
    }

    pub fn radius(&self) -> f32 {
        self.diameter() * 0.5
    }
}

// -- Selection mask ------------------------------------------------------------

/// Binary per-pixel selection. Stored as a grayscale image whose pixels are
/// either 0 (keep) or [`SELECTED`] (replace).
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionMask {
    pixels: GrayImage,
}

impl SelectionMask {
    /// Empty (nothing selected) mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: GrayImage::new(width, height),
        }
    }

    /// Mask with every pixel selected.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            pixels: GrayImage::from_pixel(width, height, Luma([SELECTED])),
        }
    }

    /// Binarize a grayscale image: values above 128 are selected.
    pub fn from_gray(gray: &GrayImage) -> Self {
        let mut pixels = GrayImage::new(gray.width(), gray.height());
        for (dst, src) in pixels.pixels_mut().zip(gray.pixels()) {
            if src.0[0] > MASK_DECODE_THRESHOLD {
                *dst = Luma([SELECTED]);
            }
        }
        Self { pixels }
    }

    /// Binarize any decoded image via its luma channel.
    pub fn from_image(img: &DynamicImage) -> Self {
        Self::from_gray(&img.to_luma8())
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// `false` for out-of-bounds coordinates.
    pub fn is_selected(&self, x: u32, y: u32) -> bool {
        self.pixels
            .get_pixel_checked(x, y)
            .is_some_and(|p| p.0[0] == SELECTED)
    }

    pub fn set(&mut self, x: u32, y: u32, selected: bool) {
        if x < self.width() && y < self.height() {
            self.pixels
                .put_pixel(x, y, Luma([if selected { SELECTED } else { 0 }]));
        }
    }

    /// Select an axis-aligned rectangle, clipped to the mask.
    pub fn select_rect(&mut self, x: u32, y: u32, w: u32, h: u32) {
        let x1 = x.saturating_add(w).min(self.width());
        let y1 = y.saturating_add(h).min(self.height());
        for py in y.min(y1)..y1 {
            for px in x.min(x1)..x1 {
                self.pixels.put_pixel(px, py, Luma([SELECTED]));
            }
        }
    }

    pub fn selected_count(&self) -> usize {
        self.pixels.pixels().filter(|p| p.0[0] == SELECTED).count()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.pixels().all(|p| p.0[0] != SELECTED)
    }

    /// Nearest-neighbour resize, keeping the mask binary.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        Self {
            pixels: imageops::resize(&self.pixels, width, height, imageops::FilterType::Nearest),
        }
    }

    /// Fails with `DimensionMismatch` unless the mask matches `(width, height)`.
    pub fn ensure_dimensions(&self, width: u32, height: u32) -> Result<(), VisError> {
        if self.dimensions() != (width, height) {
            return Err(VisError::DimensionMismatch {
                expected: (width, height),
                actual: self.dimensions(),
            });
        }
        Ok(())
    }

    /// Raw mask bytes, one per pixel, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.pixels
    }

    pub(crate) fn from_binary_gray(pixels: GrayImage) -> Self {
        Self { pixels }
    }
}
