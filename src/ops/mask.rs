// ============================================================================
// MASK SURFACE: freehand strokes rasterized into a binary selection
// ============================================================================
//
// The painting UI pushes pointer positions (already mapped to grid
// coordinates); this module knows nothing about input devices. Each stamped
// point composites a soft-edged disc of a fixed semi-transparent paint into an
// alpha accumulation buffer, and the selection is every pixel whose
// accumulated alpha exceeds 10/255.

use crate::canvas::{SelectionMask, Stroke, StrokePoint, SELECTED};
use crate::error::VisError;
use image::{GrayImage, Luma};

/// Maximum distance between consecutive stamps, in pixels.
pub const INTERPOLATION_STEP: f32 = 3.0;

/// Alpha of the paint used for each stamp (source-over).
pub const PAINT_ALPHA: f32 = 0.65;

/// Accumulated alpha above this marks a pixel as selected.
pub const SELECTION_THRESHOLD: f32 = 10.0 / 255.0;

/// Stroke accumulator for one base image.
///
/// The accumulation buffer is updated as each point is stamped, so
/// [`MaskSurface::rasterize`] only thresholds it. Source-over alpha
/// accumulation is commutative per pixel, so this yields the same mask as
/// re-rasterizing every stroke from scratch (see [`rasterize_strokes`]).
#[derive(Debug, Default)]
pub struct MaskSurface {
    size: Option<(u32, u32)>,
    strokes: Vec<Stroke>,
    active: Option<Stroke>,
    alpha: Vec<f32>,
}

impl MaskSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new base image size. Discards all strokes.
    pub fn load_image(&mut self, width: u32, height: u32) {
        self.size = Some((width, height));
        self.strokes.clear();
        self.active = None;
        self.alpha = vec![0.0; width as usize * height as usize];
    }

    pub fn has_image(&self) -> bool {
        self.size.is_some()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// Sealed strokes, oldest first.
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn is_stroking(&self) -> bool {
        self.active.is_some()
    }

    /// Start a stroke at `point` and stamp it. Any stroke still open is sealed first.
    pub fn begin_stroke(&mut self, point: StrokePoint, brush_radius: f32) -> Result<(), VisError> {
        if self.size.is_none() {
            return Err(VisError::InvalidState(
                "begin_stroke called before a base image was loaded".into(),
            ));
        }
        if !brush_radius.is_finite() || brush_radius <= 0.0 {
            return Err(VisError::InvalidState(format!(
                "brush radius must be positive, got {}",
                brush_radius
            )));
        }
        check_finite(point)?;
        self.end_stroke();
        self.stamp(point, brush_radius);
        self.active = Some(Stroke::new(point, brush_radius));
        Ok(())
    }

    /// Append a point to the open stroke, filling long jumps with evenly
    /// spaced samples no more than [`INTERPOLATION_STEP`] apart.
    pub fn extend_stroke(&mut self, point: StrokePoint) -> Result<(), VisError> {
        check_finite(point)?;
        let Some(mut stroke) = self.active.take() else {
            return Err(VisError::InvalidState(
                "extend_stroke called without an active stroke".into(),
            ));
        };
        let radius = stroke.radius();
        let Some(prev) = stroke.last_point() else {
            self.active = Some(stroke);
            return Ok(());
        };

        let dist = prev.distance_to(point);
        if dist < f32::EPSILON {
            self.active = Some(stroke);
            return Ok(());
        }

        // Only the part of the segment that can touch the grid is sampled.
        let (w, h) = self.size.unwrap_or((0, 0));
        if let Some((a, b)) = clip_segment(prev, point, w, h, radius + 1.0) {
            if a != prev {
                self.stamp(a, radius);
                stroke.push(a);
            }
            let span = a.distance_to(b);
            let max_steps = ((w + h) as f32 + 4.0 * (radius + 1.0)) / INTERPOLATION_STEP * 2.0;
            let steps = (span / INTERPOLATION_STEP).ceil().clamp(1.0, max_steps.max(1.0)) as u32;
            for i in 1..steps {
                let p = a.lerp(b, i as f32 / steps as f32);
                self.stamp(p, radius);
                stroke.push(p);
            }
            if b != point {
                self.stamp(b, radius);
                stroke.push(b);
            }
        }
        self.stamp(point, radius);
        stroke.push(point);

        self.active = Some(stroke);
        Ok(())
    }

    /// Seal the open stroke. No-op if none is open.
    pub fn end_stroke(&mut self) {
        if let Some(stroke) = self.active.take() {
            self.strokes.push(stroke);
        }
    }

    /// Discard every stroke and empty the mask. Keeps the base image size.
    pub fn clear(&mut self) {
        self.strokes.clear();
        self.active = None;
        self.alpha.iter_mut().for_each(|a| *a = 0.0);
    }

    /// Current selection (including the open stroke, if any).
    pub fn rasterize(&self) -> SelectionMask {
        let (w, h) = self.size.unwrap_or((0, 0));
        threshold(w, h, &self.alpha)
    }

    fn stamp(&mut self, center: StrokePoint, radius: f32) {
        if let Some((w, h)) = self.size {
            stamp_disc(&mut self.alpha, w, h, center, radius);
        }
    }
}

/// Rasterize a stroke set from scratch onto a `width` × `height` grid.
pub fn rasterize_strokes(width: u32, height: u32, strokes: &[Stroke]) -> SelectionMask {
    let mut alpha = vec![0.0_f32; width as usize * height as usize];
    for stroke in strokes {
        for &p in stroke.points() {
            stamp_disc(&mut alpha, width, height, p, stroke.radius());
        }
    }
    threshold(width, height, &alpha)
}

fn check_finite(point: StrokePoint) -> Result<(), VisError> {
    if point.x.is_finite() && point.y.is_finite() {
        Ok(())
    } else {
        Err(VisError::InvalidState(format!(
            "stroke point must be finite, got ({}, {})",
            point.x, point.y
        )))
    }
}

/// Liang–Barsky clip of `p0 → p1` to the grid grown by `margin` on every
/// side. `None` if the segment misses it entirely.
fn clip_segment(
    p0: StrokePoint,
    p1: StrokePoint,
    width: u32,
    height: u32,
    margin: f32,
) -> Option<(StrokePoint, StrokePoint)> {
    let (min_x, min_y) = (-margin, -margin);
    let (max_x, max_y) = (width as f32 + margin, height as f32 + margin);
    let dx = p1.x - p0.x;
    let dy = p1.y - p0.y;
    let mut t0 = 0.0_f32;
    let mut t1 = 1.0_f32;
    for (p, q) in [
        (-dx, p0.x - min_x),
        (dx, max_x - p0.x),
        (-dy, p0.y - min_y),
        (dy, max_y - p0.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    let a = if t0 <= 0.0 { p0 } else { p0.lerp(p1, t0) };
    let b = if t1 >= 1.0 { p1 } else { p0.lerp(p1, t1) };
    Some((a, b))
}

/// Source-over composite of one anti-aliased disc into `alpha`.
fn stamp_disc(alpha: &mut [f32], width: u32, height: u32, center: StrokePoint, radius: f32) {
    if width == 0 || height == 0 {
        return;
    }
    let reach = radius + 1.0;
    let min_x = (center.x - reach).floor().max(0.0) as i64;
    let min_y = (center.y - reach).floor().max(0.0) as i64;
    let max_x = ((center.x + reach).ceil() as i64).min(width as i64 - 1);
    let max_y = ((center.y + reach).ceil() as i64).min(height as i64 - 1);
    if min_x > max_x || min_y > max_y {
        return;
    }

    for y in min_y..=max_y {
        let dy = y as f32 + 0.5 - center.y;
        let row = y as usize * width as usize;
        for x in min_x..=max_x {
            let dx = x as f32 + 0.5 - center.x;
            let dist = (dx * dx + dy * dy).sqrt();
            // Partial coverage across the one-pixel rim.
            let coverage = (radius + 0.5 - dist).clamp(0.0, 1.0);
            if coverage <= 0.0 {
                continue;
            }
            let src = PAINT_ALPHA * coverage;
            let dst = &mut alpha[row + x as usize];
            *dst = src + *dst * (1.0 - src);
        }
    }
}

fn threshold(width: u32, height: u32, alpha: &[f32]) -> SelectionMask {
    let mut gray = GrayImage::new(width, height);
    for (dst, &a) in gray.pixels_mut().zip(alpha) {
        if a > SELECTION_THRESHOLD {
            *dst = Luma([SELECTED]);
        }
    }
    SelectionMask::from_binary_gray(gray)
}
