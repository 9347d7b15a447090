// ============================================================================
// MASK SHAPES — coverage rasterization of the paint primitives
// ============================================================================

use image::GrayImage;
use rayon::prelude::*;

use crate::region::Region;

/// Alpha written by every paint primitive. Painting is binary.
pub const PAINT_ALPHA: u8 = 255;

/// Smallest radius used for round primitives so a 1px brush at integer
/// coordinates still covers the pixels around the point.
const MIN_RADIUS: f32 = 0.75;

/// A paint primitive in image-space coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MaskShape {
    /// Filled circle; `diameter` is the brush size.
    Dot { x: f32, y: f32, diameter: f32 },
    /// Round-capped line of width `diameter`.
    Stroke { x1: f32, y1: f32, x2: f32, y2: f32, diameter: f32 },
    /// Axis-aligned rectangle spanning two corners.
    Rectangle { x1: f32, y1: f32, x2: f32, y2: f32 },
    /// Ellipse inscribed in the box spanning two corners.
    Ellipse { x1: f32, y1: f32, x2: f32, y2: f32 },
}

impl MaskShape {
    /// Float bounds `(min_x, min_y, max_x, max_y)` of the covered area.
    pub fn float_bounds(&self) -> (f32, f32, f32, f32) {
        match *self {
            MaskShape::Dot { x, y, diameter } => {
                let r = (diameter / 2.0).max(MIN_RADIUS);
                (x - r, y - r, x + r, y + r)
            }
            MaskShape::Stroke { x1, y1, x2, y2, diameter } => {
                let r = (diameter / 2.0).max(MIN_RADIUS);
                (x1.min(x2) - r, y1.min(y2) - r, x1.max(x2) + r, y1.max(y2) + r)
            }
            MaskShape::Rectangle { x1, y1, x2, y2 } | MaskShape::Ellipse { x1, y1, x2, y2 } => {
                (x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2))
            }
        }
    }

    /// Pixel bounds clamped to a `w × h` surface, `None` when off-surface or
    /// degenerate.
    pub fn pixel_bounds(&self, w: u32, h: u32) -> Option<Region> {
        let (min_x, min_y, max_x, max_y) = self.float_bounds();
        if max_x <= min_x || max_y <= min_y {
            return None;
        }
        Region::from_f32_clamped(min_x, min_y, max_x - min_x, max_y - min_y, w, h)
    }

    /// Returns `true` if the pixel centre `(px, py)` is covered.
    pub fn covers(&self, px: f32, py: f32) -> bool {
        match *self {
            MaskShape::Dot { x, y, diameter } => {
                let r = (diameter / 2.0).max(MIN_RADIUS);
                let dx = px - x;
                let dy = py - y;
                dx * dx + dy * dy <= r * r
            }
            MaskShape::Stroke { x1, y1, x2, y2, diameter } => {
                let r = (diameter / 2.0).max(MIN_RADIUS);
                distance_sq_to_segment(px, py, x1, y1, x2, y2) <= r * r
            }
            MaskShape::Rectangle { x1, y1, x2, y2 } => {
                px >= x1.min(x2) && px < x1.max(x2) && py >= y1.min(y2) && py < y1.max(y2)
            }
            MaskShape::Ellipse { x1, y1, x2, y2 } => {
                let rx = (x2 - x1).abs() / 2.0;
                let ry = (y2 - y1).abs() / 2.0;
                if rx <= 0.0 || ry <= 0.0 {
                    return false;
                }
                let dx = (px - (x1 + x2) / 2.0) / rx;
                let dy = (py - (y1 + y2) / 2.0) / ry;
                dx * dx + dy * dy <= 1.0
            }
        }
    }
}

/// Squared distance from `(px, py)` to the segment `a → b`.
fn distance_sq_to_segment(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let vx = bx - ax;
    let vy = by - ay;
    let len_sq = vx * vx + vy * vy;
    let t = if len_sq <= f32::EPSILON {
        0.0
    } else {
        (((px - ax) * vx + (py - ay) * vy) / len_sq).clamp(0.0, 1.0)
    };
    let cx = ax + vx * t - px;
    let cy = ay + vy * t - py;
    cx * cx + cy * cy
}

/// Rasterize `shape` into `mask` with full opacity, row-parallel.
/// Returns the pixel bounds that were scanned, or `None` if nothing could be
/// painted.
pub fn fill_shape(mask: &mut GrayImage, shape: &MaskShape) -> Option<Region> {
    let (w, h) = mask.dimensions();
    let bounds = shape.pixel_bounds(w, h)?;
    let stride = w as usize;
    let (x0, x1) = (bounds.x as usize, bounds.right() as usize);
    let y0 = bounds.y as usize;
    let raw: &mut [u8] = &mut **mask;

    raw[y0 * stride..bounds.bottom() as usize * stride]
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(i, row)| {
            let py = (y0 + i) as f32 + 0.5;
            for (x, px) in row.iter_mut().enumerate().take(x1).skip(x0) {
                if shape.covers(x as f32 + 0.5, py) {
                    *px = PAINT_ALPHA;
                }
            }
        });

    Some(bounds)
}
