// ============================================================================
// MASK SURFACE — single-channel "area to redact" raster
// ============================================================================

use image::{GrayImage, imageops};
use rayon::prelude::*;

use crate::ops::shapes::{MaskShape, fill_shape};
use crate::region::Region;

/// Off-screen alpha raster the size of the source image.
/// 0 = not redacted, anything above 0 = redacted.
///
/// `painted_bounds` accumulates the bounds of every paint since the last
/// clear, so emptiness and tight-bounds scans only have to look there. It is
/// always a superset of the non-zero pixels.
#[derive(Clone, Debug)]
pub struct MaskSurface {
    pixels: GrayImage,
    painted_bounds: Option<Region>,
    generation: u64,
}

impl Default for MaskSurface {
    fn default() -> Self {
        MaskSurface::new(0, 0)
    }
}

impl MaskSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: GrayImage::new(width, height),
            painted_bounds: None,
            generation: 0,
        }
    }

    /// Adopt an existing raster (e.g. a history snapshot). The painted bounds
    /// are recomputed with a full scan.
    pub fn from_gray(pixels: GrayImage) -> Self {
        let painted_bounds = tight_bounds(&pixels, full_region(&pixels));
        Self {
            pixels,
            painted_bounds,
            generation: 0,
        }
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

    /// Read access to the raw alpha raster.
    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    pub fn alpha_at(&self, x: u32, y: u32) -> u8 {
        if x < self.width() && y < self.height() {
            self.pixels.get_pixel(x, y).0[0]
        } else {
            0
        }
    }

    /// Bumped on every mutation; lets caches detect content changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// Paint a primitive at full opacity. Returns the scanned pixel bounds.
    pub fn paint(&mut self, shape: &MaskShape) -> Option<Region> {
        let bounds = fill_shape(&mut self.pixels, shape)?;
        self.painted_bounds = Some(match self.painted_bounds {
            Some(existing) => existing.union(&bounds),
            None => bounds,
        });
        self.touch();
        Some(bounds)
    }

    /// Set every pixel to 0.
    pub fn clear(&mut self) {
        if let Some(bounds) = self.painted_bounds.take() {
            clear_region(&mut self.pixels, bounds);
            self.touch();
        }
    }

    /// Exact check: no pixel has alpha > 0.
    pub fn is_empty(&self) -> bool {
        let Some(bounds) = self.painted_bounds else { return true };
        let stride = self.width() as usize;
        let (x0, x1) = (bounds.x as usize, bounds.right() as usize);
        !self.pixels.as_raw()[bounds.y as usize * stride..bounds.bottom() as usize * stride]
            .par_chunks(stride)
            .any(|row| row[x0..x1].iter().any(|&a| a > 0))
    }

    /// Tight rectangle containing every pixel with alpha > 0.
    pub fn visible_bounds(&self) -> Option<Region> {
        tight_bounds(&self.pixels, self.painted_bounds?)
    }

    /// Count of redacted pixels.
    pub fn coverage(&self) -> usize {
        self.pixels.as_raw().par_iter().filter(|&&a| a > 0).count()
    }

    /// Alpha-over `other` onto this mask. Redacted area only ever grows.
    /// Returns `false` (and leaves the mask untouched) when the sizes differ.
    pub fn composite_over(&mut self, other: &MaskSurface) -> bool {
        if other.dimensions() != self.dimensions() {
            return false;
        }
        let Some(bounds) = other.painted_bounds else { return true };
        let stride = self.width() as usize;
        let (x0, x1) = (bounds.x as usize, bounds.right() as usize);
        let rows = bounds.y as usize * stride..bounds.bottom() as usize * stride;
        let src = &other.pixels.as_raw()[rows.clone()];
        let dst: &mut [u8] = &mut self.pixels;
        dst[rows]
            .par_chunks_mut(stride)
            .zip(src.par_chunks(stride))
            .for_each(|(d_row, s_row)| {
                for x in x0..x1 {
                    let s = s_row[x] as u32;
                    if s == 0 {
                        continue;
                    }
                    let d = d_row[x] as u32;
                    d_row[x] = (s + (d * (255 - s) + 127) / 255).min(255) as u8;
                }
            });
        self.painted_bounds = Some(match self.painted_bounds {
            Some(existing) => existing.union(&bounds),
            None => bounds,
        });
        self.touch();
        true
    }

    /// Deep, independent copy of the raster.
    pub fn snapshot(&self) -> GrayImage {
        self.pixels.clone()
    }

    /// Replace the content with a snapshot of the same size.
    pub fn restore(&mut self, snapshot: &GrayImage) -> bool {
        if snapshot.dimensions() != self.dimensions() {
            return false;
        }
        self.pixels.copy_from_slice(snapshot.as_raw());
        self.painted_bounds = tight_bounds(&self.pixels, full_region(&self.pixels));
        self.touch();
        true
    }

    /// Nearest-neighbour resize, used for thumbnails.
    pub fn resized(&self, width: u32, height: u32) -> GrayImage {
        imageops::resize(&self.pixels, width.max(1), height.max(1), imageops::FilterType::Nearest)
    }

    /// Bytes held by the raster.
    pub fn memory_bytes(&self) -> usize {
        self.pixels.as_raw().len()
    }
}

fn full_region(pixels: &GrayImage) -> Region {
    Region::new(0, 0, pixels.width(), pixels.height())
}

/// Zero `bounds` row by row.
fn clear_region(pixels: &mut GrayImage, bounds: Region) {
    let stride = pixels.width() as usize;
    let (x0, x1) = (bounds.x as usize, bounds.right() as usize);
    let raw: &mut [u8] = &mut **pixels;
    raw[bounds.y as usize * stride..bounds.bottom() as usize * stride]
        .par_chunks_mut(stride)
        .for_each(|row| row[x0..x1].fill(0));
}

/// Exact bounding box of non-zero pixels inside `search`.
fn tight_bounds(pixels: &GrayImage, search: Region) -> Option<Region> {
    if search.is_empty() {
        return None;
    }
    let stride = pixels.width() as usize;
    let (x0, x1) = (search.x as usize, search.right() as usize);
    let raw = pixels.as_raw();

    // Per-row (min_x, max_x) of visible pixels, reduced in parallel.
    let found = raw[search.y as usize * stride..search.bottom() as usize * stride]
        .par_chunks(stride)
        .enumerate()
        .filter_map(|(i, row)| {
            let span = &row[x0..x1];
            let first = span.iter().position(|&a| a > 0)?;
            let last = span.iter().rposition(|&a| a > 0)?;
            Some((i, x0 + first, x0 + last))
        })
        .fold(
            || None,
            |acc: Option<(usize, usize, usize, usize)>, (y, lo, hi)| {
                Some(match acc {
                    Some((y0, y1, a, b)) => (y0.min(y), y1.max(y), a.min(lo), b.max(hi)),
                    None => (y, y, lo, hi),
                })
            },
        )
        .reduce(
            || None,
            |a, b| match (a, b) {
                (Some((ay0, ay1, al, ah)), Some((by0, by1, bl, bh))) => {
                    Some((ay0.min(by0), ay1.max(by1), al.min(bl), ah.max(bh)))
                }
                (a, None) => a,
                (None, b) => b,
            },
        )?;

    let (row_min, row_max, min_x, max_x) = found;
    Some(Region::new(
        min_x as u32,
        search.y + row_min as u32,
        (max_x - min_x + 1) as u32,
        (row_max - row_min + 1) as u32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x1: f32, y1: f32, x2: f32, y2: f32) -> MaskShape {
        MaskShape::Rectangle { x1, y1, x2, y2 }
    }

    #[test]
    fn fresh_mask_is_empty() {
        let mask = MaskSurface::new(32, 32);
        assert!(mask.is_empty());
        assert!(mask.visible_bounds().is_none());
    }

    #[test]
    fn visible_bounds_are_tight() {
        let mut mask = MaskSurface::new(64, 64);
        mask.paint(&MaskShape::Dot { x: 20.0, y: 30.0, diameter: 6.0 });
        mask.paint(&rect(40.0, 5.0, 44.0, 8.0));
        let b = mask.visible_bounds().unwrap();
        assert_eq!(b.x, 17);
        assert_eq!(b.y, 5);
        assert_eq!(b.right(), 44);
        assert_eq!(b.bottom(), 33);
    }

    #[test]
    fn clear_resets_content_and_bounds() {
        let mut mask = MaskSurface::new(16, 16);
        mask.paint(&rect(0.0, 0.0, 16.0, 16.0));
        let before = mask.generation();
        mask.clear();
        assert!(mask.is_empty());
        assert_eq!(mask.coverage(), 0);
        assert!(mask.generation() > before);
    }

    #[test]
    fn composite_over_is_a_union() {
        let mut committed = MaskSurface::new(40, 40);
        committed.paint(&rect(0.0, 0.0, 10.0, 10.0));
        let mut scratch = MaskSurface::new(40, 40);
        scratch.paint(&rect(5.0, 5.0, 20.0, 20.0));

        assert!(committed.composite_over(&scratch));
        assert_eq!(committed.alpha_at(0, 0), 255);
        assert_eq!(committed.alpha_at(19, 19), 255);
        assert_eq!(committed.alpha_at(25, 25), 0);
        assert_eq!(committed.coverage(), 100 + 225 - 25);
    }

    #[test]
    fn composite_over_rejects_size_mismatch() {
        let mut a = MaskSurface::new(10, 10);
        let mut b = MaskSurface::new(12, 10);
        b.paint(&rect(0.0, 0.0, 5.0, 5.0));
        assert!(!a.composite_over(&b));
        assert!(a.is_empty());
    }

    #[test]
    fn snapshot_is_independent() {
        let mut mask = MaskSurface::new(20, 20);
        mask.paint(&rect(0.0, 0.0, 5.0, 5.0));
        let snap = mask.snapshot();
        mask.paint(&rect(10.0, 10.0, 15.0, 15.0));
        assert_eq!(snap.get_pixel(12, 12).0[0], 0);

        mask.restore(&snap);
        assert_eq!(mask.alpha_at(12, 12), 0);
        assert_eq!(mask.visible_bounds(), Some(Region::new(0, 0, 5, 5)));
    }

    #[test]
    fn from_gray_recovers_bounds() {
        let mut raw = GrayImage::new(30, 30);
        raw.put_pixel(7, 9, image::Luma([200]));
        let mask = MaskSurface::from_gray(raw);
        assert!(!mask.is_empty());
        assert_eq!(mask.visible_bounds(), Some(Region::new(7, 9, 1, 1)));
    }
}
