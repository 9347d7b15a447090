// ============================================================================
// EDIT ENGINE — source image, committed/scratch masks and the blur composite
// ============================================================================

use image::{GrayImage, Rgba, RgbaImage, imageops};
use tracing::{debug, info};

use crate::compositor::BlurCompositor;
use crate::error::{RedactError, Result};
use crate::mask::MaskSurface;
use crate::ops::blur::{BlurQuality, masked_blur};
use crate::ops::shapes::MaskShape;
use crate::region::{DIRTY_MARGIN, DirtyRegions, Region};
use crate::surface::{RasterSurface, ViewTransform};

/// Colour of the in-progress gesture highlight.
pub const SCRATCH_TINT: Rgba<u8> = Rgba([255, 0, 0, 255]);
/// Opacity of the in-progress gesture highlight.
pub const SCRATCH_OPACITY: f32 = 0.5;
/// Blur strength used for history thumbnails.
pub const THUMBNAIL_SIGMA: f32 = 3.0;

/// Which mask a paint call writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskTarget {
    /// Persistent redactions; feeds the blur layer and history.
    Committed,
    /// Preview of the gesture in progress.
    Scratch,
}

/// Owns the loaded image and both masks, and drives the blur compositor.
///
/// Every paint or commit call on an engine without a source is a silent
/// no-op. Only [`commit_scratch`](Self::commit_scratch), the committed paint
/// calls and [`restore_committed`](Self::restore_committed) mutate the
/// committed mask.
#[derive(Default)]
pub struct EditEngine {
    source: Option<RgbaImage>,
    committed: MaskSurface,
    scratch: MaskSurface,
    dirty: DirtyRegions,
    compositor: BlurCompositor,
}

impl EditEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the image and allocate fresh masks sized to match.
    /// A rejected image leaves the previous state untouched.
    pub fn load_source(&mut self, image: RgbaImage) -> Result<(u32, u32)> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(RedactError::InvalidInput(format!("source image is {w}x{h}")));
        }
        self.source = Some(image);
        self.committed = MaskSurface::new(w, h);
        self.scratch = MaskSurface::new(w, h);
        self.dirty.clear();
        self.compositor.invalidate();
        info!(width = w, height = h, "source loaded");
        Ok((w, h))
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Image size, `(0, 0)` when nothing is loaded.
    pub fn dimensions(&self) -> (u32, u32) {
        self.source.as_ref().map_or((0, 0), |s| s.dimensions())
    }

    pub fn source(&self) -> Option<&RgbaImage> {
        self.source.as_ref()
    }

    pub fn committed(&self) -> &MaskSurface {
        &self.committed
    }

    pub fn scratch(&self) -> &MaskSurface {
        &self.scratch
    }

    pub fn dirty_regions(&self) -> &[Region] {
        self.dirty.as_slice()
    }

    // ------------------------------------------------------------------------
    // Painting
    // ------------------------------------------------------------------------

    /// Paint a primitive onto `target`. Returns the pixel bounds touched.
    pub fn paint(&mut self, target: MaskTarget, shape: &MaskShape) -> Option<Region> {
        let (w, h) = self.source.as_ref()?.dimensions();
        match target {
            MaskTarget::Scratch => self.scratch.paint(shape),
            MaskTarget::Committed => {
                let painted = self.committed.paint(shape);
                let (x1, y1, x2, y2) = shape.float_bounds();
                self.dirty.push_opt(Region::from_corners(x1, y1, x2, y2, DIRTY_MARGIN, w, h));
                self.compositor.invalidate();
                painted
            }
        }
    }

    pub fn paint_dot(&mut self, target: MaskTarget, x: f32, y: f32, diameter: f32) -> Option<Region> {
        self.paint(target, &MaskShape::Dot { x, y, diameter })
    }

    pub fn paint_stroke(
        &mut self,
        target: MaskTarget,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        diameter: f32,
    ) -> Option<Region> {
        self.paint(target, &MaskShape::Stroke { x1, y1, x2, y2, diameter })
    }

    pub fn paint_rectangle(&mut self, target: MaskTarget, x1: f32, y1: f32, x2: f32, y2: f32) -> Option<Region> {
        self.paint(target, &MaskShape::Rectangle { x1, y1, x2, y2 })
    }

    pub fn paint_ellipse(&mut self, target: MaskTarget, x1: f32, y1: f32, x2: f32, y2: f32) -> Option<Region> {
        self.paint(target, &MaskShape::Ellipse { x1, y1, x2, y2 })
    }

    /// Zero every pixel of `target`.
    pub fn clear(&mut self, target: MaskTarget) {
        match target {
            MaskTarget::Scratch => self.scratch.clear(),
            MaskTarget::Committed => {
                self.dirty.push_opt(self.committed.visible_bounds());
                self.committed.clear();
                self.compositor.invalidate();
            }
        }
    }

    pub fn clear_scratch(&mut self) {
        self.scratch.clear();
    }

    /// Merge the scratch mask into the committed mask.
    /// Returns `false` (and changes nothing) when the scratch holds no paint.
    pub fn commit_scratch(&mut self) -> bool {
        if self.source.is_none() || self.scratch.is_empty() {
            return false;
        }
        let bounds = self.scratch.visible_bounds();
        if !self.committed.composite_over(&self.scratch) {
            return false;
        }
        self.dirty.push_opt(bounds);
        self.scratch.clear();
        self.compositor.invalidate();
        debug!(?bounds, "scratch committed");
        true
    }

    /// Paint each region as a committed rectangle. Returns how many landed
    /// on the image.
    pub fn apply_regions(&mut self, regions: &[Region]) -> usize {
        regions
            .iter()
            .filter(|r| {
                self.paint_rectangle(
                    MaskTarget::Committed,
                    r.x as f32,
                    r.y as f32,
                    r.right() as f32,
                    r.bottom() as f32,
                )
                .is_some()
            })
            .count()
    }

    /// Clear both masks, the dirty list and the blur cache.
    pub fn reset(&mut self) {
        self.committed.clear();
        self.scratch.clear();
        self.dirty.clear();
        self.compositor.invalidate();
    }

    // ------------------------------------------------------------------------
    // History interplay
    // ------------------------------------------------------------------------

    /// Independent copy of the committed mask.
    pub fn committed_snapshot(&self) -> GrayImage {
        self.committed.snapshot()
    }

    /// Adopt a history snapshot as the committed mask.
    pub fn restore_committed(&mut self, snapshot: &GrayImage) -> Result<()> {
        if self.source.is_none() {
            return Err(RedactError::InvalidInput("no source loaded".into()));
        }
        let before = self.committed.visible_bounds();
        if !self.committed.restore(snapshot) {
            let (w, h) = snapshot.dimensions();
            return Err(RedactError::InvalidInput(format!(
                "snapshot is {w}x{h}, mask is {}x{}",
                self.committed.width(),
                self.committed.height()
            )));
        }
        self.dirty.push_opt(before);
        self.dirty.push_opt(self.committed.visible_bounds());
        self.compositor.invalidate();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Compositing
    // ------------------------------------------------------------------------

    pub fn set_high_quality(&mut self, enabled: bool) {
        self.compositor.set_quality(BlurQuality::from_high_quality(enabled));
    }

    pub fn high_quality(&self) -> bool {
        self.compositor.quality() == BlurQuality::High
    }

    /// How many times the cached blur layer has been computed.
    pub fn blur_recomputes(&self) -> u64 {
        self.compositor.recompute_count()
    }

    /// Draw the sharp image, the blurred redactions and the gesture preview
    /// onto `target`, then consume the dirty list.
    pub fn render<S: RasterSurface>(
        &mut self,
        target: &mut S,
        intensity: f32,
        passes: u32,
        scale: f32,
        offset_x: f32,
        offset_y: f32,
    ) -> Result<()> {
        let (tw, th) = target.surface_size();
        if tw == 0 || th == 0 {
            return Err(RedactError::ContextUnavailable(format!("render target is {tw}x{th}")));
        }
        target.clear_surface();
        let Some(source) = self.source.as_ref() else {
            return Ok(());
        };

        let view = ViewTransform::centered((tw, th), source.dimensions(), scale, offset_x, offset_y);
        target.draw_image(source, &view);

        if !self.committed.is_empty() {
            let layer = self.compositor.layer(source, &self.committed, intensity, passes);
            target.draw_image(layer, &view);
        }

        if !self.scratch.is_empty() {
            target.draw_mask_tint(self.scratch.pixels(), SCRATCH_TINT, SCRATCH_OPACITY, &view);
        }

        self.dirty.clear();
        Ok(())
    }

    /// Full-resolution sharp image with the blurred redactions baked in.
    /// Built fresh; the render cache is neither read nor updated.
    pub fn export_composite(&self, intensity: f32, passes: u32) -> Result<RgbaImage> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| RedactError::InvalidInput("no source loaded".into()))?;
        let mut out = RgbaImage::new(source.width(), source.height());
        let view = ViewTransform::identity();
        out.draw_image(source, &view);
        if !self.committed.is_empty() {
            let layer = self.compositor.build_layer(source, &self.committed, intensity, passes);
            out.draw_image(&layer, &view);
        }
        Ok(out)
    }

    /// Small preview: the image fitted and centred in a `width × height`
    /// transparent canvas, with redacted areas lightly blurred.
    pub fn thumbnail(&self, width: u32, height: u32) -> RgbaImage {
        let mut canvas = RgbaImage::new(width, height);
        let Some(source) = self.source.as_ref() else {
            return canvas;
        };
        if width == 0 || height == 0 {
            return canvas;
        }

        let (sw, sh) = source.dimensions();
        let scale = (width as f32 / sw as f32).min(height as f32 / sh as f32);
        let tw = ((sw as f32 * scale).round() as u32).clamp(1, width);
        let th = ((sh as f32 * scale).round() as u32).clamp(1, height);
        let mut scaled = imageops::resize(source, tw, th, imageops::FilterType::Triangle);

        if !self.committed.is_empty() {
            let small = MaskSurface::from_gray(self.committed.resized(tw, th));
            if let Some(bounds) = small.visible_bounds() {
                let blurred = masked_blur(&scaled, small.pixels(), bounds, &[THUMBNAIL_SIGMA]);
                imageops::overlay(&mut scaled, &blurred, 0, 0);
            }
        }

        let x = ((width - tw) / 2) as i64;
        let y = ((height - th) / 2) as i64;
        imageops::overlay(&mut canvas, &scaled, x, y);
        canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::blur::{blur_passes, pass_sigmas};

    fn pattern(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8, 255]))
    }

    fn loaded(w: u32, h: u32) -> EditEngine {
        let mut engine = EditEngine::new();
        engine.load_source(pattern(w, h)).unwrap();
        engine
    }

    #[test]
    fn rejects_empty_source_without_losing_state() {
        let mut engine = loaded(20, 20);
        engine.paint_rectangle(MaskTarget::Committed, 0.0, 0.0, 5.0, 5.0);
        assert!(matches!(engine.load_source(RgbaImage::new(0, 4)), Err(RedactError::InvalidInput(_))));
        assert_eq!(engine.dimensions(), (20, 20));
        assert!(!engine.committed().is_empty());
    }

    #[test]
    fn no_source_means_no_ops() {
        let mut engine = EditEngine::new();
        assert!(engine.paint_dot(MaskTarget::Committed, 5.0, 5.0, 4.0).is_none());
        assert!(!engine.commit_scratch());
        assert!(engine.export_composite(5.0, 1).is_err());
        assert_eq!(engine.dimensions(), (0, 0));
        let mut target = RgbaImage::new(8, 8);
        assert!(engine.render(&mut target, 5.0, 1, 1.0, 0.0, 0.0).is_ok());
    }

    #[test]
    fn commit_only_grows_the_committed_mask() {
        let mut engine = loaded(60, 60);
        engine.paint_rectangle(MaskTarget::Committed, 5.0, 5.0, 20.0, 20.0);
        let before = engine.committed_snapshot();

        engine.paint_stroke(MaskTarget::Scratch, 10.0, 30.0, 50.0, 30.0, 6.0);
        engine.paint_ellipse(MaskTarget::Scratch, 0.0, 0.0, 30.0, 30.0);
        assert!(engine.commit_scratch());

        for (x, y, p) in before.enumerate_pixels() {
            if p.0[0] > 0 {
                assert!(engine.committed().alpha_at(x, y) > 0);
            }
        }
        assert!(engine.scratch().is_empty());
        assert!(!engine.commit_scratch());
    }

    #[test]
    fn committed_paint_records_margined_dirty_region() {
        let mut engine = loaded(100, 100);
        engine.paint_rectangle(MaskTarget::Committed, 20.0, 20.0, 30.0, 30.0);
        assert_eq!(engine.dirty_regions(), &[Region::new(15, 15, 20, 20)]);

        engine.paint_rectangle(MaskTarget::Committed, 0.0, 0.0, 2.0, 2.0);
        assert_eq!(engine.dirty_regions()[1], Region::new(0, 0, 7, 7));

        let mut target = RgbaImage::new(100, 100);
        engine.render(&mut target, 4.0, 1, 1.0, 0.0, 0.0).unwrap();
        assert!(engine.dirty_regions().is_empty());
    }

    #[test]
    fn render_reuses_cache_until_something_changes() {
        let mut engine = loaded(50, 50);
        let mut target = RgbaImage::new(50, 50);
        engine.paint_rectangle(MaskTarget::Committed, 10.0, 10.0, 20.0, 20.0);

        engine.render(&mut target, 6.0, 2, 1.0, 0.0, 0.0).unwrap();
        engine.render(&mut target, 6.0, 2, 1.0, 0.0, 0.0).unwrap();
        assert_eq!(engine.blur_recomputes(), 1);

        engine.render(&mut target, 8.0, 2, 1.0, 0.0, 0.0).unwrap();
        assert_eq!(engine.blur_recomputes(), 2);

        engine.paint_dot(MaskTarget::Scratch, 40.0, 40.0, 6.0);
        assert!(engine.commit_scratch());
        engine.render(&mut target, 8.0, 2, 1.0, 0.0, 0.0).unwrap();
        assert_eq!(engine.blur_recomputes(), 3);

        engine.set_high_quality(false);
        engine.render(&mut target, 8.0, 2, 1.0, 0.0, 0.0).unwrap();
        assert_eq!(engine.blur_recomputes(), 4);
    }

    #[test]
    fn empty_mask_renders_sharp_source_without_blurring() {
        let mut engine = loaded(40, 30);
        let mut target = RgbaImage::new(80, 60);
        engine.render(&mut target, 10.0, 3, 1.0, 0.0, 0.0).unwrap();
        assert_eq!(engine.blur_recomputes(), 0);

        let src = engine.source().unwrap().clone();
        for (x, y, p) in src.enumerate_pixels() {
            assert_eq!(target.get_pixel(x + 20, y + 15), p);
        }
        assert_eq!(target.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn scratch_preview_is_tinted_but_not_exported() {
        let mut engine = EditEngine::new();
        engine.load_source(RgbaImage::from_pixel(20, 20, Rgba([0, 0, 255, 255]))).unwrap();
        engine.paint_rectangle(MaskTarget::Scratch, 0.0, 0.0, 10.0, 10.0);

        let mut target = RgbaImage::new(20, 20);
        engine.render(&mut target, 5.0, 1, 1.0, 0.0, 0.0).unwrap();
        let tinted = target.get_pixel(5, 5).0;
        assert!(tinted[0] > 100 && tinted[2] < 200);
        assert_eq!(target.get_pixel(15, 15).0, [0, 0, 255, 255]);

        let out = engine.export_composite(5.0, 1).unwrap();
        assert_eq!(out.get_pixel(5, 5).0, [0, 0, 255, 255]);
        assert_eq!(engine.blur_recomputes(), 0);
    }

    #[test]
    fn export_blurs_only_inside_the_rectangle() {
        let mut engine = loaded(100, 100);
        engine.paint_rectangle(MaskTarget::Committed, 10.0, 10.0, 30.0, 30.0);
        let out = engine.export_composite(10.0, 1).unwrap();

        let src = engine.source().unwrap();
        let blurred = blur_passes(src, &pass_sigmas(10.0, 1, BlurQuality::High));
        for (x, y, p) in out.enumerate_pixels() {
            if (10..30).contains(&x) && (10..30).contains(&y) {
                assert_eq!(p, blurred.get_pixel(x, y));
            } else {
                assert_eq!(p, src.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn export_matches_render_at_native_scale() {
        let mut engine = loaded(48, 32);
        engine.paint_ellipse(MaskTarget::Committed, 4.0, 4.0, 30.0, 24.0);
        let mut target = RgbaImage::new(48, 32);
        engine.render(&mut target, 7.0, 3, 1.0, 0.0, 0.0).unwrap();
        assert_eq!(engine.export_composite(7.0, 3).unwrap(), target);
    }

    #[test]
    fn extreme_intensity_is_clamped_not_fatal() {
        let mut engine = loaded(20, 20);
        engine.paint_rectangle(MaskTarget::Committed, 2.0, 2.0, 10.0, 10.0);
        let src = engine.source().unwrap().clone();

        let out = engine.export_composite(f32::MAX, 1).unwrap();
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(out.get_pixel(15, 15), src.get_pixel(15, 15));

        let mut target = RgbaImage::new(20, 20);
        engine.render(&mut target, 1.0e6, 1, 1.0, 0.0, 0.0).unwrap();
        assert_eq!(engine.export_composite(1.0e6, 1).unwrap(), target);
    }

    #[test]
    fn abandoned_gesture_leaves_committed_mask_untouched() {
        let mut engine = loaded(40, 40);
        engine.paint_rectangle(MaskTarget::Committed, 2.0, 2.0, 8.0, 8.0);
        let before = engine.committed_snapshot();

        engine.paint_stroke(MaskTarget::Scratch, 5.0, 5.0, 35.0, 35.0, 8.0);
        engine.clear_scratch();
        assert_eq!(engine.committed_snapshot(), before);
        assert!(engine.scratch().is_empty());
    }

    #[test]
    fn restore_checks_dimensions() {
        let mut engine = loaded(30, 30);
        let blank = engine.committed_snapshot();
        engine.paint_rectangle(MaskTarget::Committed, 0.0, 0.0, 10.0, 10.0);
        engine.restore_committed(&blank).unwrap();
        assert!(engine.committed().is_empty());
        assert!(engine.restore_committed(&GrayImage::new(3, 3)).is_err());
    }

    #[test]
    fn apply_regions_and_reset() {
        let mut engine = loaded(50, 50);
        let applied = engine.apply_regions(&[Region::new(5, 5, 10, 10), Region::new(60, 60, 5, 5)]);
        assert_eq!(applied, 1);
        assert_eq!(engine.committed().coverage(), 100);
        engine.reset();
        assert!(engine.committed().is_empty());
        assert!(engine.dirty_regions().is_empty());
    }

    #[test]
    fn thumbnail_is_fitted_and_centred() {
        let mut engine = loaded(200, 100);
        engine.paint_rectangle(MaskTarget::Committed, 0.0, 0.0, 100.0, 100.0);
        let thumb = engine.thumbnail(100, 75);
        assert_eq!(thumb.dimensions(), (100, 75));
        // 200x100 fits as 100x50, leaving 12px bands top and bottom.
        assert_eq!(thumb.get_pixel(50, 5).0[3], 0);
        assert_eq!(thumb.get_pixel(50, 40).0[3], 255);
    }
}
