// ============================================================================
// RASTER SURFACE — drawing capability the compositor renders through
// ============================================================================

use image::{GrayImage, Rgba, RgbaImage};
use rayon::prelude::*;

/// Image-to-viewport placement: the image is centred in the viewport (when
/// it fits), then scaled and shifted by the pan offset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub origin_x: f32,
    pub origin_y: f32,
    pub scale: f32,
}

impl ViewTransform {
    /// 1:1 placement at the surface origin.
    pub fn identity() -> Self {
        Self { origin_x: 0.0, origin_y: 0.0, scale: 1.0 }
    }

    pub fn centered(
        viewport: (u32, u32),
        image: (u32, u32),
        scale: f32,
        offset_x: f32,
        offset_y: f32,
    ) -> Self {
        let scaled_w = image.0 as f32 * scale;
        let scaled_h = image.1 as f32 * scale;
        Self {
            origin_x: ((viewport.0 as f32 - scaled_w) / 2.0).max(0.0) + offset_x,
            origin_y: ((viewport.1 as f32 - scaled_h) / 2.0).max(0.0) + offset_y,
            scale,
        }
    }

    /// Viewport position → continuous image position.
    pub fn to_image(&self, vx: f32, vy: f32) -> (f32, f32) {
        ((vx - self.origin_x) / self.scale, (vy - self.origin_y) / self.scale)
    }

    /// Image pixel sampled for the viewport pixel `(vx, vy)`, if any.
    fn sample(&self, vx: u32, vy: u32, w: u32, h: u32) -> Option<(u32, u32)> {
        let (ix, iy) = self.to_image(vx as f32 + 0.5, vy as f32 + 0.5);
        if ix < 0.0 || iy < 0.0 {
            return None;
        }
        let (ix, iy) = (ix.floor() as u32, iy.floor() as u32);
        (ix < w && iy < h).then_some((ix, iy))
    }
}

/// The drawing capability the compositor needs from a render target.
pub trait RasterSurface {
    fn surface_size(&self) -> (u32, u32);

    /// Set every pixel to transparent.
    fn clear_surface(&mut self);

    /// Source-over `layer` through `view` (nearest-neighbour sampling).
    fn draw_image(&mut self, layer: &RgbaImage, view: &ViewTransform);

    /// Source-over a solid `color` wherever `mask` is non-zero, scaled by
    /// `opacity`.
    fn draw_mask_tint(&mut self, mask: &GrayImage, color: Rgba<u8>, opacity: f32, view: &ViewTransform);

    /// Copy of the current pixels.
    fn read_pixels(&self) -> RgbaImage;
}

impl RasterSurface for RgbaImage {
    fn surface_size(&self) -> (u32, u32) {
        self.dimensions()
    }

    fn clear_surface(&mut self) {
        self.fill(0);
    }

    fn draw_image(&mut self, layer: &RgbaImage, view: &ViewTransform) {
        let (lw, lh) = layer.dimensions();
        for_each_mapped(self, view, lw, lh, |dst, ix, iy| {
            let src = layer.get_pixel(ix, iy).0;
            blend_over(dst, src, 1.0);
        });
    }

    fn draw_mask_tint(&mut self, mask: &GrayImage, color: Rgba<u8>, opacity: f32, view: &ViewTransform) {
        let (mw, mh) = mask.dimensions();
        let opacity = opacity.clamp(0.0, 1.0);
        for_each_mapped(self, view, mw, mh, |dst, ix, iy| {
            let m = mask.get_pixel(ix, iy).0[0];
            if m > 0 {
                let a = (color.0[3] as u32 * m as u32 / 255) as u8;
                blend_over(dst, [color.0[0], color.0[1], color.0[2], a], opacity);
            }
        });
    }

    fn read_pixels(&self) -> RgbaImage {
        self.clone()
    }
}

/// Visit every target pixel that maps inside a `src_w × src_h` image.
fn for_each_mapped<F>(target: &mut RgbaImage, view: &ViewTransform, src_w: u32, src_h: u32, f: F)
where
    F: Fn(&mut [u8], u32, u32) + Sync,
{
    if !(view.scale.is_finite() && view.scale > 0.0) {
        return;
    }
    let (tw, th) = target.dimensions();
    if tw == 0 || th == 0 {
        return;
    }
    let stride = tw as usize * 4;
    let raw: &mut [u8] = &mut *target;
    raw.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        for x in 0..tw {
            if let Some((ix, iy)) = view.sample(x, y as u32, src_w, src_h) {
                let off = x as usize * 4;
                f(&mut row[off..off + 4], ix, iy);
            }
        }
    });
}

/// Straight-alpha source-over. A fully opaque source replaces `dst` exactly.
pub fn blend_over(dst: &mut [u8], src: [u8; 4], opacity: f32) {
    let sa = src[3] as f32 / 255.0 * opacity;
    if sa <= 0.0 {
        return;
    }
    if sa >= 1.0 {
        dst.copy_from_slice(&src);
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let oa = sa + da * (1.0 - sa);
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / oa;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (oa * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centering_only_applies_when_image_fits() {
        let v = ViewTransform::centered((200, 100), (100, 50), 1.0, 0.0, 0.0);
        assert_eq!((v.origin_x, v.origin_y), (50.0, 25.0));
        let v = ViewTransform::centered((200, 100), (100, 50), 4.0, 3.0, -2.0);
        assert_eq!((v.origin_x, v.origin_y), (3.0, -2.0));
    }

    #[test]
    fn draw_image_scales_with_nearest_sampling() {
        let mut src = RgbaImage::new(2, 2);
        src.put_pixel(1, 1, Rgba([10, 20, 30, 255]));
        let mut target = RgbaImage::new(4, 4);
        let view = ViewTransform { origin_x: 0.0, origin_y: 0.0, scale: 2.0 };
        target.draw_image(&src, &view);
        assert_eq!(target.get_pixel(3, 3).0, [10, 20, 30, 255]);
        assert_eq!(target.get_pixel(2, 2).0, [10, 20, 30, 255]);
        assert_eq!(target.get_pixel(1, 1).0[3], 0);
    }

    #[test]
    fn half_opacity_tint_mixes_colours() {
        let mut target = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 255, 255]));
        let mut mask = GrayImage::new(1, 1);
        mask.put_pixel(0, 0, image::Luma([255]));
        target.draw_mask_tint(&mask, Rgba([255, 0, 0, 255]), 0.5, &ViewTransform::identity());
        let p = target.get_pixel(0, 0).0;
        assert!((127..=128).contains(&p[0]));
        assert!((127..=128).contains(&p[2]));
        assert_eq!(p[3], 255);
    }

    #[test]
    fn opaque_source_replaces_exactly() {
        let mut dst = [1u8, 2, 3, 40];
        blend_over(&mut dst, [200, 100, 50, 255], 1.0);
        assert_eq!(dst, [200, 100, 50, 255]);
        blend_over(&mut dst, [0, 0, 0, 0], 1.0);
        assert_eq!(dst, [200, 100, 50, 255]);
    }
}
