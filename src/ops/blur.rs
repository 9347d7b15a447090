// ============================================================================
// BLUR — separable Gaussian passes and mask-shaped blur layers
// ============================================================================

use image::{GrayImage, RgbaImage, imageops};
use rayon::prelude::*;

use crate::region::Region;

/// Blur algorithm selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlurQuality {
    /// `passes` sequential blurs of `intensity / passes` each.
    #[default]
    High,
    /// One blur at full `intensity`; the pass count is ignored.
    Low,
}

impl BlurQuality {
    pub fn from_high_quality(enabled: bool) -> Self {
        if enabled { BlurQuality::High } else { BlurQuality::Low }
    }

    /// Pass count that actually runs for a requested count.
    pub fn effective_passes(self, passes: u32) -> u32 {
        match self {
            BlurQuality::High => passes.max(1),
            BlurQuality::Low => 1,
        }
    }
}

/// Per-pass sigmas for a blur of total strength `intensity`.
pub fn pass_sigmas(intensity: f32, passes: u32, quality: BlurQuality) -> Vec<f32> {
    let intensity = if intensity.is_finite() { intensity.max(0.0) } else { 0.0 };
    let n = quality.effective_passes(passes);
    vec![intensity / n as f32; n as usize]
}

/// Longest kernel radius worth running on a `width × height` image. With
/// clamped edges a wider kernel only averages more copies of the border.
pub fn radius_limit(width: u32, height: u32) -> usize {
    width.max(height).max(1) as usize
}

/// Total distance (in pixels) a blur plan can pull colour from, with every
/// pass capped at `limit`.
pub fn blur_reach(sigmas: &[f32], limit: usize) -> u32 {
    let reach = sigmas
        .iter()
        .fold(0usize, |acc, &s| acc.saturating_add(kernel_radius(s, limit)));
    u32::try_from(reach).unwrap_or(u32::MAX)
}

/// Run every pass of the plan over `src`.
pub fn blur_passes(src: &RgbaImage, sigmas: &[f32]) -> RgbaImage {
    blur_passes_limited(src, sigmas, radius_limit(src.width(), src.height()))
}

fn blur_passes_limited(src: &RgbaImage, sigmas: &[f32], limit: usize) -> RgbaImage {
    let mut out = src.clone();
    for &sigma in sigmas {
        if kernel_radius(sigma, limit) > 0 {
            out = gaussian_blur_limited(&out, sigma, limit);
        }
    }
    out
}

/// Blurred copy of `source`, kept only where `mask` is non-zero.
/// Everything outside the mask is fully transparent.
///
/// Only the mask's bounding box (padded by the plan's reach) is blurred, so
/// small redactions on large pages stay cheap. The padding makes the result
/// identical to blurring the whole image.
pub fn masked_blur(source: &RgbaImage, mask: &GrayImage, bounds: Region, sigmas: &[f32]) -> RgbaImage {
    let (w, h) = source.dimensions();
    let mut out = RgbaImage::new(w, h);
    if bounds.is_empty() || mask.dimensions() != (w, h) {
        return out;
    }

    // Same cap as a whole-image blur, so the crop gives identical pixels.
    let limit = radius_limit(w, h);
    let pad = blur_reach(sigmas, limit);
    let crop_x = bounds.x.saturating_sub(pad);
    let crop_y = bounds.y.saturating_sub(pad);
    let crop_x2 = bounds.right().saturating_add(pad).min(w);
    let crop_y2 = bounds.bottom().saturating_add(pad).min(h);
    let crop_w = crop_x2 - crop_x;
    let crop_h = crop_y2 - crop_y;

    let sub = imageops::crop_imm(source, crop_x, crop_y, crop_w, crop_h).to_image();
    let blurred = blur_passes_limited(&sub, sigmas, limit);
    let blur_raw = blurred.as_raw();
    let blur_stride = crop_w as usize * 4;
    let mask_raw = mask.as_raw();
    let mask_stride = w as usize;
    let out_stride = w as usize * 4;
    let (x0, x1) = (bounds.x as usize, bounds.right() as usize);
    let y0 = bounds.y as usize;

    let raw: &mut [u8] = &mut out;
    raw[y0 * out_stride..bounds.bottom() as usize * out_stride]
        .par_chunks_mut(out_stride)
        .enumerate()
        .for_each(|(i, row_out)| {
            let y = y0 + i;
            let mask_row = &mask_raw[y * mask_stride..(y + 1) * mask_stride];
            let local_y = y - crop_y as usize;
            for x in x0..x1 {
                let m = mask_row[x] as u32;
                if m == 0 {
                    continue;
                }
                let local_x = x - crop_x as usize;
                let src_off = local_y * blur_stride + local_x * 4;
                let dst_off = x * 4;
                row_out[dst_off..dst_off + 3].copy_from_slice(&blur_raw[src_off..src_off + 3]);
                row_out[dst_off + 3] = ((blur_raw[src_off + 3] as u32 * m + 127) / 255) as u8;
            }
        });
    out
}

// ---------------------------------------------------------------------------
//  Parallel separable Gaussian blur (rayon)
// ---------------------------------------------------------------------------

fn kernel_radius(sigma: f32, limit: usize) -> usize {
    if !(sigma.is_finite() && sigma > 0.0) {
        return 0;
    }
    // `as` saturates, so huge sigmas land on the limit.
    ((sigma * 3.0).ceil() as usize).min(limit)
}

/// Build a 1-D Gaussian kernel truncated at ceil(3*sigma), never wider than
/// `limit` on either side.
fn build_gaussian_kernel(sigma: f32, limit: usize) -> Vec<f32> {
    let radius = kernel_radius(sigma, limit);
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    let inv = 1.0 / kernel.iter().sum::<f32>();
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// Rayon-parallelized separable Gaussian blur with clamped edges.
pub fn parallel_gaussian_blur(src: &RgbaImage, sigma: f32) -> RgbaImage {
    gaussian_blur_limited(src, sigma, radius_limit(src.width(), src.height()))
}

fn gaussian_blur_limited(src: &RgbaImage, sigma: f32, limit: usize) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 {
        return src.clone();
    }

    let kernel = build_gaussian_kernel(sigma, limit);
    let radius = kernel.len() / 2;
    let buf_in: Vec<f32> = src.as_raw().iter().map(|&b| b as f32).collect();
    let pixel_count = buf_in.len();

    // --- Horizontal pass (parallel by row) ---
    let mut buf_h = vec![0.0f32; pixel_count];
    buf_h.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        let row_in = &buf_in[y * w * 4..(y + 1) * w * 4];
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x + ki).saturating_sub(radius).min(w - 1);
                let idx = sx * 4;
                for c in 0..4 {
                    acc[c] += row_in[idx + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    // --- Vertical pass (parallel by row) ---
    let mut buf_v = vec![0.0f32; pixel_count];
    buf_v.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y + ki).saturating_sub(radius).min(h - 1);
                let idx = sy * w * 4 + x * 4;
                for c in 0..4 {
                    acc[c] += buf_h[idx + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    let mut out = src.clone();
    for (dst, &v) in out.iter_mut().zip(buf_v.iter()) {
        *dst = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};

    fn stripes(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, _| {
            if (x / 4) % 2 == 0 { Rgba([255, 255, 255, 255]) } else { Rgba([0, 0, 0, 255]) }
        })
    }

    #[test]
    fn kernel_is_normalized() {
        let k = build_gaussian_kernel(2.5, 100);
        assert_eq!(k.len(), 2 * 8 + 1);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        assert_eq!(build_gaussian_kernel(0.0, 100), vec![1.0]);
    }

    #[test]
    fn oversized_sigma_is_capped_to_the_image() {
        assert_eq!(kernel_radius(f32::MAX, 40), 40);
        assert_eq!(kernel_radius(1.0e6, 40), 40);
        assert_eq!(build_gaussian_kernel(1.0e30, 40).len(), 81);
        assert_eq!(blur_reach(&[f32::MAX; 3], 40), 120);

        let src = stripes(24, 16);
        let mut mask = GrayImage::new(24, 16);
        for y in 4..12 {
            for x in 4..12 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let sigmas = [f32::MAX];
        let full = blur_passes(&src, &sigmas);
        let layer = masked_blur(&src, &mask, Region::new(4, 4, 8, 8), &sigmas);
        assert_eq!(layer.get_pixel(6, 6), full.get_pixel(6, 6));
        assert_eq!(layer.get_pixel(20, 2).0[3], 0);
    }

    #[test]
    fn flat_image_is_unchanged_by_blur() {
        let src = RgbaImage::from_pixel(16, 16, Rgba([90, 120, 200, 255]));
        assert_eq!(parallel_gaussian_blur(&src, 3.0), src);
    }

    #[test]
    fn blur_softens_edges() {
        let src = stripes(32, 4);
        let out = parallel_gaussian_blur(&src, 2.0);
        let p = out.get_pixel(4, 1).0[0];
        assert!(p > 0 && p < 255);
    }

    #[test]
    fn low_quality_ignores_pass_count() {
        assert_eq!(pass_sigmas(12.0, 4, BlurQuality::Low), vec![12.0]);
        assert_eq!(pass_sigmas(12.0, 4, BlurQuality::High), vec![3.0; 4]);
        assert_eq!(pass_sigmas(-1.0, 0, BlurQuality::High), vec![0.0]);
    }

    #[test]
    fn masked_blur_matches_full_blur_inside_mask() {
        let src = stripes(64, 48);
        let mut mask = GrayImage::new(64, 48);
        for y in 20..30 {
            for x in 20..30 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let sigmas = pass_sigmas(6.0, 3, BlurQuality::High);
        let full = blur_passes(&src, &sigmas);
        let layer = masked_blur(&src, &mask, Region::new(20, 20, 10, 10), &sigmas);

        for (x, y, p) in layer.enumerate_pixels() {
            if (20..30).contains(&x) && (20..30).contains(&y) {
                assert_eq!(p, full.get_pixel(x, y), "mismatch at {x},{y}");
            } else {
                assert_eq!(p.0[3], 0);
            }
        }
    }
}
