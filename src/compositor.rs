// ============================================================================
// BLUR COMPOSITOR — cached blurred-and-masked layer
// ============================================================================

use image::RgbaImage;
use tracing::debug;

use crate::mask::MaskSurface;
use crate::ops::blur::{BlurQuality, masked_blur, pass_sigmas};

/// Cached layer and the parameters it was built for.
struct BlurCache {
    layer: RgbaImage,
    intensity: f32,
    passes: u32,
    mask_generation: u64,
}

/// Produces the layer drawn over the sharp image: blurred source where the
/// committed mask is set, transparent elsewhere.
///
/// The cache is an optimization only. It is reused while the intensity, the
/// effective pass count and the mask generation all match, and dropped on any
/// explicit invalidation.
#[derive(Default)]
pub struct BlurCompositor {
    cache: Option<BlurCache>,
    quality: BlurQuality,
    recomputes: u64,
}

impl BlurCompositor {
    pub fn new(quality: BlurQuality) -> Self {
        Self { cache: None, quality, recomputes: 0 }
    }

    pub fn quality(&self) -> BlurQuality {
        self.quality
    }

    /// Switching algorithms always drops the cache.
    pub fn set_quality(&mut self, quality: BlurQuality) {
        self.quality = quality;
        self.invalidate();
    }

    /// Mark the cache stale.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    pub fn is_cached_for(&self, intensity: f32, passes: u32, mask: &MaskSurface) -> bool {
        let passes = self.quality.effective_passes(passes);
        self.cache.as_ref().is_some_and(|c| {
            c.intensity.to_bits() == intensity.to_bits()
                && c.passes == passes
                && c.mask_generation == mask.generation()
        })
    }

    /// Number of times a blur layer was computed for the cache.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }

    /// Cached layer for the given parameters, recomputing when stale.
    pub fn layer(&mut self, source: &RgbaImage, mask: &MaskSurface, intensity: f32, passes: u32) -> &RgbaImage {
        if !self.is_cached_for(intensity, passes, mask) {
            self.cache = None;
        }
        let quality = self.quality;
        let recomputes = &mut self.recomputes;
        let cache = self.cache.get_or_insert_with(|| {
            *recomputes += 1;
            debug!(intensity, passes, recomputes = *recomputes, "blur cache rebuilt");
            BlurCache {
                layer: build_layer(quality, source, mask, intensity, passes),
                intensity,
                passes: quality.effective_passes(passes),
                mask_generation: mask.generation(),
            }
        });
        &cache.layer
    }

    /// Build the layer without touching the cache.
    pub fn build_layer(&self, source: &RgbaImage, mask: &MaskSurface, intensity: f32, passes: u32) -> RgbaImage {
        build_layer(self.quality, source, mask, intensity, passes)
    }
}

fn build_layer(quality: BlurQuality, source: &RgbaImage, mask: &MaskSurface, intensity: f32, passes: u32) -> RgbaImage {
    let sigmas = pass_sigmas(intensity, passes, quality);
    match mask.visible_bounds() {
        Some(bounds) => masked_blur(source, mask.pixels(), bounds, &sigmas),
        None => RgbaImage::new(source.width(), source.height()),
    }
}
