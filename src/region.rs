// ============================================================================
// REGIONS — axis-aligned pixel rectangles and dirty-region bookkeeping
// ============================================================================

/// Dirty regions kept before the merge pass kicks in.
pub const MAX_DIRTY_REGIONS: usize = 20;

/// Extra pixels added around every committed paint operation to cover
/// edge bleed.
pub const DIRTY_MARGIN: f32 = 5.0;

/// Axis-aligned rectangle in image space. `x + width` / `y + height` are
/// exclusive edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Build a region from float bounds, clamped to a `bound_w × bound_h`
    /// image. Returns `None` when nothing of it lies inside the image.
    pub fn from_f32_clamped(
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        bound_w: u32,
        bound_h: u32,
    ) -> Option<Self> {
        if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
            return None;
        }
        let x0 = x.floor().max(0.0).min(bound_w as f32) as u32;
        let y0 = y.floor().max(0.0).min(bound_h as f32) as u32;
        let x1 = (x + width).ceil().max(0.0).min(bound_w as f32) as u32;
        let y1 = (y + height).ceil().max(0.0).min(bound_h as f32) as u32;
        let region = Self::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0));
        (!region.is_empty()).then_some(region)
    }

    /// Region spanning two corner points (order-independent), expanded by
    /// `margin` on every side and clamped.
    pub fn from_corners(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        margin: f32,
        bound_w: u32,
        bound_h: u32,
    ) -> Option<Self> {
        let min_x = x1.min(x2) - margin;
        let min_y = y1.min(y2) - margin;
        let w = (x1 - x2).abs() + margin * 2.0;
        let h = (y1 - y2).abs() + margin * 2.0;
        Self::from_f32_clamped(min_x, min_y, w, h, bound_w, bound_h)
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Strict overlap: touching edges do not count.
    pub fn intersects(&self, other: &Region) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Bounding box of both regions.
    pub fn union(&self, other: &Region) -> Region {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let r = self.right().max(other.right());
        let b = self.bottom().max(other.bottom());
        Region::new(x, y, r - x, b - y)
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

// ---------------------------------------------------------------------------
//  Dirty region list
// ---------------------------------------------------------------------------

/// Rectangles of committed-mask area changed since the last composite.
///
/// Only a hint for incremental work; an empty list never means "nothing
/// changed" to anything that needs correctness.
#[derive(Clone, Debug)]
pub struct DirtyRegions {
    regions: Vec<Region>,
    cap: usize,
}

impl Default for DirtyRegions {
    fn default() -> Self {
        Self::new(MAX_DIRTY_REGIONS)
    }
}

impl DirtyRegions {
    pub fn new(cap: usize) -> Self {
        Self {
            regions: Vec::new(),
            cap: cap.max(1),
        }
    }

    /// Record a region. Empty regions are ignored. Exceeding the cap runs the
    /// merge pass.
    pub fn push(&mut self, region: Region) {
        if region.is_empty() {
            return;
        }
        self.regions.push(region);
        if self.regions.len() > self.cap {
            self.merge_overlapping();
            self.enforce_cap();
        }
    }

    pub fn push_opt(&mut self, region: Option<Region>) {
        if let Some(region) = region {
            self.push(region);
        }
    }

    /// Merge the first overlapping pair found, repeatedly, until the list is
    /// back under the cap or no pair overlaps.
    fn merge_overlapping(&mut self) {
        while self.regions.len() > self.cap {
            let Some((i, j)) = self.find_overlapping_pair() else { break };
            let merged = self.regions[i].union(&self.regions[j]);
            self.regions[i] = merged;
            self.regions.remove(j);
        }
    }

    fn find_overlapping_pair(&self) -> Option<(usize, usize)> {
        for i in 0..self.regions.len() {
            for j in (i + 1)..self.regions.len() {
                if self.regions[i].intersects(&self.regions[j]) {
                    return Some((i, j));
                }
            }
        }
        None
    }

    /// Disjoint leftovers: fold the pair whose union adds the least area.
    fn enforce_cap(&mut self) {
        while self.regions.len() > self.cap {
            let mut best = (0, 1);
            let mut best_growth = u64::MAX;
            for i in 0..self.regions.len() {
                for j in (i + 1)..self.regions.len() {
                    let a = &self.regions[i];
                    let b = &self.regions[j];
                    let growth = a.union(b).area().saturating_sub(a.area() + b.area());
                    if growth < best_growth {
                        best_growth = growth;
                        best = (i, j);
                    }
                }
            }
            let merged = self.regions[best.0].union(&self.regions[best.1]);
            self.regions[best.0] = merged;
            self.regions.remove(best.1);
        }
    }

    pub fn clear(&mut self) {
        self.regions.clear();
    }

    /// Drain the accumulated regions.
    pub fn take(&mut self) -> Vec<Region> {
        std::mem::take(&mut self.regions)
    }

    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Bounding box of every pending region.
    pub fn bounds(&self) -> Option<Region> {
        self.regions.iter().copied().reduce(|acc, r| acc.union(&r))
    }
}
