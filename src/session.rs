// ============================================================================
// SESSION — application state driving the engine from pointer input
// ============================================================================

use std::path::Path;
use std::time::{Duration, Instant};

use image::RgbaImage;
use tracing::{debug, info};
use uuid::Uuid;

use crate::components::history::HistoryStore;
use crate::engine::{EditEngine, MaskTarget};
use crate::error::{RedactError, Result};
use crate::io::{self, PendingLoad, SaveFormat};
use crate::ops::detect::{PageSource, SensitiveDetector};
use crate::settings::RedactSettings;
use crate::surface::{RasterSurface, ViewTransform};

/// Active drawing tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Brush,
    Rectangle,
    Ellipse,
}

/// Zoom and pan of the canvas view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewState {
    pub viewport: (u32, u32),
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self { viewport: (0, 0), scale: 1.0, offset_x: 0.0, offset_y: 0.0 }
    }
}

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 5.0;
/// Scale factor per wheel notch.
pub const WHEEL_ZOOM_STEP: f32 = 1.1;
/// Scale factor per zoom button press.
pub const BUTTON_ZOOM_STEP: f32 = 1.2;

/// Pointer state of the gesture in progress, in image coordinates.
#[derive(Clone, Copy, Debug)]
struct Gesture {
    start: (f32, f32),
    last: (f32, f32),
}

// ============================================================================
// FRAME SCHEDULER
// ============================================================================

/// Coalesces render requests and throttles them to a minimum interval.
/// While a gesture is active every pending request renders immediately.
#[derive(Debug)]
pub struct FrameScheduler {
    min_interval: Duration,
    pending: bool,
    last_frame: Option<Instant>,
}

impl FrameScheduler {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, pending: false, last_frame: None }
    }

    /// Ask for a frame. Returns `false` if one was already pending.
    pub fn request(&mut self) -> bool {
        if self.pending {
            return false;
        }
        self.pending = true;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Whether a frame should be drawn at `now`. A throttled request stays
    /// pending for the next poll.
    pub fn poll(&mut self, now: Instant, gesture_active: bool) -> bool {
        if !self.pending {
            return false;
        }
        let due = gesture_active
            || self
                .last_frame
                .is_none_or(|last| now.saturating_duration_since(last) >= self.min_interval);
        if due {
            self.pending = false;
            self.last_frame = Some(now);
        }
        due
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Everything the interactive front end needs: the engine, its history,
/// tool and view state, the frame scheduler and the load in flight.
pub struct Session {
    engine: EditEngine,
    history: HistoryStore,
    settings: RedactSettings,
    tool: Tool,
    view: ViewState,
    gesture: Option<Gesture>,
    frames: FrameScheduler,
    pending_load: Option<PendingLoad>,
    document_id: Option<Uuid>,
    pages: Option<Box<dyn PageSource>>,
    current_page: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(RedactSettings::default())
    }
}

impl Session {
    pub fn new(settings: RedactSettings) -> Self {
        let mut engine = EditEngine::new();
        engine.set_high_quality(settings.high_quality);
        let history = HistoryStore::new(settings.max_history).with_memory_limit(settings.history_memory_limit());
        let frames = FrameScheduler::new(Duration::from_millis(settings.min_frame_interval_ms));
        Self {
            engine,
            history,
            settings,
            tool: Tool::default(),
            view: ViewState::default(),
            gesture: None,
            frames,
            pending_load: None,
            document_id: None,
            pages: None,
            current_page: 0,
        }
    }

    pub fn engine(&self) -> &EditEngine {
        &self.engine
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn settings(&self) -> &RedactSettings {
        &self.settings
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn brush_size(&self) -> f32 {
        self.settings.brush_size
    }

    pub fn set_brush_size(&mut self, size: f32) {
        if size.is_finite() && size > 0.0 {
            self.settings.brush_size = size;
        }
    }

    pub fn set_blur(&mut self, intensity: f32, passes: u32) {
        self.settings.blur_intensity = if intensity.is_finite() { intensity.max(0.0) } else { 0.0 };
        self.settings.blur_passes = passes.max(1);
        self.request_frame();
    }

    pub fn set_high_quality(&mut self, enabled: bool) {
        self.settings.high_quality = enabled;
        self.engine.set_high_quality(enabled);
        self.request_frame();
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn set_view(&mut self, viewport: (u32, u32), scale: f32, offset_x: f32, offset_y: f32) {
        if scale.is_finite() && scale > 0.0 {
            self.view.scale = scale;
        }
        self.view.viewport = viewport;
        self.view.offset_x = offset_x;
        self.view.offset_y = offset_y;
        self.request_frame();
    }

    pub fn zoom_in(&mut self) {
        self.view.scale = (self.view.scale * BUTTON_ZOOM_STEP).min(MAX_ZOOM);
        self.request_frame();
    }

    pub fn zoom_out(&mut self) {
        self.view.scale = (self.view.scale / BUTTON_ZOOM_STEP).max(MIN_ZOOM);
        self.request_frame();
    }

    pub fn reset_zoom(&mut self) {
        self.view.scale = 1.0;
        self.view.offset_x = 0.0;
        self.view.offset_y = 0.0;
        self.request_frame();
    }

    /// Wheel zoom that keeps the image point under `(cx, cy)` fixed.
    pub fn zoom_at(&mut self, cx: f32, cy: f32, zoom_in: bool) {
        if !self.engine.has_source() {
            return;
        }
        let before = self.view_transform().to_image(cx, cy);
        self.view.scale = if zoom_in {
            (self.view.scale * WHEEL_ZOOM_STEP).min(MAX_ZOOM)
        } else {
            (self.view.scale / WHEEL_ZOOM_STEP).max(MIN_ZOOM)
        };
        // Centering depends on the new scale, so measure the drift and pan it away.
        let after = self.view_transform().to_image(cx, cy);
        self.view.offset_x += (after.0 - before.0) * self.view.scale;
        self.view.offset_y += (after.1 - before.1) * self.view.scale;
        self.request_frame();
    }

    /// Pan the view by a viewport-space delta.
    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.view.offset_x += dx;
        self.view.offset_y += dy;
        self.request_frame();
    }

    pub fn document_id(&self) -> Option<Uuid> {
        self.document_id
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Make `image` the current document. History restarts with one entry.
    pub fn load_image(&mut self, image: RgbaImage) -> Result<(u32, u32)> {
        let dims = self.adopt_source(image)?;
        self.pages = None;
        self.current_page = 0;
        Ok(dims)
    }

    /// Decode and load a file on the calling thread.
    pub fn open_path(&mut self, path: &Path) -> Result<(u32, u32)> {
        let image = io::load_image_sync(path, self.settings.max_dimension)?;
        self.load_image(image)
    }

    /// Start decoding `path` in the background.
    pub fn begin_load(&mut self, path: &Path) -> Result<()> {
        if self.pending_load.is_some() {
            return Err(RedactError::LoadInProgress);
        }
        self.pending_load = Some(io::spawn_load(path, self.settings.max_dimension));
        Ok(())
    }

    pub fn is_loading(&self) -> bool {
        self.pending_load.is_some()
    }

    /// Adopt a finished background load. `None` while it is still running
    /// or when nothing is loading.
    pub fn poll_load(&mut self) -> Option<Result<(u32, u32)>> {
        let result = self.pending_load.as_ref()?.try_take()?;
        self.pending_load = None;
        Some(result.and_then(|image| self.load_image(image)))
    }

    /// Block until the background load finishes and adopt it.
    pub fn wait_load(&mut self) -> Result<(u32, u32)> {
        let pending = self
            .pending_load
            .take()
            .ok_or_else(|| RedactError::InvalidInput("no load in progress".into()))?;
        let image = pending.wait()?;
        self.load_image(image)
    }

    fn adopt_source(&mut self, image: RgbaImage) -> Result<(u32, u32)> {
        let dims = self.engine.load_source(image)?;
        self.gesture = None;
        self.history.reset();
        self.push_history();
        self.document_id = Some(Uuid::new_v4());
        self.request_frame();
        Ok(dims)
    }

    // ------------------------------------------------------------------------
    // Paged documents
    // ------------------------------------------------------------------------

    /// Open a paged document at page 1. Returns the page count.
    pub fn open_pages(&mut self, pages: Box<dyn PageSource>) -> Result<usize> {
        let total = pages.page_count();
        if total == 0 {
            return Err(RedactError::InvalidInput("document has no pages".into()));
        }
        let image = pages.rasterize_page(1)?;
        self.adopt_source(image)?;
        self.pages = Some(pages);
        self.current_page = 1;
        info!(total, "paged document opened");
        Ok(total)
    }

    /// `(current, total)` when a paged document is open.
    pub fn page(&self) -> Option<(usize, usize)> {
        self.pages.as_ref().map(|p| (self.current_page, p.page_count()))
    }

    pub fn next_page(&mut self) -> Result<bool> {
        self.go_to_page(self.current_page + 1)
    }

    pub fn prev_page(&mut self) -> Result<bool> {
        if self.current_page <= 1 {
            return Ok(false);
        }
        self.go_to_page(self.current_page - 1)
    }

    fn go_to_page(&mut self, page: usize) -> Result<bool> {
        let Some(pages) = self.pages.as_ref() else {
            return Ok(false);
        };
        if page == 0 || page > pages.page_count() {
            return Ok(false);
        }
        let image = pages.rasterize_page(page)?;
        self.adopt_source(image)?;
        self.current_page = page;
        debug!(page, "page changed");
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Pointer gestures
    // ------------------------------------------------------------------------

    fn view_transform(&self) -> ViewTransform {
        ViewTransform::centered(
            self.view.viewport,
            self.engine.dimensions(),
            self.view.scale,
            self.view.offset_x,
            self.view.offset_y,
        )
    }

    /// Viewport position → image position, clamped to the last pixel.
    pub fn canvas_to_image(&self, cx: f32, cy: f32) -> Option<(f32, f32)> {
        if !self.engine.has_source() {
            return None;
        }
        let (w, h) = self.engine.dimensions();
        let (ix, iy) = self.view_transform().to_image(cx, cy);
        let max_x = (w as f32 - 1.0).max(0.0);
        let max_y = (h as f32 - 1.0).max(0.0);
        Some((ix.clamp(0.0, max_x), iy.clamp(0.0, max_y)))
    }

    pub fn is_drawing(&self) -> bool {
        self.gesture.is_some()
    }

    pub fn pointer_down(&mut self, cx: f32, cy: f32) {
        let Some(pos) = self.canvas_to_image(cx, cy) else { return };
        self.engine.clear_scratch();
        self.gesture = Some(Gesture { start: pos, last: pos });
        if self.tool == Tool::Brush {
            self.engine.paint_dot(MaskTarget::Scratch, pos.0, pos.1, self.settings.brush_size);
        }
        self.request_frame();
    }

    pub fn pointer_move(&mut self, cx: f32, cy: f32) {
        let Some(gesture) = self.gesture else { return };
        let Some(pos) = self.canvas_to_image(cx, cy) else { return };
        let (sx, sy) = gesture.start;
        match self.tool {
            Tool::Brush => {
                let (lx, ly) = gesture.last;
                self.engine
                    .paint_stroke(MaskTarget::Scratch, lx, ly, pos.0, pos.1, self.settings.brush_size);
            }
            Tool::Rectangle => {
                self.engine.clear_scratch();
                self.engine.paint_rectangle(MaskTarget::Scratch, sx, sy, pos.0, pos.1);
            }
            Tool::Ellipse => {
                self.engine.clear_scratch();
                self.engine.paint_ellipse(MaskTarget::Scratch, sx, sy, pos.0, pos.1);
            }
        }
        self.gesture = Some(Gesture { last: pos, ..gesture });
        self.request_frame();
    }

    /// End the gesture at `(cx, cy)` and commit it. Returns whether the
    /// committed mask changed (and a history entry was pushed).
    pub fn pointer_up(&mut self, cx: f32, cy: f32) -> bool {
        let Some(gesture) = self.gesture else { return false };
        let end = self.canvas_to_image(cx, cy);
        if end.is_some_and(|pos| pos != gesture.last) {
            self.pointer_move(cx, cy);
        }
        self.gesture = None;
        let changed = self.engine.commit_scratch();
        if changed {
            self.push_history();
        }
        self.request_frame();
        changed
    }

    /// Abandon the gesture without committing.
    pub fn pointer_leave(&mut self) {
        if self.gesture.take().is_some() {
            self.engine.clear_scratch();
            self.request_frame();
        }
    }

    // ------------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------------

    fn push_history(&mut self) {
        let thumbnail = self
            .engine
            .thumbnail(self.settings.thumbnail_width, self.settings.thumbnail_height);
        self.history.push(self.engine.committed_snapshot(), thumbnail);
    }

    pub fn undo(&mut self) -> Result<()> {
        let mask = self.history.undo()?;
        self.engine.restore_committed(mask)?;
        self.request_frame();
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        let mask = self.history.redo()?;
        self.engine.restore_committed(mask)?;
        self.request_frame();
        Ok(())
    }

    pub fn go_to(&mut self, index: usize) -> Result<()> {
        let mask = self.history.go_to(index)?;
        self.engine.restore_committed(mask)?;
        self.request_frame();
        Ok(())
    }

    /// Drop every redaction and restart history from a clean entry.
    pub fn clear_all(&mut self) {
        if !self.engine.has_source() {
            return;
        }
        self.gesture = None;
        self.engine.reset();
        self.history.reset();
        self.push_history();
        self.request_frame();
    }

    /// Run `detector` and redact what it finds. Returns the number of
    /// regions applied.
    pub fn detect_sensitive(&mut self, detector: &dyn SensitiveDetector) -> usize {
        let Some(source) = self.engine.source() else { return 0 };
        let regions = detector.detect(source);
        let applied = self.engine.apply_regions(&regions);
        if applied > 0 {
            self.push_history();
            self.request_frame();
        }
        info!(found = regions.len(), applied, "sensitive regions applied");
        applied
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    pub fn export(&self) -> Result<RgbaImage> {
        self.engine
            .export_composite(self.settings.blur_intensity, self.settings.blur_passes)
    }

    /// Export and write to `path`, format taken from its extension.
    pub fn export_to(&self, path: &Path, quality: u8) -> Result<SaveFormat> {
        let image = self.export()?;
        let format = SaveFormat::for_path(path);
        io::encode_and_write(&image, path, format, quality)?;
        info!(path = %path.display(), ?format, "exported");
        Ok(format)
    }

    pub fn request_frame(&mut self) -> bool {
        self.frames.request()
    }

    /// Render into `target` if the scheduler says a frame is due.
    /// Returns whether a frame was drawn.
    pub fn render_frame<S: RasterSurface>(&mut self, target: &mut S, now: Instant) -> Result<bool> {
        if !self.frames.poll(now, self.is_drawing()) {
            return Ok(false);
        }
        self.render_now(target)?;
        Ok(true)
    }

    /// Render into `target` unconditionally.
    pub fn render_now<S: RasterSurface>(&mut self, target: &mut S) -> Result<()> {
        self.view.viewport = target.surface_size();
        self.engine.render(
            target,
            self.settings.blur_intensity,
            self.settings.blur_passes,
            self.view.scale,
            self.view.offset_x,
            self.view.offset_y,
        )
    }
}
