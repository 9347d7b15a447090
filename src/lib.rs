// ============================================================================
// REDACTFE — mask-driven blur redaction engine
// ============================================================================
//
// Layering, bottom-up:
//   region / mask / ops    — rectangles, alpha masks, shape fill, blur kernels
//   surface / compositor   — render targets and the cached blur layer
//   engine                 — source image + committed/scratch masks
//   components::history    — bounded undo/redo of mask snapshots
//   session                — tool, view, gestures, frame pacing, loading
//   io / settings / logger — files, persisted preferences, session log
//   cli                    — headless batch front end
// ============================================================================

pub mod cli;
pub mod components;
pub mod compositor;
pub mod engine;
pub mod error;
pub mod io;
pub mod logger;
pub mod mask;
pub mod ops;
pub mod region;
pub mod session;
pub mod settings;
pub mod surface;

pub use components::history::{HistoryEntry, HistoryStore};
pub use engine::{EditEngine, MaskTarget};
pub use error::{RedactError, Result};
pub use mask::MaskSurface;
pub use ops::blur::BlurQuality;
pub use ops::detect::{MemoryPages, PageSource, PlaceholderDetector, SensitiveDetector};
pub use ops::shapes::MaskShape;
pub use region::{DirtyRegions, Region};
pub use session::{FrameScheduler, Session, Tool};
pub use settings::RedactSettings;
pub use surface::{RasterSurface, ViewTransform};
