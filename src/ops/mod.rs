// ============================================================================
// OPS — pixel operations behind the engine
// ============================================================================
//
//   shapes.rs — coverage rasterization of dots, strokes, rectangles, ellipses
//   blur.rs   — separable Gaussian passes and mask-shaped blur layers
//   detect.rs — pluggable detection and paged-document sources
// ============================================================================

pub mod blur;
pub mod detect;
pub mod shapes;
