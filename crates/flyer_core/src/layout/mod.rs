//! Grid layout shared by placement validation and PDF rendering.

pub mod geometry;
pub mod span;
pub mod text;

pub use geometry::{
    layout_page, CellKind, CellPlacement, GridMetrics, PageDimensions, ProductCellLayout, Rect,
};
pub use span::{
    check_position, check_promo_anchor, materialize_slots, slot_contents, span_cells,
    validate_layout, Occupancy, SlotView, SpanError,
};
