//! The span table: which grid cells a slot's content covers.
//!
//! Placement validation and PDF layout both go through these functions; there is
//! no other place that knows how promos span.

use crate::domain::{PromoSize, Slot, SlotContent, GRID_COLUMNS, SLOTS_PER_PAGE};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpanError {
    #[error("position {0} is outside the 2x4 grid")]
    PositionOutOfRange(u8),
    #[error("a {size} promo anchored at position {anchor} would leave the grid")]
    OffGrid { size: PromoSize, anchor: u8 },
    #[error("{0} promos can only be anchored in the top row of page 1")]
    HeaderPlacement(PromoSize),
    #[error("footer promos belong to the page footer band, not a grid slot")]
    FooterNotSlottable,
    #[error("position {0} is already occupied")]
    Overlap(u8),
}

const LAST_POSITION: u8 = (SLOTS_PER_PAGE - 1) as u8;

pub fn check_position(position: u8) -> Result<(), SpanError> {
    if position > LAST_POSITION {
        return Err(SpanError::PositionOutOfRange(position));
    }
    Ok(())
}

/// (row, column) of a grid position.
pub fn row_col(position: u8) -> (usize, usize) {
    let position = position as usize;
    (position / GRID_COLUMNS, position % GRID_COLUMNS)
}

/// Cells covered by a promo of `size` anchored at `anchor`, ascending.
pub fn span_cells(size: PromoSize, anchor: u8) -> Result<Vec<u8>, SpanError> {
    check_position(anchor)?;
    let (_, col) = row_col(anchor);
    let cells = match size {
        PromoSize::Single => vec![anchor],
        PromoSize::Horizontal | PromoSize::Header2x1 => {
            if col != 0 {
                return Err(SpanError::OffGrid { size, anchor });
            }
            vec![anchor, anchor + 1]
        }
        PromoSize::Square | PromoSize::Header2x2 => {
            if col != 0 || anchor + 3 > LAST_POSITION {
                return Err(SpanError::OffGrid { size, anchor });
            }
            (anchor..=anchor + 3).collect()
        }
        // The anchor is irrelevant: the whole page is covered.
        PromoSize::FullPage => (0..=LAST_POSITION).collect(),
        PromoSize::Footer => return Err(SpanError::FooterNotSlottable),
    };
    Ok(cells)
}

/// `span_cells` plus the page-level rule for header promos.
pub fn check_promo_anchor(size: PromoSize, anchor: u8, page_number: u32) -> Result<Vec<u8>, SpanError> {
    let cells = span_cells(size, anchor)?;
    if size.is_header() && (page_number != 1 || row_col(anchor).0 != 0) {
        return Err(SpanError::HeaderPlacement(size));
    }
    Ok(cells)
}

/// Cells covered by arbitrary slot content anchored at `position`.
pub fn content_cells(content: &SlotContent, position: u8) -> Result<Vec<u8>, SpanError> {
    match content {
        SlotContent::Empty => Ok(Vec::new()),
        SlotContent::Product { .. } => {
            check_position(position)?;
            Ok(vec![position])
        }
        SlotContent::Promo { promo_size, .. } => span_cells(*promo_size, position),
    }
}

/// For every cell, the anchor position of the content covering it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Occupancy {
    owners: [Option<u8>; SLOTS_PER_PAGE],
}

impl Occupancy {
    pub fn owner_of(&self, position: u8) -> Option<u8> {
        self.owners.get(position as usize).copied().flatten()
    }

    pub fn is_free(&self, position: u8) -> bool {
        self.owner_of(position).is_none()
    }

    /// Number of cells covered by some content.
    pub fn covered(&self) -> usize {
        self.owners.iter().filter(|o| o.is_some()).count()
    }
}

/// Resolves which content covers each cell of a page and rejects overlapping,
/// off-grid or misplaced spans.
pub fn validate_layout(
    contents: &[SlotContent; SLOTS_PER_PAGE],
    page_number: u32,
) -> Result<Occupancy, SpanError> {
    let mut occupancy = Occupancy::default();
    for (position, content) in contents.iter().enumerate() {
        let position = position as u8;
        let cells = match content {
            SlotContent::Promo { promo_size, .. } => {
                check_promo_anchor(*promo_size, position, page_number)?
            }
            other => content_cells(other, position)?,
        };
        for cell in cells {
            let slot = &mut occupancy.owners[cell as usize];
            if slot.is_some() {
                return Err(SpanError::Overlap(cell));
            }
            *slot = Some(position);
        }
    }
    Ok(occupancy)
}

/// Dense per-position contents from sparse slot rows; missing positions are empty.
pub fn slot_contents(rows: &[Slot]) -> [SlotContent; SLOTS_PER_PAGE] {
    let mut contents = [SlotContent::Empty; SLOTS_PER_PAGE];
    for row in rows {
        if let Some(content) = contents.get_mut(row.position as usize) {
            *content = row.content;
        }
    }
    contents
}

/// A dense view of one position; `slot_id` is absent for filler positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SlotView {
    pub slot_id: Option<Uuid>,
    pub position: u8,
    #[serde(flatten)]
    pub content: SlotContent,
}

/// Projects sparse slot rows onto the 8-element array shown to clients. Never persisted.
pub fn materialize_slots(rows: &[Slot]) -> [SlotView; SLOTS_PER_PAGE] {
    let mut views: [SlotView; SLOTS_PER_PAGE] = std::array::from_fn(|position| SlotView {
        slot_id: None,
        position: position as u8,
        content: SlotContent::Empty,
    });
    for row in rows {
        if let Some(view) = views.get_mut(row.position as usize) {
            view.slot_id = Some(row.id);
            view.content = row.content;
        }
    }
    views
}

#[cfg(test)]
mod tests {
    use super::*;

    fn promo(size: PromoSize) -> SlotContent {
        SlotContent::Promo {
            promo_image_id: Uuid::new_v4(),
            promo_size: size,
        }
    }

    #[test]
    fn square_spans_four_cells_from_left_column() {
        assert_eq!(span_cells(PromoSize::Square, 0).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(span_cells(PromoSize::Square, 4).unwrap(), vec![4, 5, 6, 7]);
        assert_eq!(
            span_cells(PromoSize::Square, 1),
            Err(SpanError::OffGrid {
                size: PromoSize::Square,
                anchor: 1
            })
        );
        // Bottom row cannot extend downward.
        assert!(span_cells(PromoSize::Square, 6).is_err());
    }

    #[test]
    fn horizontal_requires_even_anchor() {
        assert_eq!(span_cells(PromoSize::Horizontal, 6).unwrap(), vec![6, 7]);
        assert!(span_cells(PromoSize::Horizontal, 3).is_err());
    }

    #[test]
    fn full_page_ignores_anchor() {
        assert_eq!(span_cells(PromoSize::FullPage, 5).unwrap(), (0..8).collect::<Vec<u8>>());
    }

    #[test]
    fn footer_and_out_of_range_are_rejected() {
        assert_eq!(
            span_cells(PromoSize::Footer, 0),
            Err(SpanError::FooterNotSlottable)
        );
        assert_eq!(
            span_cells(PromoSize::Single, 8),
            Err(SpanError::PositionOutOfRange(8))
        );
    }

    #[test]
    fn header_promos_only_on_first_page_top_row() {
        assert!(check_promo_anchor(PromoSize::Header2x1, 0, 1).is_ok());
        assert_eq!(
            check_promo_anchor(PromoSize::Header2x1, 0, 2),
            Err(SpanError::HeaderPlacement(PromoSize::Header2x1))
        );
        assert_eq!(
            check_promo_anchor(PromoSize::Header2x2, 2, 1),
            Err(SpanError::HeaderPlacement(PromoSize::Header2x2))
        );
    }

    #[test]
    fn validate_layout_detects_overlap() {
        let mut contents = [SlotContent::Empty; SLOTS_PER_PAGE];
        contents[0] = promo(PromoSize::Square);
        contents[3] = SlotContent::Product {
            product_id: Uuid::new_v4(),
        };
        assert_eq!(validate_layout(&contents, 1), Err(SpanError::Overlap(3)));

        contents[3] = SlotContent::Empty;
        contents[5] = SlotContent::Product {
            product_id: Uuid::new_v4(),
        };
        let occupancy = validate_layout(&contents, 1).unwrap();
        assert_eq!(occupancy.owner_of(2), Some(0));
        assert_eq!(occupancy.owner_of(5), Some(5));
        assert!(occupancy.is_free(4));
        assert_eq!(occupancy.covered(), 5);
    }

    #[test]
    fn materialize_fills_missing_positions() {
        let page_id = Uuid::new_v4();
        let mut row = Slot::empty(page_id, 6);
        row.content = SlotContent::Product {
            product_id: Uuid::new_v4(),
        };
        let views = materialize_slots(&[row.clone()]);
        assert_eq!(views.len(), SLOTS_PER_PAGE);
        for (position, view) in views.iter().enumerate() {
            assert_eq!(view.position as usize, position);
        }
        assert_eq!(views[6].slot_id, Some(row.id));
        assert_eq!(views[6].content, row.content);
        assert!(views[0].slot_id.is_none());
        assert!(views[0].content.is_empty());
    }
}
