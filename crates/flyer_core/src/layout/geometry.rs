//! Page geometry for rendered flyers.
//!
//! All coordinates are in PDF points with the origin at the top-left corner of the
//! page and `y` growing downward. Renderers flip to their own coordinate system.
//! Rectangle positions and sizes are a compatibility contract with previously
//! generated flyers.

use super::span::{row_col, span_cells};
use crate::domain::{PromoSize, SlotContent, GRID_COLUMNS, GRID_ROWS, SLOTS_PER_PAGE};

/// Fixed output page geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageDimensions {
    pub width: f32,
    pub height: f32,
    /// Spacing between cells on both axes.
    pub gap: f32,
    /// Height of the band reserved at the bottom of page 1.
    pub footer_height: f32,
}

impl Default for PageDimensions {
    /// A4 in points.
    fn default() -> Self {
        Self {
            width: 595.0,
            height: 842.0,
            gap: 3.0,
            footer_height: 57.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Shrinks the rectangle by `amount` on every side, never below zero size.
    pub fn inset(&self, amount: f32) -> Rect {
        Rect {
            x: self.x + amount,
            y: self.y + amount,
            width: (self.width - 2.0 * amount).max(0.0),
            height: (self.height - 2.0 * amount).max(0.0),
        }
    }
}

/// Row and column sizes for one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridMetrics {
    pub dims: PageDimensions,
    pub slot_width: f32,
    pub normal_row_height: f32,
    pub first_row_height: f32,
    pub has_footer_band: bool,
}

impl GridMetrics {
    /// Page 1 shrinks its first row to make room for the footer band; later pages don't.
    pub fn for_page(dims: PageDimensions, page_number: u32) -> Self {
        let gap = dims.gap;
        let rows = GRID_ROWS as f32;
        let slot_width = (dims.width - gap) / GRID_COLUMNS as f32;
        let normal_row_height = (dims.height - (rows - 1.0) * gap) / rows;
        let has_footer_band = page_number == 1;
        let first_row_height = if has_footer_band {
            dims.height - dims.footer_height - (rows - 1.0) * normal_row_height - (rows - 1.0) * gap
        } else {
            normal_row_height
        };
        Self {
            dims,
            slot_width,
            normal_row_height,
            first_row_height,
            has_footer_band,
        }
    }

    pub fn row_height(&self, row: usize) -> f32 {
        if row == 0 {
            self.first_row_height
        } else {
            self.normal_row_height
        }
    }

    pub fn row_top(&self, row: usize) -> f32 {
        if row == 0 {
            0.0
        } else {
            self.first_row_height
                + self.dims.gap
                + (row - 1) as f32 * (self.normal_row_height + self.dims.gap)
        }
    }

    pub fn column_left(&self, col: usize) -> f32 {
        col as f32 * (self.slot_width + self.dims.gap)
    }

    pub fn cell_rect(&self, position: u8) -> Rect {
        let (row, col) = row_col(position);
        Rect::new(
            self.column_left(col),
            self.row_top(row),
            self.slot_width,
            self.row_height(row),
        )
    }

    /// Union of the given cells, gaps included.
    pub fn span_rect(&self, cells: &[u8]) -> Rect {
        let Some(first) = cells.iter().min() else {
            return Rect::new(0.0, 0.0, 0.0, 0.0);
        };
        let last = cells.iter().max().copied().unwrap_or(*first);
        let (top_row, _) = row_col(*first);
        let (bottom_row, _) = row_col(last);
        let spans_columns = cells
            .iter()
            .map(|c| row_col(*c).1)
            .any(|col| col != row_col(*first).1);
        let (x, width) = if spans_columns {
            (0.0, GRID_COLUMNS as f32 * self.slot_width + self.dims.gap)
        } else {
            (self.column_left(row_col(*first).1), self.slot_width)
        };
        let y = self.row_top(top_row);
        let height = self.row_top(bottom_row) + self.row_height(bottom_row) - y;
        Rect::new(x, y, width, height)
    }

    /// The full-width footer band, page 1 only.
    pub fn footer_rect(&self) -> Option<Rect> {
        self.has_footer_band.then(|| {
            Rect::new(
                0.0,
                self.dims.height - self.dims.footer_height,
                self.dims.width,
                self.dims.footer_height,
            )
        })
    }
}

/// The kind of content drawn into a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Empty,
    Product,
    Promo(PromoSize),
}

impl From<&SlotContent> for CellKind {
    fn from(content: &SlotContent) -> Self {
        match content {
            SlotContent::Empty => CellKind::Empty,
            SlotContent::Product { .. } => CellKind::Product,
            SlotContent::Promo { promo_size, .. } => CellKind::Promo(*promo_size),
        }
    }
}

/// A rectangle to draw, keyed by the slot position whose content fills it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellPlacement {
    pub position: u8,
    pub kind: CellKind,
    pub rect: Rect,
}

/// Emits one rectangle per drawable unit, in position order. Positions covered
/// by a multi-cell promo are skipped, including those before its anchor: a
/// full-page promo hides the whole grid wherever it is anchored.
pub fn layout_page(metrics: &GridMetrics, kinds: &[CellKind; SLOTS_PER_PAGE]) -> Vec<CellPlacement> {
    let mut covered = [false; SLOTS_PER_PAGE];
    let mut spans: Vec<(usize, Vec<u8>)> = Vec::new();
    for (index, kind) in kinds.iter().enumerate() {
        let CellKind::Promo(size) = kind else {
            continue;
        };
        if covered[index] {
            continue;
        }
        let position = index as u8;
        // Stored layouts are validated on write; an illegal span degrades to one cell.
        let cells = span_cells(*size, position).unwrap_or_else(|_| vec![position]);
        for cell in &cells {
            covered[*cell as usize] = true;
        }
        spans.push((index, cells));
    }

    let mut placements = Vec::with_capacity(SLOTS_PER_PAGE);
    for (index, kind) in kinds.iter().enumerate() {
        let position = index as u8;
        let rect = match spans.iter().find(|(anchor, _)| *anchor == index) {
            Some((_, cells)) => metrics.span_rect(cells),
            None if covered[index] => continue,
            None => metrics.cell_rect(position),
        };
        placements.push(CellPlacement {
            position,
            kind: *kind,
            rect,
        });
    }
    placements
}

//=========================================================================================
// Product Cell Interior
//=========================================================================================

pub const PRODUCT_HEADER_HEIGHT: f32 = 20.0;
pub const PRODUCT_LEFT_COLUMN_RATIO: f32 = 0.49;
pub const PRODUCT_PADDING: f32 = 4.0;
pub const PRICE_ROW_HEIGHT: f32 = 18.0;
pub const ICON_SIZE: f32 = 16.0;
pub const ICON_GAP: f32 = 2.0;
pub const MAX_ICONS: usize = 4;
pub const DESCRIPTION_FONT_SIZE: f32 = 7.0;
pub const DESCRIPTION_LINE_HEIGHT: f32 = 9.0;

/// Sub-rectangles of a product cell.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductCellLayout {
    /// Dark band with the product name.
    pub header: Rect,
    pub image: Rect,
    /// Icon squares stacked down the left edge of the image area.
    pub icons: Vec<Rect>,
    /// Struck-through recommended price.
    pub recommended_price: Rect,
    /// Highlighted promo price.
    pub promo_price: Rect,
    /// Bullet text column.
    pub description: Rect,
}

impl ProductCellLayout {
    pub fn within(cell: Rect) -> Self {
        let header = Rect::new(cell.x, cell.y, cell.width, PRODUCT_HEADER_HEIGHT.min(cell.height));
        let body_top = header.bottom();
        let body_height = (cell.bottom() - body_top).max(0.0);

        let left_width = cell.width * PRODUCT_LEFT_COLUMN_RATIO;
        let left = Rect::new(cell.x, body_top, left_width, body_height).inset(PRODUCT_PADDING);

        let price_block = (2.0 * PRICE_ROW_HEIGHT).min(left.height);
        let promo_price = Rect::new(
            left.x,
            left.bottom() - price_block / 2.0,
            left.width,
            price_block / 2.0,
        );
        let recommended_price = Rect::new(
            left.x,
            left.bottom() - price_block,
            left.width,
            price_block / 2.0,
        );
        let image = Rect::new(left.x, left.y, left.width, (left.height - price_block).max(0.0));

        let icons = (0..MAX_ICONS)
            .map(|i| {
                Rect::new(
                    image.x,
                    image.y + i as f32 * (ICON_SIZE + ICON_GAP),
                    ICON_SIZE,
                    ICON_SIZE,
                )
            })
            .take_while(|icon| icon.bottom() <= image.bottom())
            .collect();

        let description = Rect::new(
            cell.x + left_width,
            body_top,
            cell.width - left_width,
            body_height,
        )
        .inset(PRODUCT_PADDING);

        Self {
            header,
            image,
            icons,
            recommended_price,
            promo_price,
            description,
        }
    }

    /// How many description lines fit without overflowing the cell.
    pub fn description_line_budget(&self) -> usize {
        (self.description.height / DESCRIPTION_LINE_HEIGHT).floor().max(0.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.001
    }

    fn kinds_with(position: usize, kind: CellKind) -> [CellKind; SLOTS_PER_PAGE] {
        let mut kinds = [CellKind::Empty; SLOTS_PER_PAGE];
        kinds[position] = kind;
        kinds
    }

    #[test]
    fn a4_metrics() {
        let first = GridMetrics::for_page(PageDimensions::default(), 1);
        assert!(approx(first.slot_width, 296.0));
        assert!(approx(first.normal_row_height, 208.25));
        assert!(approx(first.first_row_height, 151.25));

        let later = GridMetrics::for_page(PageDimensions::default(), 2);
        assert!(approx(later.first_row_height, later.normal_row_height));
        assert!(later.footer_rect().is_none());
    }

    #[test]
    fn first_page_rows_end_at_footer_band() {
        let metrics = GridMetrics::for_page(PageDimensions::default(), 1);
        let bottom = metrics.cell_rect(7).bottom();
        let footer = metrics.footer_rect().unwrap();
        assert!(approx(bottom, footer.y));
        assert!(approx(footer.y, 842.0 - 57.0));
        assert!(approx(footer.width, 595.0));
    }

    #[test]
    fn cell_positions_follow_gaps() {
        let metrics = GridMetrics::for_page(PageDimensions::default(), 1);
        let right = metrics.cell_rect(1);
        assert!(approx(right.x, 299.0));
        assert!(approx(right.y, 0.0));
        let second_row = metrics.cell_rect(2);
        assert!(approx(second_row.y, 151.25 + 3.0));
        assert!(approx(second_row.height, 208.25));
        let last_page_bottom = GridMetrics::for_page(PageDimensions::default(), 3)
            .cell_rect(7)
            .bottom();
        assert!(approx(last_page_bottom, 842.0));
    }

    #[test]
    fn square_below_first_row_spans_two_normal_rows() {
        let metrics = GridMetrics::for_page(PageDimensions::default(), 1);
        let placements = layout_page(&metrics, &kinds_with(2, CellKind::Promo(PromoSize::Square)));
        let promo = placements.iter().find(|p| p.position == 2).unwrap();
        assert!(approx(promo.rect.height, 208.25 * 2.0 + 3.0));
        assert!(approx(promo.rect.width, 2.0 * 296.0 + 3.0));
        // Covered positions are not emitted on their own.
        assert!(placements.iter().all(|p| ![3, 4, 5].contains(&p.position)));
        assert_eq!(placements.len(), 8 - 3);
    }

    #[test]
    fn square_in_first_row_uses_first_row_height() {
        let metrics = GridMetrics::for_page(PageDimensions::default(), 1);
        let placements = layout_page(&metrics, &kinds_with(0, CellKind::Promo(PromoSize::Square)));
        let promo = placements[0];
        assert_eq!(promo.position, 0);
        assert!(approx(promo.rect.height, 151.25 + 3.0 + 208.25));
        assert!(approx(promo.rect.y, 0.0));
    }

    #[test]
    fn full_page_promo_covers_grid_area() {
        let metrics = GridMetrics::for_page(PageDimensions::default(), 1);
        let rect = metrics.span_rect(&span_cells(PromoSize::FullPage, 0).unwrap());
        assert!(approx(rect.height, 842.0 - 57.0));
        assert!(approx(rect.width, 595.0));
    }

    #[test]
    fn full_page_promo_hides_cells_before_its_anchor() {
        let metrics = GridMetrics::for_page(PageDimensions::default(), 2);
        let placements =
            layout_page(&metrics, &kinds_with(5, CellKind::Promo(PromoSize::FullPage)));
        assert_eq!(placements.len(), 1);
        let promo = placements[0];
        assert_eq!(promo.position, 5);
        assert!(approx(promo.rect.y, 0.0));
        assert!(approx(promo.rect.height, 842.0));
        assert!(approx(promo.rect.width, 595.0));
    }

    #[test]
    fn product_interior_stays_inside_cell() {
        let metrics = GridMetrics::for_page(PageDimensions::default(), 1);
        let cell = metrics.cell_rect(0);
        let layout = ProductCellLayout::within(cell);
        assert!(approx(layout.header.height, PRODUCT_HEADER_HEIGHT));
        assert!(layout.promo_price.bottom() <= cell.bottom() + 0.001);
        assert!(layout.description.right() <= cell.right() + 0.001);
        assert!(layout.icons.len() <= MAX_ICONS);
        assert!(layout.description_line_budget() > 0);
        let lines = layout.description_line_budget() as f32 * DESCRIPTION_LINE_HEIGHT;
        assert!(lines <= layout.description.height);
    }
}
