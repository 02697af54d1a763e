//! services/api/src/adapters/pdf.rs
//!
//! This module contains the PDF adapter, which implements the `PdfRenderer` port
//! with `printpdf`. Every rectangle comes from `flyer_core::layout`; this file only
//! draws into them.

use ::image::{DynamicImage, Rgba, RgbImage};
use async_trait::async_trait;
use bytes::Bytes;
use flyer_core::format::PriceFormat;
use flyer_core::layout::geometry::{DESCRIPTION_FONT_SIZE, DESCRIPTION_LINE_HEIGHT, PRODUCT_PADDING};
use flyer_core::layout::text::{chars_per_line, estimate_text_width, truncate_to, wrap_bullets};
use flyer_core::layout::{layout_page, GridMetrics, PageDimensions, ProductCellLayout, Rect};
use flyer_core::ports::{PdfRenderer, PortError, PortResult};
use flyer_core::render::{FlyerDocument, ImageAsset, ProductCard, RenderPage, RenderSlot};
use printpdf::path::PaintMode;
use printpdf::{
    Color, ColorBits, ColorSpace, Image, ImageTransform, ImageXObject, IndirectFontRef,
    Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference, Point, Px, Rgb,
};
use std::fs::File;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::PdfConfig;

const HEADER_FONT_SIZE: f32 = 10.0;
const PRICE_LABEL_FONT_SIZE: f32 = 6.0;
const RECOMMENDED_PRICE_FONT_SIZE: f32 = 9.0;
const PROMO_PRICE_FONT_SIZE: f32 = 13.0;
/// Baseline offset of a glyph box, as a share of the font size.
const BASELINE_RATIO: f32 = 0.35;

const WHITE: (f32, f32, f32) = (1.0, 1.0, 1.0);
const INK: (f32, f32, f32) = (0.1, 0.1, 0.1);
const HEADER_BAND: (f32, f32, f32) = (0.16, 0.16, 0.18);
const PROMO_BAND: (f32, f32, f32) = (0.86, 0.11, 0.13);
const MUTED: (f32, f32, f32) = (0.45, 0.45, 0.45);

#[derive(Debug, thiserror::Error)]
enum PdfError {
    #[error("font error: {0}")]
    Font(String),
    #[error("image {key} could not be decoded: {reason}")]
    Image { key: String, reason: String },
    #[error("failed to write the PDF: {0}")]
    Save(String),
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `PdfRenderer` port with `printpdf`.
#[derive(Clone)]
pub struct PrintPdfRenderer {
    config: Arc<PdfConfig>,
    dims: PageDimensions,
}

impl PrintPdfRenderer {
    pub fn new(config: PdfConfig) -> Self {
        Self {
            config: Arc::new(config),
            dims: PageDimensions::default(),
        }
    }
}

#[async_trait]
impl PdfRenderer for PrintPdfRenderer {
    async fn render(&self, document: &FlyerDocument) -> PortResult<Bytes> {
        let config = self.config.clone();
        let dims = self.dims;
        let document = document.clone();
        let flyer_id = document.flyer_id;

        let job = tokio::task::spawn_blocking(move || draw_document(&config, dims, &document));
        let bytes = tokio::time::timeout(self.config.timeout, job)
            .await
            .map_err(|_| {
                error!(flyer_id = %flyer_id, "PDF rendering timed out");
                PortError::Unexpected("PDF rendering timed out".to_string())
            })?
            .map_err(|e| PortError::Unexpected(format!("PDF rendering task failed: {}", e)))?
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        debug!(flyer_id = %flyer_id, size = bytes.len(), "PDF rendered");
        Ok(Bytes::from(bytes))
    }
}

//=========================================================================================
// Document Drawing
//=========================================================================================

/// DejaVu Sans, embedded so Czech text renders without any font configured.
/// Builtin PDF fonts are WinAnsi-only and would drop characters such as "č".
const DEFAULT_REGULAR_FONT: &[u8] = include_bytes!("../../fonts/DejaVuSans.ttf");
const DEFAULT_BOLD_FONT: &[u8] = include_bytes!("../../fonts/DejaVuSans-Bold.ttf");

const BULLET: &str = "\u{2022} ";

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn load_fonts(doc: &PdfDocumentReference, config: &PdfConfig) -> Result<Fonts, PdfError> {
    let from_file = |path: &std::path::Path| -> Result<IndirectFontRef, PdfError> {
        let file = File::open(path)
            .map_err(|e| PdfError::Font(format!("{}: {}", path.display(), e)))?;
        doc.add_external_font(file)
            .map_err(|e| PdfError::Font(format!("{}: {}", path.display(), e)))
    };
    let embedded = |bytes: &'static [u8]| -> Result<IndirectFontRef, PdfError> {
        doc.add_external_font(Cursor::new(bytes))
            .map_err(|e| PdfError::Font(e.to_string()))
    };

    let regular = match &config.font_path {
        Some(path) => from_file(path)?,
        None => embedded(DEFAULT_REGULAR_FONT)?,
    };
    let bold = match (&config.bold_font_path, &config.font_path) {
        (Some(path), _) | (None, Some(path)) => from_file(path)?,
        (None, None) => embedded(DEFAULT_BOLD_FONT)?,
    };
    Ok(Fonts { regular, bold })
}

fn draw_document(
    config: &PdfConfig,
    dims: PageDimensions,
    document: &FlyerDocument,
) -> Result<Vec<u8>, PdfError> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(&document.title, mm(dims.width), mm(dims.height), "Layer 1");
    let fonts = load_fonts(&doc, config)?;

    for (index, page) in document.pages.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page_index, layer_index) =
                doc.add_page(mm(dims.width), mm(dims.height), "Layer 1");
            doc.get_page(page_index).get_layer(layer_index)
        };
        let canvas = Canvas {
            layer,
            page_height: dims.height,
            fonts: &fonts,
            config,
        };
        canvas.draw_page(dims, page)?;
    }

    doc.save_to_bytes().map_err(|e| PdfError::Save(e.to_string()))
}

/// PDF points to printpdf millimetres.
fn mm(points: f32) -> Mm {
    Mm(points * 25.4 / 72.0)
}

fn color((r, g, b): (f32, f32, f32)) -> Color {
    Color::Rgb(Rgb::new(r, g, b, None))
}

/// Draws one page. Coordinates are top-left based until they reach printpdf.
struct Canvas<'a> {
    layer: PdfLayerReference,
    page_height: f32,
    fonts: &'a Fonts,
    config: &'a PdfConfig,
}

impl Canvas<'_> {
    fn draw_page(&self, dims: PageDimensions, page: &RenderPage) -> Result<(), PdfError> {
        let metrics = GridMetrics::for_page(dims, page.page_number);
        for placement in layout_page(&metrics, &page.kinds()) {
            match &page.slots[placement.position as usize] {
                RenderSlot::Empty => {}
                RenderSlot::Product(card) => self.draw_product(card, placement.rect)?,
                RenderSlot::Promo { image, .. } => self.draw_image(image, placement.rect, Fit::Fill)?,
            }
        }
        if let (Some(footer), Some(band)) = (&page.footer, metrics.footer_rect()) {
            self.draw_image(footer, band, Fit::Fill)?;
        }
        Ok(())
    }

    fn draw_product(&self, card: &ProductCard, cell: Rect) -> Result<(), PdfError> {
        let layout = ProductCellLayout::within(cell);

        // Header band with the (brand +) product name.
        self.fill_rect(layout.header, HEADER_BAND);
        let title = match &card.brand_name {
            Some(brand) => format!("{} {}", brand, card.name),
            None => card.name.clone(),
        };
        let max_chars = chars_per_line(layout.header.width - 2.0 * PRODUCT_PADDING, HEADER_FONT_SIZE);
        let title = truncate_to(&title, max_chars);
        self.text_centered(&title, HEADER_FONT_SIZE, layout.header, &self.fonts.bold, WHITE);

        if let Some(image) = &card.image {
            self.draw_image(image, layout.image, Fit::Contain)?;
        }
        for (icon, slot) in card.icons.iter().zip(layout.icons.iter()) {
            self.draw_image(icon, *slot, Fit::Contain)?;
        }

        let format = &self.config.price_format;
        if let Some(price) = card.recommended_price {
            self.draw_recommended_price(format, price, layout.recommended_price);
        }
        if let Some(price) = card.promo_price {
            self.draw_promo_price(format, price, layout.promo_price);
        }

        if let Some(description) = &card.description {
            let area = layout.description;
            let lines = wrap_bullets(
                description,
                BULLET,
                chars_per_line(area.width, DESCRIPTION_FONT_SIZE),
                layout.description_line_budget(),
            );
            self.layer.set_fill_color(color(INK));
            for (i, line) in lines.iter().enumerate() {
                let baseline = area.y + (i + 1) as f32 * DESCRIPTION_LINE_HEIGHT;
                self.text(line, DESCRIPTION_FONT_SIZE, area.x, baseline, &self.fonts.regular);
            }
        }
        Ok(())
    }

    fn draw_recommended_price(&self, format: &PriceFormat, price: f64, row: Rect) {
        let label = &self.config.recommended_price_label;
        let baseline = row.y + row.height / 2.0 + PRICE_LABEL_FONT_SIZE * BASELINE_RATIO;
        self.layer.set_fill_color(color(MUTED));
        self.text(label, PRICE_LABEL_FONT_SIZE, row.x, baseline, &self.fonts.regular);

        let amount = format.format(price);
        let width = estimate_text_width(&amount, RECOMMENDED_PRICE_FONT_SIZE);
        let x = row.right() - width;
        let baseline = row.y + row.height / 2.0 + RECOMMENDED_PRICE_FONT_SIZE * BASELINE_RATIO;
        self.text(&amount, RECOMMENDED_PRICE_FONT_SIZE, x, baseline, &self.fonts.regular);

        // Strike through the old price.
        let strike_y = row.y + row.height / 2.0;
        self.layer.set_outline_color(color(MUTED));
        self.layer.set_outline_thickness(0.6);
        self.line(x, strike_y, row.right(), strike_y);
    }

    fn draw_promo_price(&self, format: &PriceFormat, price: f64, row: Rect) {
        self.fill_rect(row, PROMO_BAND);
        let label = &self.config.promo_price_label;
        let baseline = row.y + row.height / 2.0 + PRICE_LABEL_FONT_SIZE * BASELINE_RATIO;
        self.layer.set_fill_color(color(WHITE));
        self.text(label, PRICE_LABEL_FONT_SIZE, row.x + 2.0, baseline, &self.fonts.regular);

        let amount = format.format(price);
        let width = estimate_text_width(&amount, PROMO_PRICE_FONT_SIZE);
        let baseline = row.y + row.height / 2.0 + PROMO_PRICE_FONT_SIZE * BASELINE_RATIO;
        self.text(
            &amount,
            PROMO_PRICE_FONT_SIZE,
            row.right() - width - 2.0,
            baseline,
            &self.fonts.bold,
        );
    }

    fn draw_image(&self, asset: &ImageAsset, rect: Rect, fit: Fit) -> Result<(), PdfError> {
        if rect.width <= 0.0 || rect.height <= 0.0 {
            return Ok(());
        }
        let decoded = ::image::load_from_memory(&asset.data).map_err(|e| PdfError::Image {
            key: asset.key.clone(),
            reason: e.to_string(),
        })?;
        let rgb = flatten_on_white(&decoded);
        let (width_px, height_px) = rgb.dimensions();
        if width_px == 0 || height_px == 0 {
            return Ok(());
        }

        // At 72 dpi one pixel is one point, so the scales map pixels straight to points.
        let (scale_x, scale_y, target) = match fit {
            Fit::Fill => (
                rect.width / width_px as f32,
                rect.height / height_px as f32,
                rect,
            ),
            Fit::Contain => {
                let scale = (rect.width / width_px as f32).min(rect.height / height_px as f32);
                let w = width_px as f32 * scale;
                let h = height_px as f32 * scale;
                let target = Rect::new(
                    rect.x + (rect.width - w) / 2.0,
                    rect.y + (rect.height - h) / 2.0,
                    w,
                    h,
                );
                (scale, scale, target)
            }
        };

        let image = Image::from(ImageXObject {
            width: Px(width_px as usize),
            height: Px(height_px as usize),
            color_space: ColorSpace::Rgb,
            bits_per_component: ColorBits::Bit8,
            interpolate: true,
            image_data: rgb.into_raw(),
            image_filter: None,
            clipping_bbox: None,
            smask: None,
        });
        image.add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(mm(target.x)),
                translate_y: Some(mm(self.page_height - target.bottom())),
                dpi: Some(72.0),
                scale_x: Some(scale_x),
                scale_y: Some(scale_y),
                ..Default::default()
            },
        );
        Ok(())
    }

    fn fill_rect(&self, rect: Rect, rgb: (f32, f32, f32)) {
        self.layer.set_fill_color(color(rgb));
        let shape = printpdf::Rect::new(
            mm(rect.x),
            mm(self.page_height - rect.bottom()),
            mm(rect.right()),
            mm(self.page_height - rect.y),
        )
        .with_mode(PaintMode::Fill);
        self.layer.add_rect(shape);
    }

    fn text(&self, text: &str, size: f32, x: f32, baseline: f32, font: &IndirectFontRef) {
        self.layer
            .use_text(text, size, mm(x), mm(self.page_height - baseline), font);
    }

    fn text_centered(
        &self,
        text: &str,
        size: f32,
        band: Rect,
        font: &IndirectFontRef,
        rgb: (f32, f32, f32),
    ) {
        let width = estimate_text_width(text, size);
        let x = (band.x + (band.width - width) / 2.0).max(band.x + PRODUCT_PADDING);
        let baseline = band.y + band.height / 2.0 + size * BASELINE_RATIO;
        self.layer.set_fill_color(color(rgb));
        self.text(text, size, x, baseline, font);
    }

    fn line(&self, x1: f32, y1: f32, x2: f32, y2: f32) {
        let points = vec![
            (Point::new(mm(x1), mm(self.page_height - y1)), false),
            (Point::new(mm(x2), mm(self.page_height - y2)), false),
        ];
        self.layer.add_line(Line {
            points,
            is_closed: false,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fit {
    /// Stretch to exactly the rectangle.
    Fill,
    /// Keep the aspect ratio, centred.
    Contain,
}

/// Composites transparent pixels against white; PDF images here carry no alpha.
fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut rgb = RgbImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *pixel;
        let alpha = a as f32 / 255.0;
        let blend = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)) as u8;
        rgb.put_pixel(x, y, ::image::Rgb([blend(r), blend(g), blend(b)]));
    }
    rgb
}
