//! Source documents: page geometry, rasters and embedded text.
//!
//! The pipeline never talks to a PDF library directly. Everything it needs
//! from a document goes through [`SourceDocument`]:
//!
//! - page count and page size in PDF points
//! - a raster of a page at a given DPI
//! - the embedded text spans of a page, in PDF points with a top-left origin
//!
//! [`crate::rendering::pdfium::PdfiumBackend`] implements it for real PDFs
//! (feature `pdfium`); [`MemoryDocument`] holds everything in memory.

use image::{imageops, Rgb, RgbImage};

use crate::error::{Error, Result};
use crate::geometry::BBox;

/// A run of embedded text with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    /// Text content
    pub text: String,
    /// Box in PDF points, origin top-left
    pub bbox: BBox,
}

impl TextSpan {
    /// Create a span.
    pub fn new(text: impl Into<String>, bbox: BBox) -> Self {
        Self {
            text: text.into(),
            bbox,
        }
    }
}

/// Read access to a paged document.
pub trait SourceDocument {
    /// Number of pages.
    fn page_count(&self) -> usize;

    /// Page size `(width, height)` in PDF points.
    fn page_size_points(&self, page_index: usize) -> Result<(f32, f32)>;

    /// Render a page to RGB at `dpi`.
    ///
    /// The raster must be `round(points * dpi / 72)` pixels on each side.
    fn render_page(&self, page_index: usize, dpi: u32) -> Result<RgbImage>;

    /// Embedded text spans of a page.
    fn text_spans(&self, page_index: usize) -> Result<Vec<TextSpan>>;
}

/// Pixel size of a page rendered at `dpi`.
pub fn raster_size(width_pt: f32, height_pt: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / 72.0;
    (
        ((width_pt * scale).round() as u32).max(1),
        ((height_pt * scale).round() as u32).max(1),
    )
}

#[derive(Debug, Clone)]
struct MemoryPage {
    width_pt: f32,
    height_pt: f32,
    spans: Vec<TextSpan>,
    image: Option<RgbImage>,
}

/// A document held entirely in memory.
///
/// Pages without an image render as blank white rasters; a page image is
/// resized to the requested DPI.
///
/// # Example
///
/// ```
/// use pdf_catalog::document::{MemoryDocument, SourceDocument, TextSpan};
/// use pdf_catalog::geometry::BBox;
///
/// let doc = MemoryDocument::new()
///     .with_page(612.0, 792.0)
///     .with_span(0, TextSpan::new("Hello", BBox::new(72.0, 72.0, 110.0, 84.0)));
/// assert_eq!(doc.page_count(), 1);
/// assert_eq!(doc.render_page(0, 144).unwrap().dimensions(), (1224, 1584));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    pages: Vec<MemoryPage>,
}

impl MemoryDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a blank page of the given size in points.
    pub fn with_page(mut self, width_pt: f32, height_pt: f32) -> Self {
        self.pages.push(MemoryPage {
            width_pt,
            height_pt,
            spans: Vec::new(),
            image: None,
        });
        self
    }

    /// Add an embedded text span to an existing page.
    pub fn with_span(mut self, page_index: usize, span: TextSpan) -> Self {
        if let Some(page) = self.pages.get_mut(page_index) {
            page.spans.push(span);
        }
        self
    }

    /// Set the raster of an existing page.
    pub fn with_image(mut self, page_index: usize, image: RgbImage) -> Self {
        if let Some(page) = self.pages.get_mut(page_index) {
            page.image = Some(image);
        }
        self
    }

    /// Copy every page of `doc`, rendered at `dpi`, with its spans.
    ///
    /// Lets a document whose backend cannot be shared across threads be
    /// read once and processed elsewhere.
    pub fn snapshot(doc: &dyn SourceDocument, dpi: u32) -> Result<Self> {
        let mut pages = Vec::with_capacity(doc.page_count());
        for page_index in 0..doc.page_count() {
            let (width_pt, height_pt) = doc.page_size_points(page_index)?;
            pages.push(MemoryPage {
                width_pt,
                height_pt,
                spans: doc.text_spans(page_index)?,
                image: Some(doc.render_page(page_index, dpi)?),
            });
        }
        Ok(Self { pages })
    }

    fn page(&self, page_index: usize) -> Result<&MemoryPage> {
        self.pages.get(page_index).ok_or_else(|| {
            Error::InvalidPdf(format!(
                "page {} out of range (document has {})",
                page_index,
                self.pages.len()
            ))
        })
    }
}

impl SourceDocument for MemoryDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size_points(&self, page_index: usize) -> Result<(f32, f32)> {
        let page = self.page(page_index)?;
        Ok((page.width_pt, page.height_pt))
    }

    fn render_page(&self, page_index: usize, dpi: u32) -> Result<RgbImage> {
        let page = self.page(page_index)?;
        let (width, height) = raster_size(page.width_pt, page.height_pt, dpi);
        Ok(match &page.image {
            Some(image) if image.dimensions() == (width, height) => image.clone(),
            Some(image) => imageops::resize(image, width, height, imageops::FilterType::Triangle),
            None => RgbImage::from_pixel(width, height, Rgb([255, 255, 255])),
        })
    }

    fn text_spans(&self, page_index: usize) -> Result<Vec<TextSpan>> {
        Ok(self.page(page_index)?.spans.clone())
    }
}
