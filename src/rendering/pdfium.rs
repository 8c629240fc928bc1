//! PDFium-backed [`SourceDocument`].

use std::path::Path;

use image::RgbImage;
use pdfium_render::prelude::*;

use crate::document::{raster_size, SourceDocument, TextSpan};
use crate::error::{Error, Result};
use crate::geometry::BBox;

/// A bound PDFium library. Create once per process and open documents from it.
pub struct PdfiumBackend {
    pdfium: Pdfium,
}

impl PdfiumBackend {
    /// Bind to a PDFium library next to the executable, falling back to the
    /// system library.
    pub fn new() -> Result<Self> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| Error::InvalidPdf(format!("cannot load pdfium: {}", e)))?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    /// Bind to the PDFium library in `dir`.
    pub fn from_library_dir(dir: &Path) -> Result<Self> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            .map_err(|e| Error::InvalidPdf(format!("cannot load pdfium from {}: {}", dir.display(), e)))?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    /// Open a PDF file.
    pub fn open(&self, path: &Path) -> Result<PdfiumDocument<'_>> {
        let document = self
            .pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| Error::InvalidPdf(format!("{}: {}", path.display(), e)))?;
        Ok(PdfiumDocument { document })
    }
}

/// An open PDF.
pub struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
}

impl PdfiumDocument<'_> {
    fn page(&self, page_index: usize) -> Result<PdfPage<'_>> {
        let index = PdfPageIndex::try_from(page_index)
            .map_err(|_| Error::InvalidPdf(format!("page index {} out of range", page_index)))?;
        self.document
            .pages()
            .get(index)
            .map_err(|e| Error::InvalidPdf(format!("page {}: {}", page_index, e)))
    }
}

impl SourceDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_size_points(&self, page_index: usize) -> Result<(f32, f32)> {
        let page = self.page(page_index)?;
        Ok((page.width().value, page.height().value))
    }

    fn render_page(&self, page_index: usize, dpi: u32) -> Result<RgbImage> {
        let page = self.page(page_index)?;
        let (width, height) = raster_size(page.width().value, page.height().value, dpi);
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32)
            .render_form_data(true)
            .render_annotations(true);
        let bitmap = page.render_with_config(&config).map_err(|e| Error::Render {
            page: page_index,
            reason: e.to_string(),
        })?;

        let (bw, bh) = (bitmap.width().max(0) as u32, bitmap.height().max(0) as u32);
        let rgba = bitmap.as_rgba_bytes();
        let rgb: Vec<u8> = rgba
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        RgbImage::from_raw(bw, bh, rgb).ok_or_else(|| Error::Render {
            page: page_index,
            reason: format!("bitmap buffer does not match {}x{}", bw, bh),
        })
    }

    fn text_spans(&self, page_index: usize) -> Result<Vec<TextSpan>> {
        let page = self.page(page_index)?;
        let page_height = page.height().value;
        let text = page
            .text()
            .map_err(|e| Error::InvalidPdf(format!("page {} text: {}", page_index, e)))?;

        let spans = text
            .segments()
            .iter()
            .filter_map(|segment| {
                let content = segment.text();
                if content.trim().is_empty() {
                    return None;
                }
                let bounds = segment.bounds();
                // PDF space has a bottom-left origin.
                let bbox = BBox::new(
                    bounds.left().value,
                    page_height - bounds.top().value,
                    bounds.right().value,
                    page_height - bounds.bottom().value,
                );
                bbox.is_valid().then(|| TextSpan::new(content, bbox))
            })
            .collect();
        Ok(spans)
    }
}
