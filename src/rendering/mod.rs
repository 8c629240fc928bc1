//! Page rasterization at a fixed DPI.
//!
//! The [`Rasterizer`] turns every page of a [`SourceDocument`] into an RGB
//! raster at the document's detection DPI and records the page geometry
//! ([`PageInfo`]) that all catalog coordinates refer to. When output paths
//! are given, each raster is persisted to `pages/page-NNN.png` before it is
//! handed to any later stage.
//!
//! A single page that fails to render fails the whole document: every bbox
//! in a catalog is expressed at one DPI, so a page rendered differently (or
//! not at all) cannot be represented.

#[cfg(feature = "pdfium")]
#[cfg_attr(docsrs, doc(cfg(feature = "pdfium")))]
pub mod pdfium;

use image::RgbImage;

use crate::catalog::paths::DocumentPaths;
use crate::catalog::PageInfo;
use crate::document::{raster_size, SourceDocument};
use crate::error::{Error, Result};

/// A page raster with its geometry.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Page geometry at the detection DPI
    pub info: PageInfo,
    /// RGB raster, `info.pixel_width` x `info.pixel_height`
    pub image: RgbImage,
}

/// Renders document pages at one DPI.
#[derive(Debug, Clone, Copy)]
pub struct Rasterizer {
    dpi: u32,
}

impl Rasterizer {
    /// Rasterizer for the given DPI.
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    /// DPI every page is rendered at.
    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Render one page and record its geometry.
    ///
    /// The backend may round pixel sizes differently by one pixel; anything
    /// further off is treated as a render failure.
    pub fn render(&self, doc: &dyn SourceDocument, page_index: usize) -> Result<RenderedPage> {
        let render_error = |reason: String| Error::Render {
            page: page_index,
            reason,
        };
        let (width_pt, height_pt) = doc
            .page_size_points(page_index)
            .map_err(|e| render_error(e.to_string()))?;
        if !(width_pt > 0.0 && height_pt > 0.0) {
            return Err(render_error(format!(
                "degenerate page size {}x{} pt",
                width_pt, height_pt
            )));
        }
        let image = doc
            .render_page(page_index, self.dpi)
            .map_err(|e| render_error(e.to_string()))?;

        let (expected_w, expected_h) = raster_size(width_pt, height_pt, self.dpi);
        let (width, height) = image.dimensions();
        if width.abs_diff(expected_w) > 1 || height.abs_diff(expected_h) > 1 {
            return Err(render_error(format!(
                "raster is {}x{}, expected {}x{} at {} dpi",
                width, height, expected_w, expected_h, self.dpi
            )));
        }

        let info = PageInfo {
            page_index,
            pixel_width: width,
            pixel_height: height,
            dpi: self.dpi,
            pdf_point_width: width_pt,
            pdf_point_height: height_pt,
        };
        Ok(RenderedPage { info, image })
    }

    /// Render every page, persisting PNGs under `paths` when given.
    ///
    /// Fails on an empty document and on the first page that cannot be
    /// rendered or written.
    pub fn rasterize(
        &self,
        doc: &dyn SourceDocument,
        paths: Option<&DocumentPaths>,
    ) -> Result<Vec<RenderedPage>> {
        let count = doc.page_count();
        if count == 0 {
            return Err(Error::EmptyDocument(
                paths
                    .map(|p| p.root().display().to_string())
                    .unwrap_or_else(|| "document".to_string()),
            ));
        }
        if let Some(paths) = paths {
            std::fs::create_dir_all(paths.pages_dir())?;
        }

        let mut pages = Vec::with_capacity(count);
        for page_index in 0..count {
            let page = self.render(doc, page_index)?;
            if let Some(paths) = paths {
                let target = paths.page_image(page_index);
                page.image.save(&target).map_err(|e| Error::Render {
                    page: page_index,
                    reason: format!("writing {}: {}", target.display(), e),
                })?;
            }
            log::debug!(
                "rendered page {} at {} dpi: {}x{} px",
                page_index,
                self.dpi,
                page.info.pixel_width,
                page.info.pixel_height
            );
            pages.push(page);
        }
        log::info!("rasterized {} pages at {} dpi", count, self.dpi);
        Ok(pages)
    }
}
