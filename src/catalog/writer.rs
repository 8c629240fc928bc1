//! Catalog output.
//!
//! [`CatalogWriter::write`] validates first and refuses to write anything
//! for a catalog that breaks an invariant. Figure crops go out before
//! `content.json` so that every `figure_path` in the catalog exists by the
//! time the catalog does. All JSON is written to a temporary file in the
//! target directory and renamed into place.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::converters::{CatalogConverter, HtmlConverter, MarkdownConverter};
use crate::error::{Error, Result};
use crate::extractors::raster;
use crate::rendering::RenderedPage;

use super::model::Catalog;
use super::paths::DocumentPaths;
use super::validate::validate;

/// Write `bytes` to `path` through a temporary file in the same directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Catalog(format!("{} has no parent directory", path.display())))?;
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Pretty JSON of `value`, written atomically.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    write_atomic(path, json.as_bytes())
}

/// Writes one document's catalog and its derived files.
#[derive(Debug, Clone)]
pub struct CatalogWriter {
    paths: DocumentPaths,
    merge_threshold: f32,
    write_renderings: bool,
}

impl CatalogWriter {
    /// Writer for the document at `paths`, validating overlaps against `merge_threshold`.
    pub fn new(paths: DocumentPaths, merge_threshold: f32) -> Self {
        Self {
            paths,
            merge_threshold,
            write_renderings: true,
        }
    }

    /// Enable or disable `document.md` / `document.html`.
    pub fn with_renderings(mut self, enabled: bool) -> Self {
        self.write_renderings = enabled;
        self
    }

    /// Output paths.
    pub fn paths(&self) -> &DocumentPaths {
        &self.paths
    }

    /// Validate, write figure crops, then `content.json`, then renderings.
    ///
    /// `pages` supplies the rasters figure crops are cut from; pass an empty
    /// slice to skip crops. Records each crop's path in the block metadata.
    pub fn write(&self, catalog: &mut Catalog, pages: &[RenderedPage]) -> Result<PathBuf> {
        if let Err(violation) = validate(catalog, self.merge_threshold) {
            log::error!("refusing to write catalog: {}", violation);
            return Err(violation.into());
        }

        if !pages.is_empty() {
            self.write_figures(catalog, pages)?;
        }

        let target = self.paths.content_json();
        write_json(&target, catalog)?;
        log::info!("wrote {} ({} blocks)", target.display(), catalog.blocks.len());

        if self.write_renderings {
            write_atomic(&self.paths.markdown(), MarkdownConverter::new().convert(catalog).as_bytes())?;
            write_atomic(&self.paths.html(), HtmlConverter::new().convert(catalog).as_bytes())?;
        }
        Ok(target)
    }

    fn write_figures(&self, catalog: &mut Catalog, pages: &[RenderedPage]) -> Result<()> {
        let mut written = 0;
        for block in catalog.blocks.iter_mut().filter(|b| b.role.is_container()) {
            let Some(page) = pages.iter().find(|p| p.info.page_index == block.page_index) else {
                continue;
            };
            let Some(crop) = raster::crop(&page.image, &block.bbox) else {
                log::warn!("{}: empty figure crop", block.id);
                continue;
            };
            let target = self.paths.figure(&block.id);
            std::fs::create_dir_all(self.paths.figures_dir())?;
            crop.save(&target)?;
            block.metadata.figure_path = Some(DocumentPaths::figure_relative(&block.id));
            written += 1;
        }
        if written > 0 {
            log::debug!("wrote {} figure crops", written);
        }
        Ok(())
    }
}
