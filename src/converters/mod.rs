//! Derived renderings of a catalog.
//!
//! Every converter walks `reading_order` page by page, so the output reads
//! the way the catalog says the document reads:
//! - **Markdown**: headings, paragraphs, list items, figure links
//! - **HTML**: one `<section>` per page, block ids as element ids
//! - **Plain text**: block texts separated by blank lines
//!
//! Renderings are conveniences for people; nothing downstream parses them.
//!
//! # Example
//!
//! ```
//! use pdf_catalog::catalog::{Block, BlockRole, Catalog, PageInfo};
//! use pdf_catalog::converters::{CatalogConverter, MarkdownConverter};
//! use pdf_catalog::geometry::BBox;
//!
//! let mut catalog = Catalog::default();
//! catalog.pages.push(PageInfo::from_points(0, 612.0, 792.0, 72));
//! catalog.blocks.push(
//!     Block::new("block_0_000", 0, BlockRole::Title, BBox::new(10.0, 10.0, 200.0, 40.0))
//!         .with_text("Prescribing Information"),
//! );
//! catalog.reading_order.push(vec!["block_0_000".to_string()]);
//!
//! let markdown = MarkdownConverter::new().convert(&catalog);
//! assert!(markdown.contains("## Prescribing Information"));
//! ```

pub mod html;
pub mod markdown;
pub mod plain_text;

use std::collections::HashMap;

pub use html::HtmlConverter;
pub use markdown::MarkdownConverter;
pub use plain_text::PlainTextConverter;

use crate::catalog::{Block, Catalog};

/// Catalog → text rendering.
pub trait CatalogConverter {
    /// Render the whole catalog.
    fn convert(&self, catalog: &Catalog) -> String;

    /// File extension of the rendering, without the dot.
    fn extension(&self) -> &'static str;
}

/// Blocks of each page in reading order. Ids that do not resolve are skipped.
pub fn blocks_in_reading_order(catalog: &Catalog) -> Vec<Vec<&Block>> {
    let by_id: HashMap<&str, &Block> = catalog.blocks.iter().map(|b| (b.id.as_str(), b)).collect();
    catalog
        .reading_order
        .iter()
        .map(|ids| ids.iter().filter_map(|id| by_id.get(id.as_str()).copied()).collect())
        .collect()
}

/// Figure path as seen from `extracted/`, where the renderings live.
pub(crate) fn figure_link(block: &Block) -> Option<&str> {
    block
        .metadata
        .figure_path
        .as_deref()
        .map(|p| p.strip_prefix("extracted/").unwrap_or(p))
}

/// Trimmed, non-empty block text.
pub(crate) fn block_text(block: &Block) -> Option<&str> {
    block.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
}
