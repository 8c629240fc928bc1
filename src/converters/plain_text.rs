//! Plain text rendering of a catalog.

use crate::catalog::Catalog;

use super::{block_text, blocks_in_reading_order, CatalogConverter};

/// Block texts in reading order, separated by blank lines; pages separated
/// by a form feed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextConverter;

impl PlainTextConverter {
    /// Create a new plain text converter.
    pub fn new() -> Self {
        Self
    }

    /// Text of one page.
    pub fn page_text(&self, catalog: &Catalog, page_index: usize) -> String {
        blocks_in_reading_order(catalog)
            .get(page_index)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| block_text(b))
                    .collect::<Vec<_>>()
                    .join("\n\n")
            })
            .unwrap_or_default()
    }
}

impl CatalogConverter for PlainTextConverter {
    fn convert(&self, catalog: &Catalog) -> String {
        (0..catalog.reading_order.len())
            .map(|p| self.page_text(catalog, p))
            .collect::<Vec<_>>()
            .join("\n\x0c\n")
    }

    fn extension(&self) -> &'static str {
        "txt"
    }
}
