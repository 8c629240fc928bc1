//! Read-side access to an existing catalog.

use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;

use crate::converters::PlainTextConverter;
use crate::error::Result;

use super::model::{Block, BlockRole, Catalog};

/// Counts over a catalog's blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogStatistics {
    /// Pages in the document
    pub pages: usize,
    /// Blocks in the document
    pub blocks: usize,
    /// Blocks per role, in role display order
    pub by_role: IndexMap<String, usize>,
    /// Blocks per extraction method, sorted by method name
    pub by_method: IndexMap<String, usize>,
    /// Soft errors recorded in the catalog
    pub errors: usize,
}

/// Convenience wrapper over a loaded [`Catalog`].
#[derive(Debug, Clone)]
pub struct CatalogReader {
    catalog: Catalog,
}

impl CatalogReader {
    /// Load `content.json`.
    pub fn open(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let catalog = Catalog::from_json(&raw)?;
        log::debug!("loaded {} ({} blocks)", path.display(), catalog.blocks.len());
        Ok(Self { catalog })
    }

    /// Wrap a catalog already in memory.
    pub fn from_catalog(catalog: Catalog) -> Self {
        Self { catalog }
    }

    /// The underlying catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Consume the reader.
    pub fn into_catalog(self) -> Catalog {
        self.catalog
    }

    /// Block by id.
    pub fn block(&self, id: &str) -> Option<&Block> {
        self.catalog.block(id)
    }

    /// Blocks on one page, in catalog order.
    pub fn blocks_on_page(&self, page_index: usize) -> Vec<&Block> {
        self.catalog.blocks_on_page(page_index).collect()
    }

    /// Blocks with the given role, in catalog order.
    pub fn blocks_with_role(&self, role: BlockRole) -> Vec<&Block> {
        self.catalog.blocks.iter().filter(|b| b.role == role).collect()
    }

    /// Texts of one page in reading order, separated by blank lines.
    pub fn page_text(&self, page_index: usize) -> String {
        PlainTextConverter::new().page_text(&self.catalog, page_index)
    }

    /// Counts per role and per extraction method.
    pub fn statistics(&self) -> CatalogStatistics {
        let mut by_role = IndexMap::new();
        for role in BlockRole::ALL {
            let n = self.catalog.blocks.iter().filter(|b| b.role == role).count();
            if n > 0 {
                by_role.insert(role.as_str().to_string(), n);
            }
        }

        let mut by_method: IndexMap<String, usize> = IndexMap::new();
        for block in &self.catalog.blocks {
            let name = block
                .metadata
                .extraction_method
                .map(|m| m.as_str())
                .unwrap_or("unset");
            *by_method.entry(name.to_string()).or_insert(0) += 1;
        }
        by_method.sort_keys();

        CatalogStatistics {
            pages: self.catalog.pages.len(),
            blocks: self.catalog.blocks.len(),
            by_role,
            by_method,
            errors: self.catalog.metadata.errors.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ExtractionMethod, PageInfo};
    use crate::geometry::BBox;

    fn reader() -> CatalogReader {
        let bbox = BBox::new(10.0, 10.0, 50.0, 50.0);
        let mut title = Block::new("block_0_000", 0, BlockRole::Title, bbox).with_text("Heading");
        title.metadata.extraction_method = Some(ExtractionMethod::Embedded);
        let mut body = Block::new("block_0_001", 0, BlockRole::Text, bbox.pad(20.0)).with_text("Body");
        body.metadata.extraction_method = Some(ExtractionMethod::Ocr);
        let mut figure = Block::new("block_1_000", 1, BlockRole::Figure, bbox);
        figure.metadata.extraction_method = Some(ExtractionMethod::None);
        let rule = Block::new("block_1_001", 1, BlockRole::Separator, bbox);

        CatalogReader::from_catalog(Catalog {
            pages: vec![
                PageInfo::from_points(0, 100.0, 100.0, 72),
                PageInfo::from_points(1, 100.0, 100.0, 72),
            ],
            blocks: vec![title, body, figure, rule],
            reading_order: vec![
                vec!["block_0_000".to_string(), "block_0_001".to_string()],
                vec!["block_1_000".to_string()],
            ],
            ..Default::default()
        })
    }

    #[test]
    fn test_lookups() {
        let reader = reader();
        assert_eq!(reader.block("block_0_001").map(|b| b.role), Some(BlockRole::Text));
        assert!(reader.block("block_9_000").is_none());
        assert_eq!(reader.blocks_on_page(1).len(), 2);
        assert_eq!(reader.blocks_with_role(BlockRole::Separator)[0].id, "block_1_001");
    }

    #[test]
    fn test_page_text() {
        let reader = reader();
        assert_eq!(reader.page_text(0), "Heading\n\nBody");
        assert_eq!(reader.page_text(1), "");
        assert_eq!(reader.page_text(5), "");
    }

    #[test]
    fn test_statistics() {
        let stats = reader().statistics();
        assert_eq!(stats.pages, 2);
        assert_eq!(stats.blocks, 4);
        assert_eq!(
            stats.by_role.keys().collect::<Vec<_>>(),
            vec!["Title", "Text", "Figure", "Separator"]
        );
        assert_eq!(stats.by_method.get("ocr"), Some(&1));
        assert_eq!(stats.by_method.get("unset"), Some(&1));
        assert_eq!(
            stats.by_method.keys().collect::<Vec<_>>(),
            vec!["embedded", "none", "ocr", "unset"]
        );
    }

    #[test]
    fn test_open_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.json");
        std::fs::write(&path, reader().catalog().to_json().unwrap()).unwrap();
        let loaded = CatalogReader::open(&path).unwrap();
        assert_eq!(loaded.catalog(), reader().catalog());
    }
}
