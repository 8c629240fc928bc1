//! Catalog records: pages, blocks, reading order and document metadata.
//!
//! Field order in these structs is the field order in `content.json`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Profile;
use crate::geometry::BBox;
use crate::ids::TransformationReport;

/// Version string written to `metadata.pipeline_version`.
pub const PIPELINE_VERSION: &str = concat!("pdf_catalog/", env!("CARGO_PKG_VERSION"));

/// Semantic role of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockRole {
    /// Heading or title
    Title,
    /// Body text
    Text,
    /// List as a whole
    List,
    /// Single list entry
    ListItem,
    /// Table
    Table,
    /// Figure or image
    Figure,
    /// Rule or separator line
    Separator,
    /// Anything else
    Other,
}

impl BlockRole {
    /// All roles, in display order.
    pub const ALL: [BlockRole; 8] = [
        BlockRole::Title,
        BlockRole::Text,
        BlockRole::List,
        BlockRole::ListItem,
        BlockRole::Table,
        BlockRole::Figure,
        BlockRole::Separator,
        BlockRole::Other,
    ];

    /// Decorative blocks are kept in the catalog but excluded from reading order.
    pub fn is_decorative(&self) -> bool {
        matches!(self, BlockRole::Separator)
    }

    /// Figure and Table may contain caption or overlay text.
    pub fn is_container(&self) -> bool {
        matches!(self, BlockRole::Figure | BlockRole::Table)
    }

    /// Roles that carry running text.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            BlockRole::Title | BlockRole::Text | BlockRole::List | BlockRole::ListItem
        )
    }

    /// Role name as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockRole::Title => "Title",
            BlockRole::Text => "Text",
            BlockRole::List => "List",
            BlockRole::ListItem => "ListItem",
            BlockRole::Table => "Table",
            BlockRole::Figure => "Figure",
            BlockRole::Separator => "Separator",
            BlockRole::Other => "Other",
        }
    }
}

impl std::fmt::Display for BlockRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a block's text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// PDF text objects
    Embedded,
    /// Raster OCR
    Ocr,
    /// OCR was tried but the embedded text was kept
    Mixed,
    /// The extractor exceeded its time budget
    Timeout,
    /// The extractor failed; cause in `extraction_error`
    Error,
    /// No text expected (figure without caption) or no extractor available
    None,
}

impl ExtractionMethod {
    /// Name as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embedded => "embedded",
            Self::Ocr => "ocr",
            Self::Mixed => "mixed",
            Self::Timeout => "timeout",
            Self::Error => "error",
            Self::None => "none",
        }
    }
}

/// A demoted caption retained on its container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionCandidate {
    /// Caption box in pixels
    pub bbox: BBox,
    /// Detector score
    pub score: f32,
}

/// Per-block metadata. Reserved keys are typed; anything else lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockMetadata {
    /// Id before normalization by the repair tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_id: Option<String>,
    /// Final ids absorbed into this block
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub merged_from: Vec<String>,
    /// Detector label before role mapping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Container block this caption belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Captions folded into this container
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub caption_candidates: Vec<CaptionCandidate>,
    /// How the text was obtained
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_method: Option<ExtractionMethod>,
    /// Extractor confidence in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_confidence: Option<f32>,
    /// Extraction failure cause
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
    /// Spacing repair changed the text
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub spacing_repaired: bool,
    /// Figure crop path relative to the document directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figure_path: Option<String>,
    /// Set by the repair tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized: Option<bool>,
    /// Unreserved keys
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// The unit of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// `block_{page}_{NNN}`
    pub id: String,
    /// Page this block lives on
    pub page_index: usize,
    /// Semantic role
    pub role: BlockRole,
    /// Pixel-space box at the catalog DPI
    pub bbox: BBox,
    /// Detector confidence; max of sources after a merge
    #[serde(default)]
    pub score: Option<f32>,
    /// Extracted text; null for figures and tables without captions
    #[serde(default)]
    pub text: Option<String>,
    /// Reserved and free-form metadata
    #[serde(default)]
    pub metadata: BlockMetadata,
}

impl Block {
    /// Create a block with empty text and metadata.
    pub fn new(id: impl Into<String>, page_index: usize, role: BlockRole, bbox: BBox) -> Self {
        Self {
            id: id.into(),
            page_index,
            role,
            bbox,
            score: None,
            text: None,
            metadata: BlockMetadata::default(),
        }
    }

    /// Set the score.
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    /// Set the text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Per-page raster geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    /// 0-based page index
    pub page_index: usize,
    /// Raster width in pixels
    pub pixel_width: u32,
    /// Raster height in pixels
    pub pixel_height: u32,
    /// Raster DPI
    pub dpi: u32,
    /// Page width in PDF points
    #[serde(default)]
    pub pdf_point_width: f32,
    /// Page height in PDF points
    #[serde(default)]
    pub pdf_point_height: f32,
}

impl PageInfo {
    /// Page geometry for a page of the given point size rendered at `dpi`.
    pub fn from_points(page_index: usize, width_pt: f32, height_pt: f32, dpi: u32) -> Self {
        let scale = dpi as f32 / 72.0;
        Self {
            page_index,
            pixel_width: (width_pt * scale).round() as u32,
            pixel_height: (height_pt * scale).round() as u32,
            dpi,
            pdf_point_width: width_pt,
            pdf_point_height: height_pt,
        }
    }

    /// Pixels per PDF point horizontally.
    pub fn scale_x(&self) -> f32 {
        if self.pdf_point_width > 0.0 {
            self.pixel_width as f32 / self.pdf_point_width
        } else {
            self.dpi as f32 / 72.0
        }
    }

    /// Pixels per PDF point vertically.
    pub fn scale_y(&self) -> f32 {
        if self.pdf_point_height > 0.0 {
            self.pixel_height as f32 / self.pdf_point_height
        } else {
            self.dpi as f32 / 72.0
        }
    }

    /// Convert a pixel box to PDF points (top-left origin).
    pub fn to_points(&self, bbox: &BBox) -> BBox {
        bbox.scale(1.0 / self.scale_x(), 1.0 / self.scale_y())
    }

    /// Convert a PDF point box (top-left origin) to pixels.
    pub fn to_pixels(&self, bbox: &BBox) -> BBox {
        bbox.scale(self.scale_x(), self.scale_y())
    }
}

/// Pipeline stage a soft error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Layout detection
    Detect,
    /// Consolidation
    Consolidate,
    /// Text extraction
    Extract,
    /// External refinement
    Refine,
    /// Catalog output
    Write,
}

/// One entry of `metadata.errors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Stage that produced the error
    pub stage: Stage,
    /// Page, when page-specific
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_index: Option<usize>,
    /// Block, when block-specific
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    /// Human-readable cause
    pub message: String,
}

/// Document-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogMetadata {
    /// Document id (directory name under the cache root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    /// Source PDF path as given
    pub source_path: String,
    /// DPI of every bbox in the catalog
    pub detection_dpi: u32,
    /// Profile used for detection
    pub profile: Profile,
    /// Producer version
    pub pipeline_version: String,
    /// Creation timestamp (RFC 3339); the only non-deterministic field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Identifier audit trail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_transformations: Option<TransformationReport>,
    /// Aggregated per-block and per-page soft errors
    pub errors: Vec<ErrorRecord>,
    /// Set by the repair tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids_normalized: Option<bool>,
    /// When the repair tool normalized ids
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalization_date: Option<String>,
    /// Number of ids renamed by the repair tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_mapping_count: Option<usize>,
    /// Unreserved keys
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Persisted per-document output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Document-level metadata
    pub metadata: CatalogMetadata,
    /// Page geometry, indexed by page
    pub pages: Vec<PageInfo>,
    /// All blocks of the document
    pub blocks: Vec<Block>,
    /// Per-page block id sequence
    pub reading_order: Vec<Vec<String>>,
}

impl Catalog {
    /// Look up a block by id.
    pub fn block(&self, id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    /// Blocks on one page, in catalog order.
    pub fn blocks_on_page(&self, page_index: usize) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(move |b| b.page_index == page_index)
    }

    /// Pretty JSON as written to `content.json`.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse `content.json` text.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_info_from_points() {
        let page = PageInfo::from_points(0, 612.0, 792.0, 200);
        assert_eq!(page.pixel_width, 1700);
        assert_eq!(page.pixel_height, 2200);
        assert!((page.scale_x() - 200.0 / 72.0).abs() < 1e-4);
        let px = page.to_pixels(&BBox::new(72.0, 72.0, 144.0, 144.0));
        assert!((px.x1 - 200.0).abs() < 0.01);
        let back = page.to_points(&px);
        assert!((back.x2 - 144.0).abs() < 0.01);
    }

    #[test]
    fn test_block_serialization_shape() {
        let mut block = Block::new("block_0_000", 0, BlockRole::Text, BBox::new(1.0, 2.0, 3.0, 4.0))
            .with_score(0.9)
            .with_text("hello");
        block.metadata.extraction_method = Some(ExtractionMethod::Embedded);
        block.metadata.merged_from = vec!["block_0_001".to_string()];
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["role"], "Text");
        assert_eq!(value["bbox"], serde_json::json!([1.0, 2.0, 3.0, 4.0]));
        assert_eq!(value["metadata"]["extraction_method"], "embedded");
        assert_eq!(value["metadata"]["merged_from"][0], "block_0_001");
        assert!(value["metadata"].get("original_id").is_none());
        assert!(value["metadata"].get("spacing_repaired").is_none());
    }

    #[test]
    fn test_unreserved_metadata_round_trips() {
        let json = r#"{
            "id": "det_5", "page_index": 0, "role": "Figure",
            "bbox": [0, 0, 10, 10], "score": null, "text": null,
            "metadata": {"source": "legacy", "original_id": "x"}
        }"#;
        let block: Block = serde_json::from_str(json).unwrap();
        assert_eq!(block.metadata.original_id.as_deref(), Some("x"));
        assert_eq!(block.metadata.extra["source"], "legacy");
        assert_eq!(block.score, None);
        let out = serde_json::to_value(&block).unwrap();
        assert_eq!(out["metadata"]["source"], "legacy");
    }

    #[test]
    fn test_roles() {
        assert!(BlockRole::Separator.is_decorative());
        assert!(BlockRole::Figure.is_container());
        assert!(BlockRole::Table.is_container());
        assert!(!BlockRole::Text.is_container());
        assert!(BlockRole::ListItem.is_textual());
        assert!(!BlockRole::Other.is_textual());
    }
}
