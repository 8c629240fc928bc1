//! The document catalog: records, invariants, persistence and repair.
//!
//! - [`model`]: `Catalog`, `Block`, `PageInfo` and friends as written to `content.json`
//! - [`validate`]: catalog invariants, checked before anything is written
//! - [`writer`]: atomic `content.json`, figure crops, derived renderings
//! - [`reader`]: read-side helpers over an existing catalog
//! - [`repair`]: id normalization and reading-order repair of old catalogs
//! - [`paths`]: document ids and the on-disk layout

pub mod model;
pub mod paths;
pub mod reader;
pub mod repair;
pub mod validate;
pub mod writer;

pub use model::{
    Block, BlockMetadata, BlockRole, CaptionCandidate, Catalog, CatalogMetadata, ErrorRecord,
    ExtractionMethod, PageInfo, Stage, PIPELINE_VERSION,
};
pub use paths::DocumentPaths;
pub use reader::{CatalogReader, CatalogStatistics};
pub use repair::{CatalogRepairer, CheckReport, DirectoryReport, RepairOutcome};
pub use validate::{validate, validate_all, Invariant, InvariantViolation};
pub use writer::CatalogWriter;
