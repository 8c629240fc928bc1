// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::should_implement_trait)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]
#![cfg_attr(test, allow(unused_variables))]

//! # PDF Catalog
//!
//! Turns PDFs into a stable, validated document catalog: every page is
//! rasterized, a layout detector proposes regions, geometry rules
//! consolidate them, each surviving block gets a stable id, blocks are put
//! in reading order and their text is extracted from the PDF's text layer
//! or, failing that, by OCR.
//!
//! ## Stages
//!
//! - **Rasterize** ([`rendering`]): pages to PNG at the detection DPI, with pixel↔point scales
//! - **Detect** ([`layout`]): ONNX model, fixed regions or a replayed snapshot
//! - **Consolidate** ([`consolidate`]): clip, merge fragments, fold captions, remove overlaps
//! - **Identify** ([`ids`]): `block_{page}_{ordinal}` ids with merge lineage
//! - **Order** ([`pipeline::reading_order`]): two-column or single-column strategies
//! - **Extract** ([`extractors`], [`ocr`], [`text`]): embedded text, OCR fallback, spacing repair
//! - **Write** ([`catalog`]): validation, figure crops, `content.json`, Markdown and HTML
//!
//! [`catalog::repair`] brings catalogs written by older pipelines up to the
//! current id scheme, and [`debug`] draws block overlays for inspection.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use pdf_catalog::config::{IngestConfig, Profile};
//! use pdf_catalog::layout::replay::ReplayDetector;
//! use pdf_catalog::pipeline::IngestPipeline;
//! use pdf_catalog::rendering::pdfium::PdfiumBackend;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Profile::Scientific.create_config();
//! let detector = ReplayDetector::from_file("raw_layouts.json".as_ref())?;
//! let pipeline = IngestPipeline::new(config, Arc::new(detector));
//!
//! let backend = PdfiumBackend::new()?;
//! let summary = pipeline.ingest_pdf(&backend, "paper.pdf".as_ref())?;
//! println!("{}", summary);
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Error handling
pub mod error;

// Configuration
pub mod config;

// Geometry and ids
pub mod geometry;
pub mod ids;

// Input documents and rasterization
pub mod document;
pub mod rendering;

// Layout detection and consolidation
pub mod consolidate;
pub mod layout;
pub mod refine;

// Text extraction
pub mod extractors;
pub mod ocr;
pub mod text;

// Catalog model, persistence and repair
pub mod catalog;

// Derived renderings
pub mod converters;

// Orchestration
pub mod pipeline;

// Block overlays
pub mod debug;

// Re-exports
pub use catalog::{Block, BlockRole, Catalog};
pub use config::{IngestConfig, Profile};
pub use error::{Error, Result};
pub use pipeline::{IngestPipeline, IngestSummary};

// Internal utilities
pub(crate) mod utils {
    //! Internal utility functions for the library.

    use std::cmp::Ordering;

    /// Safely compare two floating point numbers, handling NaN cases.
    ///
    /// NaN values are treated as equal to each other and greater than all other values.
    /// This ensures that sorting operations never panic due to NaN comparisons.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// # use std::cmp::Ordering;
    /// # use pdf_catalog::utils::safe_float_cmp;
    /// assert_eq!(safe_float_cmp(1.0, 2.0), Ordering::Less);
    /// assert_eq!(safe_float_cmp(2.0, 1.0), Ordering::Greater);
    /// assert_eq!(safe_float_cmp(1.0, 1.0), Ordering::Equal);
    ///
    /// // NaN handling
    /// assert_eq!(safe_float_cmp(f32::NAN, f32::NAN), Ordering::Equal);
    /// assert_eq!(safe_float_cmp(f32::NAN, 1.0), Ordering::Greater);
    /// assert_eq!(safe_float_cmp(1.0, f32::NAN), Ordering::Less);
    /// ```
    #[inline]
    pub fn safe_float_cmp(a: f32, b: f32) -> Ordering {
        match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater, // NaN > all numbers
            (false, true) => Ordering::Less,    // all numbers < NaN
            (false, false) => {
                // Both are normal numbers, safe to unwrap
                a.partial_cmp(&b).unwrap()
            },
        }
    }

}

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
