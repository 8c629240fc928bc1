//! Error types for the ingestion pipeline.
//!
//! Fatal conditions (unreadable input, detector that cannot run, invariant
//! violations at write time) surface as [`Error`]. Per-block failures during
//! text extraction are recorded as values in the catalog instead.

use crate::catalog::validate::InvariantViolation;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while ingesting or repairing a document.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image encode/decode error
    #[error("Image error: {0}")]
    Image(String),

    /// The PDF could not be opened or parsed
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// The PDF has no pages
    #[error("Document has no pages: {0}")]
    EmptyDocument(String),

    /// A page failed to rasterize
    #[error("Failed to render page {page}: {reason}")]
    Render {
        /// Page index (0-based)
        page: usize,
        /// Reason for the failure
        reason: String,
    },

    /// Layout detector failed to load or run
    #[error("Layout detector error: {0}")]
    Detector(String),

    /// A blocking stage exceeded its time budget
    #[error("{stage} timed out on page {page}")]
    Timeout {
        /// Stage name ("detector", "ocr")
        stage: &'static str,
        /// Page index (0-based)
        page: usize,
    },

    /// OCR engine failure
    #[error("OCR error: {0}")]
    Ocr(String),

    /// Unknown option key or ill-typed option value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog failed validation and was not written
    #[error("Catalog invariant violated: {0}")]
    Invariant(InvariantViolation),

    /// The catalog file does not have the expected shape
    #[error("Malformed catalog: {0}")]
    Catalog(String),

    /// Processing was cancelled between stages
    #[error("Processing cancelled")]
    Cancelled,

    /// External layout refinement failed
    #[error("Layout refinement failed: {0}")]
    Refinement(String),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

impl From<InvariantViolation> for Error {
    fn from(violation: InvariantViolation) -> Self {
        Error::Invariant(violation)
    }
}
