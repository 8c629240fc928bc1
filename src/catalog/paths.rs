//! Document ids and the on-disk layout under `<cache_dir>/<doc_id>/`.
//!
//! ```text
//! pages/page-NNN.png
//! raw_layouts/raw_layout_boxes.json
//! merged/merged_boxes.json
//! visualizations/page-NNN.png
//! extracted/content.json
//! extracted/figures/<block_id>.png
//! extracted/document.md
//! extracted/document.html
//! ```

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::Result;

lazy_static! {
    static ref UNSAFE_CHARS: Regex = Regex::new(r"[^\w\-.]").unwrap();
}

/// First 8 hex chars of the SHA-256 of the file contents.
pub fn content_hash_id(pdf_path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(pdf_path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(&hasher.finalize()[..4]))
}

/// Sanitized file stem, or `None` when nothing usable remains.
pub fn readable_id(pdf_path: &Path) -> Option<String> {
    let stem = pdf_path.file_stem()?.to_string_lossy();
    let sanitized = UNSAFE_CHARS.replace_all(&stem, "_").into_owned();
    if sanitized.is_empty() || sanitized.starts_with('.') {
        None
    } else {
        Some(sanitized)
    }
}

/// Document id: readable stem when requested and usable, content hash otherwise.
pub fn doc_id(pdf_path: &Path, human_readable: bool) -> Result<String> {
    if human_readable {
        if let Some(id) = readable_id(pdf_path) {
            return Ok(id);
        }
    }
    content_hash_id(pdf_path)
}

/// Paths of one document's outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPaths {
    root: PathBuf,
}

impl DocumentPaths {
    /// Layout rooted at `<cache_dir>/<doc_id>`.
    pub fn new(cache_dir: &Path, doc_id: &str) -> Self {
        Self {
            root: cache_dir.join(doc_id),
        }
    }

    /// Layout rooted at an existing document directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Document directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `pages/`
    pub fn pages_dir(&self) -> PathBuf {
        self.root.join("pages")
    }

    /// `pages/page-NNN.png`
    pub fn page_image(&self, page_index: usize) -> PathBuf {
        self.pages_dir().join(format!("page-{:03}.png", page_index))
    }

    /// `raw_layouts/raw_layout_boxes.json`
    pub fn raw_layouts(&self) -> PathBuf {
        self.root.join("raw_layouts").join("raw_layout_boxes.json")
    }

    /// `merged/merged_boxes.json`
    pub fn merged_boxes(&self) -> PathBuf {
        self.root.join("merged").join("merged_boxes.json")
    }

    /// `visualizations/page-NNN.png`
    pub fn visualization(&self, page_index: usize) -> PathBuf {
        self.root
            .join("visualizations")
            .join(format!("page-{:03}.png", page_index))
    }

    /// `extracted/`
    pub fn extracted_dir(&self) -> PathBuf {
        self.root.join("extracted")
    }

    /// `extracted/content.json`
    pub fn content_json(&self) -> PathBuf {
        self.extracted_dir().join("content.json")
    }

    /// `extracted/figures/`
    pub fn figures_dir(&self) -> PathBuf {
        self.extracted_dir().join("figures")
    }

    /// `extracted/figures/<block_id>.png`
    pub fn figure(&self, block_id: &str) -> PathBuf {
        self.figures_dir().join(format!("{}.png", block_id))
    }

    /// Figure path relative to the document directory, as stored in metadata.
    pub fn figure_relative(block_id: &str) -> String {
        format!("extracted/figures/{}.png", block_id)
    }

    /// `extracted/document.md`
    pub fn markdown(&self) -> PathBuf {
        self.extracted_dir().join("document.md")
    }

    /// `extracted/document.html`
    pub fn html(&self) -> PathBuf {
        self.extracted_dir().join("document.html")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readable_id_sanitizes() {
        assert_eq!(
            readable_id(Path::new("/data/Flublok Leaflet (2024).pdf")).as_deref(),
            Some("Flublok_Leaflet__2024_")
        );
        assert_eq!(readable_id(Path::new("/tmp/.pdf")), None);
    }

    #[test]
    fn test_content_hash_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, b"abc").unwrap();
        // sha256("abc") = ba7816bf...
        assert_eq!(content_hash_id(&path).unwrap(), "ba7816bf");
        assert_eq!(doc_id(&path, false).unwrap(), "ba7816bf");
        assert_eq!(doc_id(&path, true).unwrap(), "a");
    }

    #[test]
    fn test_layout() {
        let paths = DocumentPaths::new(Path::new("/cache"), "ba7816bf");
        assert_eq!(paths.page_image(3), PathBuf::from("/cache/ba7816bf/pages/page-003.png"));
        assert_eq!(
            paths.content_json(),
            PathBuf::from("/cache/ba7816bf/extracted/content.json")
        );
        assert_eq!(
            paths.figure("block_0_004"),
            PathBuf::from("/cache/ba7816bf/extracted/figures/block_0_004.png")
        );
        assert_eq!(
            paths.raw_layouts(),
            PathBuf::from("/cache/ba7816bf/raw_layouts/raw_layout_boxes.json")
        );
    }
}
