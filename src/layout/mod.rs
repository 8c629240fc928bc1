//! Layout detection: page image → raw typed regions.
//!
//! A [`LayoutDetector`] is a long-lived strategy object, built once per process
//! and shared across documents. Whatever it returns passes through
//! [`postprocess::DetectionFilter`] (score threshold, class-aware NMS, cap,
//! clipping) before consolidation, so detectors may be naive about those.
//!
//! # Available detectors
//!
//! - [`onnx::OnnxLayoutDetector`]: YOLO-style ONNX export (feature `ml`)
//! - [`replay::ReplayDetector`]: replays a saved `raw_layout_boxes.json`
//! - [`FixedDetector`]: regions supplied in memory per page

pub mod postprocess;
pub mod replay;

#[cfg(feature = "ml")]
#[cfg_attr(docsrs, doc(cfg(feature = "ml")))]
pub mod onnx;

use std::collections::HashMap;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::catalog::BlockRole;
use crate::config::Profile;
use crate::error::Result;
use crate::geometry::BBox;

pub use postprocess::DetectionFilter;
pub use replay::{RawLayoutSnapshot, ReplayDetector};

/// A detector output before consolidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRegion {
    /// Box in page pixels
    pub bbox: BBox,
    /// Label from the detector's label map
    pub label: String,
    /// Confidence in [0, 1]
    pub score: f32,
}

impl RawRegion {
    /// Create a region.
    pub fn new(bbox: BBox, label: impl Into<String>, score: f32) -> Self {
        Self {
            bbox,
            label: label.into(),
            score,
        }
    }
}

/// Image → raw regions.
pub trait LayoutDetector: Send + Sync {
    /// Detect regions on one page raster.
    fn detect(&self, page_index: usize, image: &RgbImage) -> Result<Vec<RawRegion>>;

    /// Name for logs and catalog metadata.
    fn name(&self) -> &str;
}

/// Detector label ↔ catalog role table for a profile.
#[derive(Debug, Clone)]
pub struct LabelMap {
    classes: Vec<(u32, &'static str, BlockRole)>,
}

impl LabelMap {
    /// Table for the given profile.
    ///
    /// Scientific models follow PubLayNet class ids; marketing models follow
    /// PrimaLayout, whose class 0 is background.
    pub fn for_profile(profile: Profile) -> Self {
        let classes = match profile {
            Profile::Scientific => vec![
                (0, "Text", BlockRole::Text),
                (1, "Title", BlockRole::Title),
                (2, "List", BlockRole::List),
                (3, "Table", BlockRole::Table),
                (4, "Figure", BlockRole::Figure),
            ],
            Profile::Marketing => vec![
                (1, "TextRegion", BlockRole::Text),
                (2, "ImageRegion", BlockRole::Figure),
                (3, "TableRegion", BlockRole::Table),
                (4, "MathsRegion", BlockRole::Other),
                (5, "SeparatorRegion", BlockRole::Separator),
                (6, "OtherRegion", BlockRole::Other),
            ],
        };
        Self { classes }
    }

    /// Label for a model class id.
    pub fn label(&self, class_id: u32) -> Option<&'static str> {
        self.classes
            .iter()
            .find(|(id, _, _)| *id == class_id)
            .map(|(_, label, _)| *label)
    }

    /// Catalog role for a label; unknown labels map to `Other`.
    pub fn role(&self, label: &str) -> BlockRole {
        self.classes
            .iter()
            .find(|(_, l, _)| *l == label)
            .map(|(_, _, role)| *role)
            .unwrap_or(BlockRole::Other)
    }

    /// Labels in class-id order.
    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.classes.iter().map(|(_, label, _)| *label)
    }
}

/// Detector returning regions registered per page.
///
/// Useful when layout comes from elsewhere (manual annotation, another
/// service) and for driving the pipeline without a model.
#[derive(Debug, Clone, Default)]
pub struct FixedDetector {
    pages: HashMap<usize, Vec<RawRegion>>,
}

impl FixedDetector {
    /// Create an empty detector; unregistered pages yield no regions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register regions for a page.
    pub fn with_page(mut self, page_index: usize, regions: Vec<RawRegion>) -> Self {
        self.pages.insert(page_index, regions);
        self
    }
}

impl LayoutDetector for FixedDetector {
    fn detect(&self, page_index: usize, _image: &RgbImage) -> Result<Vec<RawRegion>> {
        Ok(self.pages.get(&page_index).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scientific_label_map() {
        let map = LabelMap::for_profile(Profile::Scientific);
        assert_eq!(map.label(0), Some("Text"));
        assert_eq!(map.label(4), Some("Figure"));
        assert_eq!(map.label(5), None);
        assert_eq!(map.role("Title"), BlockRole::Title);
        assert_eq!(map.role("List"), BlockRole::List);
    }

    #[test]
    fn test_marketing_label_map() {
        let map = LabelMap::for_profile(Profile::Marketing);
        assert_eq!(map.label(0), None);
        assert_eq!(map.role("ImageRegion"), BlockRole::Figure);
        assert_eq!(map.role("SeparatorRegion"), BlockRole::Separator);
        assert_eq!(map.role("MathsRegion"), BlockRole::Other);
        assert_eq!(map.role("Banner"), BlockRole::Other);
        assert_eq!(map.labels().count(), 6);
    }

    #[test]
    fn test_fixed_detector() {
        let detector = FixedDetector::new().with_page(
            1,
            vec![RawRegion::new(BBox::new(0.0, 0.0, 10.0, 10.0), "Text", 0.9)],
        );
        let image = RgbImage::new(20, 20);
        assert!(detector.detect(0, &image).unwrap().is_empty());
        assert_eq!(detector.detect(1, &image).unwrap().len(), 1);
    }
}
