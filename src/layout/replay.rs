//! Raw layout snapshots and a detector that replays them.
//!
//! With `save_intermediate_states` enabled the pipeline writes every page's
//! filtered detections to `raw_layouts/raw_layout_boxes.json`. Feeding that
//! file back through [`ReplayDetector`] re-runs consolidation, ids, reading
//! order and extraction without loading a model.

use std::path::Path;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::{LayoutDetector, RawRegion};

/// Detections of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDetections {
    /// Page index (0-based)
    pub page_index: usize,
    /// Filtered detector output in detector order
    pub regions: Vec<RawRegion>,
}

/// Contents of `raw_layout_boxes.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLayoutSnapshot {
    /// Detector that produced the regions
    pub detector: String,
    /// DPI the boxes are expressed in
    pub detection_dpi: u32,
    /// Per-page detections
    pub pages: Vec<PageDetections>,
}

impl RawLayoutSnapshot {
    /// Read a snapshot file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Regions recorded for a page.
    pub fn regions(&self, page_index: usize) -> Option<&[RawRegion]> {
        self.pages
            .iter()
            .find(|p| p.page_index == page_index)
            .map(|p| p.regions.as_slice())
    }
}

/// Detector replaying a saved snapshot.
#[derive(Debug, Clone)]
pub struct ReplayDetector {
    snapshot: RawLayoutSnapshot,
}

impl ReplayDetector {
    /// Wrap an in-memory snapshot.
    pub fn new(snapshot: RawLayoutSnapshot) -> Self {
        Self { snapshot }
    }

    /// Load `raw_layout_boxes.json`.
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(RawLayoutSnapshot::load(path)?))
    }

    /// DPI the snapshot was taken at; replay only makes sense at the same DPI.
    pub fn detection_dpi(&self) -> u32 {
        self.snapshot.detection_dpi
    }
}

impl LayoutDetector for ReplayDetector {
    fn detect(&self, page_index: usize, _image: &RgbImage) -> Result<Vec<RawRegion>> {
        self.snapshot
            .regions(page_index)
            .map(|r| r.to_vec())
            .ok_or_else(|| {
                Error::Detector(format!("snapshot has no entry for page {}", page_index))
            })
    }

    fn name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;

    #[test]
    fn test_replay_from_file() {
        let snapshot = RawLayoutSnapshot {
            detector: "onnx".to_string(),
            detection_dpi: 200,
            pages: vec![
                PageDetections {
                    page_index: 0,
                    regions: vec![RawRegion::new(BBox::new(1.0, 2.0, 30.0, 40.0), "Title", 0.8)],
                },
                PageDetections {
                    page_index: 1,
                    regions: vec![],
                },
            ],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw_layout_boxes.json");
        std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();

        let detector = ReplayDetector::from_file(&path).unwrap();
        assert_eq!(detector.detection_dpi(), 200);
        let image = RgbImage::new(1, 1);
        assert_eq!(detector.detect(0, &image).unwrap()[0].label, "Title");
        assert!(detector.detect(1, &image).unwrap().is_empty());
        assert!(detector.detect(2, &image).is_err());
    }
}
