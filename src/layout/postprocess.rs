//! Detector output filtering: score threshold, class-aware NMS, max detections.

use crate::config::IngestConfig;
use crate::utils::safe_float_cmp;

use super::RawRegion;

/// Filter applied to every detector's raw output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionFilter {
    /// Regions scoring below are dropped
    pub score_threshold: f32,
    /// Same-label regions overlapping a better one above this IoU are suppressed
    pub nms_threshold: f32,
    /// Regions kept after NMS, best first
    pub max_detections: usize,
}

impl DetectionFilter {
    /// Filter from the ingestion configuration.
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            score_threshold: config.score_threshold,
            nms_threshold: config.nms_threshold,
            max_detections: config.max_detections,
        }
    }

    /// Apply the filter.
    ///
    /// Output is ordered by descending score; equal scores keep detector
    /// order. Regions whose score is not a number are dropped.
    pub fn apply(&self, regions: Vec<RawRegion>) -> Vec<RawRegion> {
        let mut candidates: Vec<RawRegion> = regions
            .into_iter()
            .filter(|r| r.score.is_finite() && r.score >= self.score_threshold)
            .collect();
        candidates.sort_by(|a, b| safe_float_cmp(b.score, a.score));

        let mut kept: Vec<RawRegion> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let suppressed = kept.iter().any(|k| {
                k.label == candidate.label && k.bbox.iou(&candidate.bbox) > self.nms_threshold
            });
            if suppressed {
                log::trace!("nms suppressed {} at {:?}", candidate.label, candidate.bbox);
                continue;
            }
            kept.push(candidate);
            if kept.len() == self.max_detections {
                break;
            }
        }
        kept
    }
}
