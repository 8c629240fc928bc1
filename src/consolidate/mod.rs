//! Geometric consolidation of raw detections into canonical regions.
//!
//! Steps, per page:
//!
//! 1. Clip to the page; drop boxes under 16 px² or with a side under 4 px.
//! 2. Map detector labels to catalog roles.
//! 3. Merge same-role fragments (IoU above the merge threshold, or stacked with
//!    a vertical gap under 20 px and ≥ 60% horizontal overlap). Figures and
//!    tables never merge in this step. Gaps and horizontal overlap are measured
//!    on the boxes as detected, before any padding.
//! 4. Text ≥ 95% inside a Figure/Table becomes a caption: kept as a child when
//!    its area is ≥ 10% of the container's, otherwise folded into the
//!    container's `caption_candidates`.
//! 5. Pad every box and re-clip.
//! 6. Resolve remaining overlaps above the merge threshold by merging the
//!    smaller region into the larger, unless the pair is a container holding a
//!    text overlay. Steps 6 and 3 are then repeated until neither changes
//!    anything, so the output is a fixed point of both.
//!
//! Every merge and deletion is reported to the [`IdManager`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::catalog::validate::overlap_legal;
use crate::catalog::{BlockRole, CaptionCandidate, PageInfo};
use crate::config::IngestConfig;
use crate::geometry::BBox;
use crate::ids::{IdManager, MergeSource, TempId};
use crate::layout::{LabelMap, RawRegion};
use crate::utils::safe_float_cmp;

/// Boxes with a smaller area are dropped.
pub const MIN_AREA: f32 = 16.0;
/// Boxes with a shorter side are dropped.
pub const MIN_SIDE: f32 = 4.0;
/// Stacked fragments merge when their vertical gap is below this.
pub const MAX_STACK_GAP: f32 = 20.0;
/// Minimum horizontal overlap (of the narrower box) for stacked fragments.
pub const MIN_STACK_OVERLAP: f32 = 0.6;
/// Containment above which text inside a Figure/Table is a caption.
pub const CAPTION_CONTAINMENT: f32 = 0.95;
/// Caption area, relative to its container, from which it stays a block.
pub const CAPTION_MIN_AREA_RATIO: f32 = 0.10;

/// A region in flight between detection and the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Temporary id owned by the id manager
    pub id: TempId,
    /// Catalog role
    pub role: BlockRole,
    /// Detector label of the role-defining source
    pub label: String,
    /// Pixel box
    pub bbox: BBox,
    /// Pixel box before padding; stacked-fragment gaps are measured on it
    pub unpadded: BBox,
    /// Max score of all sources
    pub score: f32,
    /// Container this caption belongs to
    pub parent: Option<TempId>,
    /// Captions folded into this container
    pub caption_candidates: Vec<CaptionCandidate>,
}

/// Counters for one page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    /// Raw regions received
    pub raw: usize,
    /// Regions that had to be clipped to the page
    pub clipped: usize,
    /// Regions dropped as too small or outside the page
    pub dropped: usize,
    /// Pairwise merges performed
    pub merged: usize,
    /// Captions folded into their container
    pub demoted: usize,
    /// Regions left at the end
    pub kept: usize,
}

impl ConsolidationReport {
    /// Add another page's counters.
    pub fn absorb(&mut self, other: &ConsolidationReport) {
        self.raw += other.raw;
        self.clipped += other.clipped;
        self.dropped += other.dropped;
        self.merged += other.merged;
        self.demoted += other.demoted;
        self.kept += other.kept;
    }
}

/// Consolidation policy.
#[derive(Debug, Clone)]
pub struct Consolidator {
    labels: LabelMap,
    merge_threshold: f32,
    box_padding: f32,
    expand_boxes: bool,
    merge_overlapping: bool,
}

impl Consolidator {
    /// Policy from the ingestion configuration.
    pub fn new(config: &IngestConfig, labels: LabelMap) -> Self {
        Self {
            labels,
            merge_threshold: config.merge_threshold,
            box_padding: config.box_padding,
            expand_boxes: config.expand_boxes,
            merge_overlapping: config.merge_overlapping,
        }
    }

    /// IoU threshold used for merging and overlap resolution.
    pub fn merge_threshold(&self) -> f32 {
        self.merge_threshold
    }

    /// Run all steps on one page's filtered detections.
    pub fn consolidate(
        &self,
        page: &PageInfo,
        raw: &[RawRegion],
        ids: &mut IdManager,
    ) -> (Vec<Region>, ConsolidationReport) {
        let mut report = ConsolidationReport {
            raw: raw.len(),
            ..Default::default()
        };
        let (width, height) = (page.pixel_width as f32, page.pixel_height as f32);
        let temp_ids = ids.assign(page.page_index, raw.len());

        let mut regions = Vec::with_capacity(raw.len());
        for (region, id) in raw.iter().zip(temp_ids) {
            let Some(bbox) = region.bbox.clip(width, height) else {
                log::warn!(
                    "page {}: dropping {} box {:?} outside the page",
                    page.page_index,
                    region.label,
                    region.bbox
                );
                ids.register_deletion(id);
                report.dropped += 1;
                continue;
            };
            if bbox != region.bbox {
                log::warn!(
                    "page {}: clipped {} box {:?} to {:?}",
                    page.page_index,
                    region.label,
                    region.bbox,
                    bbox
                );
                report.clipped += 1;
            }
            if bbox.area() < MIN_AREA || bbox.width() < MIN_SIDE || bbox.height() < MIN_SIDE {
                log::debug!("page {}: dropping degenerate box {:?}", page.page_index, bbox);
                ids.register_deletion(id);
                report.dropped += 1;
                continue;
            }
            regions.push(Region {
                id,
                role: self.labels.role(&region.label),
                label: region.label.clone(),
                bbox,
                unpadded: bbox,
                score: region.score,
                parent: None,
                caption_candidates: Vec::new(),
            });
        }

        if self.merge_overlapping {
            report.merged += self.merge_same_role(&mut regions, ids);
        }

        report.demoted += self.attach_captions(&mut regions, ids);

        if self.expand_boxes && self.box_padding > 0.0 {
            for region in &mut regions {
                if let Some(padded) = region.bbox.pad(self.box_padding).clip(width, height) {
                    region.bbox = padded;
                }
            }
        }

        loop {
            let mut changed = self.resolve_overlaps(&mut regions, ids);
            if self.merge_overlapping {
                changed += self.merge_same_role(&mut regions, ids);
            }
            report.merged += changed;
            if changed == 0 {
                break;
            }
        }

        report.kept = regions.len();
        log::debug!("page {}: {:?}", page.page_index, report);
        (regions, report)
    }

    fn mergeable_fragments(&self, a: &Region, b: &Region) -> bool {
        if a.role != b.role || a.role.is_container() || a.parent != b.parent {
            return false;
        }
        a.bbox.iou(&b.bbox) > self.merge_threshold
            || (a.unpadded.vertical_gap(&b.unpadded) < MAX_STACK_GAP
                && a.unpadded.horizontal_overlap_ratio(&b.unpadded) >= MIN_STACK_OVERLAP)
    }

    /// Step 3: merge same-role fragments to a fixed point. Returns the merge count.
    pub fn merge_same_role(&self, regions: &mut Vec<Region>, ids: &mut IdManager) -> usize {
        let mut merges = 0;
        while let Some((i, j)) = find_pair(regions, |a, b| self.mergeable_fragments(a, b)) {
            let role = regions[i].role;
            match merge_regions(&regions[i], &regions[j], role, ids) {
                Some(merged) => {
                    regions[i] = merged;
                    regions.remove(j);
                    merges += 1;
                },
                None => break,
            }
        }
        merges
    }

    /// Step 6: merge pairs overlapping above the threshold unless the overlap is a
    /// legal container overlay. Returns the merge count.
    pub fn resolve_overlaps(&self, regions: &mut Vec<Region>, ids: &mut IdManager) -> usize {
        let threshold = self.merge_threshold;
        let mut merges = 0;
        while let Some((i, j)) = find_pair(regions, |a, b| {
            !overlap_legal((a.role, &a.bbox), (b.role, &b.bbox), threshold)
        }) {
            let (larger, smaller) = if dominates(&regions[i], &regions[j]) {
                (i, j)
            } else {
                (j, i)
            };
            log::debug!(
                "resolving overlap: {} absorbs {} (IoU {:.3})",
                regions[larger].role,
                regions[smaller].role,
                regions[i].bbox.iou(&regions[j].bbox)
            );
            let role = regions[larger].role;
            match merge_regions(&regions[larger], &regions[smaller], role, ids) {
                Some(merged) => {
                    regions[i] = merged;
                    regions.remove(j);
                    merges += 1;
                },
                None => break,
            }
        }
        merges
    }

    /// Step 4: link or fold text contained in figures and tables.
    fn attach_captions(&self, regions: &mut Vec<Region>, ids: &mut IdManager) -> usize {
        let mut demoted = Vec::new();
        for t in 0..regions.len() {
            if regions[t].role != BlockRole::Text || regions[t].parent.is_some() {
                continue;
            }
            let text_box = regions[t].bbox;
            let container = regions
                .iter()
                .enumerate()
                .filter(|(_, c)| c.role.is_container())
                .filter(|(_, c)| c.bbox.containment_of(&text_box) >= CAPTION_CONTAINMENT)
                .min_by(|(_, a), (_, b)| {
                    safe_float_cmp(a.bbox.area(), b.bbox.area())
                        .then_with(|| a.bbox.lexicographic_cmp(&b.bbox))
                })
                .map(|(index, _)| index);
            let Some(c) = container else { continue };

            if text_box.area() >= CAPTION_MIN_AREA_RATIO * regions[c].bbox.area() {
                regions[t].parent = Some(regions[c].id);
            } else {
                let candidate = CaptionCandidate {
                    bbox: text_box,
                    score: regions[t].score,
                };
                regions[c].caption_candidates.push(candidate);
                demoted.push(t);
            }
        }
        for &t in demoted.iter().rev() {
            let region = regions.remove(t);
            log::debug!("folded caption {:?} into its container", region.bbox);
            ids.register_deletion(region.id);
        }
        demoted.len()
    }
}

/// First pair `(i, j)`, `i < j`, satisfying the predicate.
fn find_pair<F>(regions: &[Region], mut pred: F) -> Option<(usize, usize)>
where
    F: FnMut(&Region, &Region) -> bool,
{
    for i in 0..regions.len() {
        for j in i + 1..regions.len() {
            if pred(&regions[i], &regions[j]) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Does `a` absorb `b` when they must be merged? Larger area wins, then score,
/// then lexicographic position.
fn dominates(a: &Region, b: &Region) -> bool {
    safe_float_cmp(a.bbox.area(), b.bbox.area())
        .then_with(|| safe_float_cmp(a.score, b.score))
        .then_with(|| b.bbox.lexicographic_cmp(&a.bbox))
        != Ordering::Less
}

fn merge_regions(a: &Region, b: &Region, role: BlockRole, ids: &mut IdManager) -> Option<Region> {
    let (first, second) = if dominates(a, b) { (a, b) } else { (b, a) };
    let sources = [
        MergeSource {
            id: first.id,
            bbox: first.bbox,
            score: first.score,
        },
        MergeSource {
            id: second.id,
            bbox: second.bbox,
            score: second.score,
        },
    ];
    let id = ids.register_merge(&sources)?;
    let role_source = if a.role == role { a } else { b };
    let mut caption_candidates = first.caption_candidates.clone();
    caption_candidates.extend(second.caption_candidates.iter().cloned());
    Some(Region {
        id,
        role,
        label: role_source.label.clone(),
        bbox: a.bbox.merge(&b.bbox),
        unpadded: a.unpadded.merge(&b.unpadded),
        score: a.score.max(b.score),
        parent: role_source.parent,
        caption_candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;

    fn page() -> PageInfo {
        PageInfo {
            page_index: 0,
            pixel_width: 1240,
            pixel_height: 1754,
            dpi: 150,
            pdf_point_width: 595.2,
            pdf_point_height: 841.9,
        }
    }

    fn consolidator(padding: f32) -> Consolidator {
        let config = Profile::Scientific.create_config().with_box_padding(padding);
        Consolidator::new(&config, LabelMap::for_profile(Profile::Scientific))
    }

    fn raw(x1: f32, y1: f32, x2: f32, y2: f32, label: &str, score: f32) -> RawRegion {
        RawRegion::new(BBox::new(x1, y1, x2, y2), label, score)
    }

    #[test]
    fn test_clip_and_drop() {
        let mut ids = IdManager::new();
        let (regions, report) = consolidator(0.0).consolidate(
            &page(),
            &[
                raw(-20.0, 10.0, 300.0, 200.0, "Text", 0.9),
                raw(2000.0, 10.0, 2100.0, 200.0, "Text", 0.9),
                raw(10.0, 300.0, 13.0, 400.0, "Text", 0.9),
            ],
            &mut ids,
        );
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox.x1, 0.0);
        assert_eq!(report.clipped, 1);
        assert_eq!(report.dropped, 2);
        assert_eq!(ids.report().deletions, vec!["block_0_001", "block_0_002"]);
    }

    #[test]
    fn test_stacked_fragments_merge() {
        let mut ids = IdManager::new();
        let (regions, report) = consolidator(0.0).consolidate(
            &page(),
            &[
                raw(60.0, 500.0, 600.0, 620.0, "Text", 0.5),
                raw(80.0, 630.0, 600.0, 750.0, "Text", 0.9),
                raw(60.0, 760.0, 560.0, 900.0, "Text", 0.7),
            ],
            &mut ids,
        );
        assert_eq!(regions.len(), 1);
        assert_eq!(report.merged, 2);
        let merged = &regions[0];
        assert_eq!(merged.bbox, BBox::new(60.0, 500.0, 600.0, 900.0));
        assert_eq!(merged.score, 0.9);
        assert_eq!(ids.final_id(merged.id), Some("block_0_001"));
        let mut from = ids.merged_from(merged.id).to_vec();
        from.sort();
        assert_eq!(from, vec!["block_0_000", "block_0_002"]);
    }

    #[test]
    fn test_columns_do_not_merge() {
        let mut ids = IdManager::new();
        let (regions, _) = consolidator(4.0).consolidate(
            &page(),
            &[
                raw(60.0, 100.0, 600.0, 800.0, "Text", 0.9),
                raw(640.0, 100.0, 1180.0, 400.0, "Text", 0.9),
                raw(640.0, 460.0, 1180.0, 800.0, "Text", 0.9),
            ],
            &mut ids,
        );
        assert_eq!(regions.len(), 3);
    }

    #[test]
    fn test_figures_never_fragment_merge() {
        let mut ids = IdManager::new();
        let (regions, _) = consolidator(0.0).consolidate(
            &page(),
            &[
                raw(60.0, 100.0, 600.0, 400.0, "Figure", 0.9),
                raw(60.0, 410.0, 600.0, 700.0, "Figure", 0.9),
            ],
            &mut ids,
        );
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn test_large_caption_kept_as_child() {
        let mut ids = IdManager::new();
        let (regions, _) = consolidator(0.0).consolidate(
            &page(),
            &[
                raw(100.0, 300.0, 900.0, 900.0, "Figure", 0.9),
                raw(120.0, 700.0, 880.0, 880.0, "Text", 0.8),
            ],
            &mut ids,
        );
        assert_eq!(regions.len(), 2);
        let figure = regions.iter().find(|r| r.role == BlockRole::Figure).unwrap();
        let text = regions.iter().find(|r| r.role == BlockRole::Text).unwrap();
        assert_eq!(text.parent, Some(figure.id));
    }

    #[test]
    fn test_small_caption_folded_into_container() {
        let mut ids = IdManager::new();
        let (regions, report) = consolidator(0.0).consolidate(
            &page(),
            &[
                raw(100.0, 300.0, 900.0, 900.0, "Figure", 0.9),
                raw(120.0, 850.0, 400.0, 880.0, "Text", 0.8),
            ],
            &mut ids,
        );
        assert_eq!(regions.len(), 1);
        assert_eq!(report.demoted, 1);
        assert_eq!(regions[0].caption_candidates.len(), 1);
        assert_eq!(ids.report().deletions, vec!["block_0_001"]);
    }

    #[test]
    fn test_overlap_resolution_merges_into_larger() {
        let mut ids = IdManager::new();
        let (regions, _) = consolidator(0.0).consolidate(
            &page(),
            &[
                raw(100.0, 100.0, 700.0, 500.0, "Text", 0.6),
                raw(120.0, 80.0, 650.0, 480.0, "Title", 0.9),
            ],
            &mut ids,
        );
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].role, BlockRole::Text);
        assert_eq!(regions[0].score, 0.9);
        assert_eq!(regions[0].bbox, BBox::new(100.0, 80.0, 700.0, 500.0));
    }

    #[test]
    fn test_padding_is_clipped() {
        let mut ids = IdManager::new();
        let (regions, _) = consolidator(10.0).consolidate(
            &page(),
            &[raw(2.0, 2.0, 300.0, 200.0, "Text", 0.9)],
            &mut ids,
        );
        assert_eq!(regions[0].bbox, BBox::new(0.0, 0.0, 310.0, 210.0));
    }

    #[test]
    fn test_gap_of_exactly_twenty_does_not_merge() {
        let mut ids = IdManager::new();
        let (regions, _) = consolidator(4.0).consolidate(
            &page(),
            &[
                raw(640.0, 100.0, 1180.0, 400.0, "Text", 0.9),
                raw(640.0, 420.0, 1180.0, 800.0, "Text", 0.9),
            ],
            &mut ids,
        );
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].bbox, BBox::new(636.0, 96.0, 1184.0, 404.0));
    }

    #[test]
    fn test_padded_fragments_merge_after_overlap_resolution() {
        let mut ids = IdManager::new();
        // 20 px apart as detected; the title absorbed into the first
        // fragment extends its unpadded box and closes the gap to 15 px.
        let (regions, _) = consolidator(4.0).consolidate(
            &page(),
            &[
                raw(60.0, 100.0, 600.0, 300.0, "Text", 0.9),
                raw(60.0, 320.0, 600.0, 500.0, "Text", 0.8),
                raw(60.0, 110.0, 600.0, 305.0, "Title", 0.7),
            ],
            &mut ids,
        );
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].role, BlockRole::Text);
        assert_eq!(regions[0].bbox, BBox::new(56.0, 96.0, 604.0, 504.0));
    }

    fn assert_fixed_point(c: &Consolidator, raws: &[RawRegion]) -> Vec<Region> {
        let mut ids = IdManager::new();
        let (mut regions, _) = c.consolidate(&page(), raws, &mut ids);
        let before = regions.clone();
        assert_eq!(c.merge_same_role(&mut regions, &mut ids), 0);
        assert_eq!(c.resolve_overlaps(&mut regions, &mut ids), 0);
        assert_eq!(regions, before);
        before
    }

    #[test]
    fn test_output_is_fixed_point() {
        let raws = [
            raw(60.0, 100.0, 600.0, 200.0, "Text", 0.9),
            raw(60.0, 226.0, 600.0, 300.0, "Text", 0.8),
            raw(60.0, 400.0, 600.0, 500.0, "Title", 0.7),
        ];
        for padding in [0.0, 4.0, 10.0] {
            assert_eq!(assert_fixed_point(&consolidator(padding), &raws).len(), 3);
        }
    }

    #[test]
    fn test_padding_does_not_open_a_stacked_merge() {
        // 25 px apart as detected, 17 px once padded by 4.
        let raws = [
            raw(100.0, 100.0, 600.0, 300.0, "Text", 0.9),
            raw(100.0, 325.0, 600.0, 500.0, "Text", 0.8),
        ];
        let regions = assert_fixed_point(&consolidator(4.0), &raws);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].bbox, BBox::new(96.0, 96.0, 604.0, 304.0));
        assert_eq!(regions[0].unpadded, BBox::new(100.0, 100.0, 600.0, 300.0));
    }

    #[test]
    fn test_default_profiles_reach_a_fixed_point() {
        let raws = [
            raw(60.0, 100.0, 600.0, 300.0, "Text", 0.9),
            raw(60.0, 312.0, 600.0, 500.0, "Text", 0.8),
            raw(60.0, 518.0, 600.0, 700.0, "Text", 0.7),
            raw(640.0, 100.0, 1180.0, 300.0, "Text", 0.9),
            raw(640.0, 315.0, 1180.0, 600.0, "Title", 0.6),
        ];
        let scientific = Consolidator::new(
            &Profile::Scientific.create_config(),
            LabelMap::for_profile(Profile::Scientific),
        );
        assert_fixed_point(&scientific, &raws);

        let marketing_raws: Vec<RawRegion> = raws
            .iter()
            .map(|r| RawRegion::new(r.bbox, "TextRegion", r.score))
            .collect();
        let marketing = Consolidator::new(
            &Profile::Marketing.create_config(),
            LabelMap::for_profile(Profile::Marketing),
        );
        assert_fixed_point(&marketing, &marketing_raws);
    }
}
