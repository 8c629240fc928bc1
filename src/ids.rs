//! Stable block identifiers.
//!
//! The [`IdManager`] is the single owner of identifier assignment for one
//! document. Intermediate stages only ever hold typed [`TempId`]s; the
//! user-visible `block_{page}_{NNN}` strings exist only through the manager.
//!
//! Every raw detection receives a temporary id and, by creation order on its
//! page, the final id it will carry if it survives. A merge produces a new
//! temporary id whose final id is inherited from its primary source; the other
//! sources are deleted and listed in the result's `merged_from`.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geometry::BBox;
use crate::utils::safe_float_cmp;

/// Pipeline-internal identifier of a region. Never serialized into a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempId(u32);

impl TempId {
    /// Index into the manager's entry table.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Format a final block id.
///
/// ```
/// assert_eq!(pdf_catalog::ids::final_id(2, 7), "block_2_007");
/// ```
pub fn final_id(page_index: usize, ordinal: usize) -> String {
    format!("block_{}_{:03}", page_index, ordinal)
}

/// Parse `block_{p}_{NNN}` into `(p, NNN)`.
pub fn parse_final_id(id: &str) -> Option<(usize, usize)> {
    let rest = id.strip_prefix("block_")?;
    let (page, ordinal) = rest.split_once('_')?;
    if ordinal.len() < 3 || !ordinal.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if page.is_empty() || !page.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((page.parse().ok()?, ordinal.parse().ok()?))
}

/// Source of a merge as seen by the consolidator at merge time.
#[derive(Debug, Clone, Copy)]
pub struct MergeSource {
    /// Region being merged
    pub id: TempId,
    /// Its current box
    pub bbox: BBox,
    /// Its detector score
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Alive,
    Deleted,
    /// Primary source of a merge; its final id now belongs to the result.
    Superseded(TempId),
}

#[derive(Debug, Clone)]
struct Entry {
    page: usize,
    final_id: String,
    state: State,
    merged_from: Vec<String>,
}

/// A recorded merge, by final id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecord {
    /// Final id carried by the merged block
    pub result: String,
    /// Final ids of the absorbed sources
    pub sources: Vec<String>,
}

/// Audit trail written to `metadata.id_transformations`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformationReport {
    /// Raw detections that received an id
    pub total_detections: usize,
    /// Blocks that survived to the catalog
    pub final_blocks: usize,
    /// Merges in the order they happened
    pub merges: Vec<MergeRecord>,
    /// Final ids that were deleted outright
    pub deletions: Vec<String>,
}

/// Owner of identifier assignment and rewriting for one document.
#[derive(Debug, Default)]
pub struct IdManager {
    entries: Vec<Entry>,
    next_ordinal: HashMap<usize, usize>,
    merges: Vec<MergeRecord>,
    deletions: Vec<String>,
    raw_count: usize,
}

impl IdManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign temporary ids to a page's raw detections, in detector order.
    pub fn assign(&mut self, page_index: usize, count: usize) -> Vec<TempId> {
        self.raw_count += count;
        (0..count).map(|_| self.issue(page_index)).collect()
    }

    fn issue(&mut self, page_index: usize) -> TempId {
        let ordinal = self.next_ordinal.entry(page_index).or_insert(0);
        let id = TempId(self.entries.len() as u32);
        self.entries.push(Entry {
            page: page_index,
            final_id: final_id(page_index, *ordinal),
            state: State::Alive,
            merged_from: Vec::new(),
        });
        *ordinal += 1;
        id
    }

    /// Record that `sources` were merged into one region.
    ///
    /// The result inherits the final id of the highest-scoring source (ties:
    /// larger area, then lexicographic bbox). Every other source is deleted and
    /// recorded, together with its own merge history, in the result's
    /// `merged_from`. Sources are expected in descending area order.
    pub fn register_merge(&mut self, sources: &[MergeSource]) -> Option<TempId> {
        let primary = sources
            .iter()
            .filter(|s| self.is_alive(s.id))
            .min_by(|a, b| primary_order(a, b))?
            .id;

        let page = self.entries[primary.index()].page;
        let result = TempId(self.entries.len() as u32);
        let mut merged_from = self.entries[primary.index()].merged_from.clone();
        let mut absorbed = Vec::new();

        for source in sources {
            if source.id == primary || !self.is_alive(source.id) {
                continue;
            }
            let entry = &mut self.entries[source.id.index()];
            entry.state = State::Deleted;
            absorbed.push(entry.final_id.clone());
            merged_from.push(entry.final_id.clone());
            merged_from.extend(entry.merged_from.iter().cloned());
        }

        let inherited = self.entries[primary.index()].final_id.clone();
        self.entries[primary.index()].state = State::Superseded(result);
        self.entries.push(Entry {
            page,
            final_id: inherited.clone(),
            state: State::Alive,
            merged_from,
        });
        log::debug!("merge: {} absorbs {:?}", inherited, absorbed);
        self.merges.push(MergeRecord {
            result: inherited,
            sources: absorbed,
        });
        Some(result)
    }

    /// Mark a region dropped.
    pub fn register_deletion(&mut self, id: TempId) {
        if let Some(entry) = self.entries.get_mut(id.index()) {
            if entry.state == State::Alive {
                entry.state = State::Deleted;
                self.deletions.push(entry.final_id.clone());
            }
        }
    }

    /// Is this id still a live region (not merged away, not deleted)?
    pub fn is_alive(&self, id: TempId) -> bool {
        self.entries
            .get(id.index())
            .map(|e| e.state == State::Alive)
            .unwrap_or(false)
    }

    /// Final id of a live region.
    pub fn final_id(&self, id: TempId) -> Option<&str> {
        let entry = self.entries.get(id.index())?;
        match entry.state {
            State::Alive => Some(entry.final_id.as_str()),
            _ => None,
        }
    }

    /// Follow primary-parent links from `id` to the live region carrying its identity.
    pub fn resolve(&self, id: TempId) -> Option<TempId> {
        let mut current = id;
        // Each hop moves to a strictly newer entry, so this terminates.
        loop {
            match self.entries.get(current.index())?.state {
                State::Alive => return Some(current),
                State::Deleted => return None,
                State::Superseded(next) => current = next,
            }
        }
    }

    /// Final ids absorbed into a live region.
    pub fn merged_from(&self, id: TempId) -> &[String] {
        self.entries
            .get(id.index())
            .map(|e| e.merged_from.as_slice())
            .unwrap_or(&[])
    }

    /// Map temporary ids to final ids.
    ///
    /// Deleted ids are dropped; superseded ids follow their primary chain.
    /// Order and multiplicity of survivors are preserved.
    pub fn rewrite(&self, ids: &[TempId]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.resolve(*id))
            .filter_map(|id| self.final_id(id).map(str::to_string))
            .collect()
    }

    /// Audit report for catalog metadata.
    pub fn report(&self) -> TransformationReport {
        TransformationReport {
            total_detections: self.raw_count,
            final_blocks: self
                .entries
                .iter()
                .filter(|e| e.state == State::Alive)
                .count(),
            merges: self.merges.clone(),
            deletions: self.deletions.clone(),
        }
    }
}

fn primary_order(a: &MergeSource, b: &MergeSource) -> Ordering {
    safe_float_cmp(b.score, a.score)
        .then_with(|| safe_float_cmp(b.bbox.area(), a.bbox.area()))
        .then_with(|| a.bbox.lexicographic_cmp(&b.bbox))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: TempId, x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> MergeSource {
        MergeSource {
            id,
            bbox: BBox::new(x1, y1, x2, y2),
            score,
        }
    }

    #[test]
    fn test_assign_in_creation_order() {
        let mut ids = IdManager::new();
        let page0 = ids.assign(0, 3);
        let page1 = ids.assign(1, 2);
        assert_eq!(ids.final_id(page0[2]), Some("block_0_002"));
        assert_eq!(ids.final_id(page1[0]), Some("block_1_000"));
        assert_eq!(ids.report().total_detections, 5);
    }

    #[test]
    fn test_parse_final_id() {
        assert_eq!(parse_final_id("block_3_012"), Some((3, 12)));
        assert_eq!(parse_final_id("block_0_1000"), Some((0, 1000)));
        assert_eq!(parse_final_id("block_0_01"), None);
        assert_eq!(parse_final_id("det_5"), None);
        assert_eq!(parse_final_id("block__000"), None);
    }

    #[test]
    fn test_merge_inherits_highest_score() {
        let mut ids = IdManager::new();
        let t = ids.assign(0, 3);
        let result = ids
            .register_merge(&[
                source(t[0], 0.0, 0.0, 100.0, 100.0, 0.5),
                source(t[1], 0.0, 110.0, 100.0, 150.0, 0.9),
                source(t[2], 0.0, 160.0, 100.0, 180.0, 0.7),
            ])
            .unwrap();
        assert_eq!(ids.final_id(result), Some("block_0_001"));
        assert_eq!(ids.merged_from(result), &["block_0_000", "block_0_002"]);
        assert!(!ids.is_alive(t[0]));
        assert_eq!(ids.report().final_blocks, 1);
    }

    #[test]
    fn test_merge_tie_breaks_on_area_then_position() {
        let mut ids = IdManager::new();
        let t = ids.assign(0, 3);
        let result = ids
            .register_merge(&[
                source(t[0], 0.0, 50.0, 10.0, 60.0, 0.8),
                source(t[1], 0.0, 0.0, 100.0, 40.0, 0.8),
            ])
            .unwrap();
        assert_eq!(ids.final_id(result), Some("block_0_001"));

        let result = ids
            .register_merge(&[
                source(result, 0.0, 0.0, 100.0, 60.0, 0.8),
                source(t[2], 0.0, 0.0, 100.0, 60.0, 0.8),
            ])
            .unwrap();
        // Same score and area: the lexicographically first bbox wins, which is
        // the earlier source when boxes are identical.
        assert_eq!(ids.final_id(result), Some("block_0_001"));
        assert_eq!(
            ids.merged_from(result),
            &["block_0_000", "block_0_002"]
        );
    }

    #[test]
    fn test_rewrite_follows_chains_and_drops_deleted() {
        let mut ids = IdManager::new();
        let t = ids.assign(0, 4);
        let first = ids
            .register_merge(&[
                source(t[0], 0.0, 0.0, 10.0, 10.0, 0.9),
                source(t[1], 0.0, 12.0, 10.0, 20.0, 0.1),
            ])
            .unwrap();
        let second = ids
            .register_merge(&[
                source(first, 0.0, 0.0, 10.0, 20.0, 0.9),
                source(t[2], 0.0, 22.0, 10.0, 30.0, 0.2),
            ])
            .unwrap();
        ids.register_deletion(t[3]);

        let rewritten = ids.rewrite(&[t[3], t[0], t[1], second, t[0]]);
        assert_eq!(rewritten, vec!["block_0_000", "block_0_000", "block_0_000"]);

        let report = ids.report();
        assert_eq!(report.deletions, vec!["block_0_003"]);
        assert_eq!(report.merges.len(), 2);
        assert_eq!(report.final_blocks, 1);
    }

    #[test]
    fn test_final_ids_never_reused() {
        let mut ids = IdManager::new();
        let t = ids.assign(0, 2);
        ids.register_deletion(t[0]);
        let more = ids.assign(0, 1);
        assert_eq!(ids.final_id(more[0]), Some("block_0_002"));
    }
}
