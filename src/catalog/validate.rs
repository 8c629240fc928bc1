//! Catalog invariants.
//!
//! [`validate`] stops at the first failing invariant, checked in order, and
//! names the offending ids. The writer refuses to emit a catalog that fails.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::catalog::model::{Block, BlockRole, Catalog};
use crate::geometry::BBox;
use crate::ids::parse_final_id;

/// The catalog invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invariant {
    /// all block ids distinct
    Uniqueness,
    /// ids match `block_{p}_{NNN}` with `p == page_index`
    Format,
    /// every bbox inside its page's pixel bounds
    Geometry,
    /// reading order covers every non-decorative block of its page exactly once
    OrderCoverage,
    /// every reading-order id resolves to a block
    ReferenceClosure,
    /// no same-page overlap above the merge threshold except container overlays
    NoOverlap,
}

impl Invariant {
    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Invariant::Uniqueness => "uniqueness",
            Invariant::Format => "id format",
            Invariant::Geometry => "geometry",
            Invariant::OrderCoverage => "order coverage",
            Invariant::ReferenceClosure => "reference closure",
            Invariant::NoOverlap => "no overlap above policy",
        }
    }
}

/// Report of a failed invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct InvariantViolation {
    /// Which invariant failed
    pub invariant: Invariant,
    /// Offending block ids
    pub ids: Vec<String>,
    /// What exactly was wrong
    pub detail: String,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} [{}]",
            self.invariant.name(),
            self.detail,
            self.ids.join(", ")
        )
    }
}

impl std::error::Error for InvariantViolation {}

fn violation(invariant: Invariant, ids: Vec<String>, detail: impl Into<String>) -> InvariantViolation {
    InvariantViolation {
        invariant,
        ids,
        detail: detail.into(),
    }
}

/// Is the overlap between two same-page blocks acceptable?
///
/// Acceptable when IoU ≤ `merge_threshold`, or when a Figure/Table fully
/// contains a textual block (caption or overlay text).
pub fn overlap_allowed(a: &Block, b: &Block, merge_threshold: f32) -> bool {
    overlap_legal((a.role, &a.bbox), (b.role, &b.bbox), merge_threshold)
}

/// [`overlap_allowed`] on bare `(role, bbox)` pairs.
pub fn overlap_legal(a: (BlockRole, &BBox), b: (BlockRole, &BBox), merge_threshold: f32) -> bool {
    if a.1.iou(b.1) <= merge_threshold {
        return true;
    }
    let overlays = |outer: (BlockRole, &BBox), inner: (BlockRole, &BBox)| {
        outer.0.is_container() && inner.0.is_textual() && outer.1.contains(inner.1)
    };
    overlays(a, b) || overlays(b, a)
}

/// Check every invariant, returning the first violation.
pub fn validate(catalog: &Catalog, merge_threshold: f32) -> Result<(), InvariantViolation> {
    check_uniqueness(catalog)?;
    check_format(catalog)?;
    check_geometry(catalog)?;
    check_order_coverage(catalog)?;
    check_reference_closure(catalog)?;
    check_overlap(catalog, merge_threshold)
}

/// Check every invariant, returning one report per failing invariant.
pub fn validate_all(catalog: &Catalog, merge_threshold: f32) -> Vec<InvariantViolation> {
    [
        check_uniqueness(catalog),
        check_format(catalog),
        check_geometry(catalog),
        check_order_coverage(catalog),
        check_reference_closure(catalog),
        check_overlap(catalog, merge_threshold),
    ]
    .into_iter()
    .filter_map(|r| r.err())
    .collect()
}

fn check_uniqueness(catalog: &Catalog) -> Result<(), InvariantViolation> {
    let mut seen = HashSet::new();
    let mut dupes: Vec<String> = Vec::new();
    for block in &catalog.blocks {
        if !seen.insert(block.id.as_str()) && !dupes.contains(&block.id) {
            dupes.push(block.id.clone());
        }
    }
    if dupes.is_empty() {
        Ok(())
    } else {
        Err(violation(Invariant::Uniqueness, dupes, "duplicate block ids"))
    }
}

fn check_format(catalog: &Catalog) -> Result<(), InvariantViolation> {
    let bad: Vec<String> = catalog
        .blocks
        .iter()
        .filter(|b| !matches!(parse_final_id(&b.id), Some((p, _)) if p == b.page_index))
        .map(|b| b.id.clone())
        .collect();
    if bad.is_empty() {
        Ok(())
    } else {
        Err(violation(
            Invariant::Format,
            bad,
            "ids must match block_{page}_{NNN} for their own page",
        ))
    }
}

fn check_geometry(catalog: &Catalog) -> Result<(), InvariantViolation> {
    let mut bad = Vec::new();
    for block in &catalog.blocks {
        let inside = catalog
            .pages
            .get(block.page_index)
            .map(|page| {
                block.bbox.is_valid()
                    && block
                        .bbox
                        .within(page.pixel_width as f32, page.pixel_height as f32)
            })
            .unwrap_or(false);
        if !inside {
            bad.push(block.id.clone());
        }
    }
    if bad.is_empty() {
        Ok(())
    } else {
        Err(violation(
            Invariant::Geometry,
            bad,
            "bbox outside page bounds, degenerate, or on a missing page",
        ))
    }
}

fn check_order_coverage(catalog: &Catalog) -> Result<(), InvariantViolation> {
    let by_id: HashMap<&str, &Block> = catalog.blocks.iter().map(|b| (b.id.as_str(), b)).collect();

    for page in 0..catalog.pages.len() {
        let order: &[String] = catalog
            .reading_order
            .get(page)
            .map(|v| v.as_slice())
            .unwrap_or(&[]);

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for id in order {
            *counts.entry(id.as_str()).or_insert(0) += 1;
        }

        let foreign: Vec<String> = order
            .iter()
            .filter(|id| matches!(by_id.get(id.as_str()), Some(b) if b.page_index != page))
            .cloned()
            .collect();
        if !foreign.is_empty() {
            return Err(violation(
                Invariant::OrderCoverage,
                foreign,
                format!("reading_order[{}] references blocks of another page", page),
            ));
        }

        let mut repeated: Vec<String> = counts
            .iter()
            .filter(|(id, n)| **n > 1 && by_id.contains_key(*id))
            .map(|(id, _)| id.to_string())
            .collect();
        if !repeated.is_empty() {
            repeated.sort();
            return Err(violation(
                Invariant::OrderCoverage,
                repeated,
                format!("reading_order[{}] lists blocks more than once", page),
            ));
        }

        let missing: Vec<String> = catalog
            .blocks
            .iter()
            .filter(|b| b.page_index == page && !b.role.is_decorative())
            .filter(|b| !counts.contains_key(b.id.as_str()))
            .map(|b| b.id.clone())
            .collect();
        if !missing.is_empty() {
            return Err(violation(
                Invariant::OrderCoverage,
                missing,
                format!("reading_order[{}] is missing blocks", page),
            ));
        }
    }

    if catalog.reading_order.len() > catalog.pages.len() {
        let stray: Vec<String> = catalog.reading_order[catalog.pages.len()..]
            .iter()
            .flatten()
            .cloned()
            .collect();
        if !stray.is_empty() {
            return Err(violation(
                Invariant::OrderCoverage,
                stray,
                "reading order for pages that do not exist",
            ));
        }
    }
    Ok(())
}

fn check_reference_closure(catalog: &Catalog) -> Result<(), InvariantViolation> {
    let ids: HashSet<&str> = catalog.blocks.iter().map(|b| b.id.as_str()).collect();
    let dangling: Vec<String> = catalog
        .reading_order
        .iter()
        .flatten()
        .filter(|id| !ids.contains(id.as_str()))
        .cloned()
        .collect();
    if dangling.is_empty() {
        Ok(())
    } else {
        Err(violation(
            Invariant::ReferenceClosure,
            dangling,
            "reading order references unknown ids",
        ))
    }
}

fn check_overlap(catalog: &Catalog, merge_threshold: f32) -> Result<(), InvariantViolation> {
    let mut pages: HashMap<usize, Vec<&Block>> = HashMap::new();
    for block in &catalog.blocks {
        pages.entry(block.page_index).or_default().push(block);
    }
    let mut page_indices: Vec<_> = pages.keys().copied().collect();
    page_indices.sort_unstable();

    for page in page_indices {
        let blocks = &pages[&page];
        for (i, a) in blocks.iter().enumerate() {
            for b in &blocks[i + 1..] {
                if !overlap_allowed(a, b, merge_threshold) {
                    return Err(violation(
                        Invariant::NoOverlap,
                        vec![a.id.clone(), b.id.clone()],
                        format!(
                            "IoU {:.3} exceeds {:.3} without a container overlay",
                            a.bbox.iou(&b.bbox),
                            merge_threshold
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}
