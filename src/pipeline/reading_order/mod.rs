//! Reading order strategies for consolidated regions.
//!
//! A strategy receives a page's regions and returns the indices of the ones
//! that belong in the page's reading order, first to last. Decorative regions
//! (separators) are left out; every other region appears exactly once.
//!
//! # Available Strategies
//!
//! - [`TwoColumnStrategy`]: left half then right half, each top-to-bottom
//! - [`SingleColumnStrategy`]: top-to-bottom, left-to-right over the whole page
//!
//! Both place a caption directly after the figure or table it belongs to.

mod single_column;
mod two_column;

pub use single_column::SingleColumnStrategy;
pub use two_column::TwoColumnStrategy;

use std::cmp::Ordering;

use crate::catalog::BlockRole;
use crate::config::ReadingOrderKind;
use crate::error::Result;
use crate::geometry::BBox;

/// What a strategy needs to know about one region.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    /// Pixel box
    pub bbox: BBox,
    /// Catalog role
    pub role: BlockRole,
    /// Index of the container this caption belongs to
    pub parent: Option<usize>,
}

impl OrderItem {
    /// Create a top-level item.
    pub fn new(bbox: BBox, role: BlockRole) -> Self {
        Self {
            bbox,
            role,
            parent: None,
        }
    }

    /// Attach to a container.
    pub fn with_parent(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// Trait for ordering a page's regions.
pub trait ReadingOrderStrategy: Send + Sync {
    /// Indices into `items` in reading order.
    ///
    /// Decorative items are omitted; every other index appears exactly once.
    fn apply(&self, items: &[OrderItem], context: &ReadingOrderContext) -> Result<Vec<usize>>;

    /// Return the name of this strategy for debugging.
    fn name(&self) -> &'static str;
}

/// Page information available to strategies.
#[derive(Debug, Clone, Default)]
pub struct ReadingOrderContext {
    /// Current page (0-indexed)
    pub page_index: usize,
    /// Page width in pixels
    pub page_width: f32,
    /// Page height in pixels
    pub page_height: f32,
}

impl ReadingOrderContext {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page index.
    pub fn with_page(mut self, page_index: usize) -> Self {
        self.page_index = page_index;
        self
    }

    /// Set the page size in pixels.
    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.page_width = width;
        self.page_height = height;
        self
    }
}

/// Create a reading order strategy for the configured policy.
pub fn create_strategy(kind: ReadingOrderKind) -> Box<dyn ReadingOrderStrategy> {
    match kind {
        ReadingOrderKind::TwoColumn => Box::new(TwoColumnStrategy::new()),
        ReadingOrderKind::SingleColumn => Box::new(SingleColumnStrategy),
    }
}

/// Is `index` ordered on its own, rather than after a parent?
///
/// Items whose parent is missing, decorative or itself a child are treated as
/// top-level so that nothing is lost from the order.
fn is_top_level(items: &[OrderItem], index: usize) -> bool {
    match items[index].parent {
        None => true,
        Some(p) => p == index || items.get(p).map_or(true, |parent| parent.role.is_decorative()),
    }
}

/// Shared tail of every strategy: given top-level indices in order, emit each
/// one followed by its captions (top-to-bottom).
fn with_children(items: &[OrderItem], top_level: &[usize]) -> Vec<usize> {
    let mut order = Vec::with_capacity(items.len());
    let mut visited = vec![false; items.len()];
    for &index in top_level {
        push_with_children(items, index, &mut visited, &mut order);
    }
    // Captions of a cycle never reach a top-level ancestor.
    let mut stranded: Vec<usize> = (0..items.len())
        .filter(|&i| !visited[i] && !items[i].role.is_decorative())
        .collect();
    stranded.sort_by(|&a, &b| compare(items, a, b));
    for index in stranded {
        push_with_children(items, index, &mut visited, &mut order);
    }
    order
}

fn push_with_children(items: &[OrderItem], index: usize, visited: &mut [bool], order: &mut Vec<usize>) {
    if visited[index] || items[index].role.is_decorative() {
        return;
    }
    visited[index] = true;
    order.push(index);
    let mut children: Vec<usize> = (0..items.len())
        .filter(|&c| c != index && items[c].parent == Some(index))
        .collect();
    children.sort_by(|&a, &b| compare(items, a, b));
    for child in children {
        push_with_children(items, child, visited, order);
    }
}

fn compare(items: &[OrderItem], a: usize, b: usize) -> Ordering {
    items[a].bbox.lexicographic_cmp(&items[b].bbox).then(a.cmp(&b))
}
