//! Single-column reading order.

use crate::error::Result;

use super::{compare, is_top_level, with_children, OrderItem, ReadingOrderContext, ReadingOrderStrategy};

/// Top-to-bottom, left-to-right over the whole page.
pub struct SingleColumnStrategy;

impl ReadingOrderStrategy for SingleColumnStrategy {
    fn apply(&self, items: &[OrderItem], _context: &ReadingOrderContext) -> Result<Vec<usize>> {
        let mut top_level: Vec<usize> = (0..items.len())
            .filter(|&i| !items[i].role.is_decorative() && is_top_level(items, i))
            .collect();
        top_level.sort_by(|&a, &b| compare(items, a, b));
        Ok(with_children(items, &top_level))
    }

    fn name(&self) -> &'static str {
        "SingleColumnStrategy"
    }
}
