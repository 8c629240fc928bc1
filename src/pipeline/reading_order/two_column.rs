//! Two-column reading order.

use crate::error::Result;

use super::{compare, is_top_level, with_children, OrderItem, ReadingOrderContext, ReadingOrderStrategy};

/// Left half of the page, then the right half, each top-to-bottom.
///
/// A region belongs to the left column when its left edge is left of the page
/// midline. Within a column regions are sorted by `(y1, x1)`, so full-width
/// headers at the top of the page lead the left column.
#[derive(Debug, Clone, Copy, Default)]
pub struct TwoColumnStrategy;

impl TwoColumnStrategy {
    /// Create the strategy.
    pub fn new() -> Self {
        Self
    }
}

impl ReadingOrderStrategy for TwoColumnStrategy {
    fn apply(&self, items: &[OrderItem], context: &ReadingOrderContext) -> Result<Vec<usize>> {
        let midline = context.page_width / 2.0;
        let (mut left, mut right): (Vec<usize>, Vec<usize>) = (0..items.len())
            .filter(|&i| !items[i].role.is_decorative() && is_top_level(items, i))
            .partition(|&i| items[i].bbox.x1 < midline);
        left.sort_by(|&a, &b| compare(items, a, b));
        right.sort_by(|&a, &b| compare(items, a, b));

        log::trace!(
            "page {}: {} left, {} right",
            context.page_index,
            left.len(),
            right.len()
        );
        left.extend(right);
        Ok(with_children(items, &left))
    }

    fn name(&self) -> &'static str {
        "TwoColumnStrategy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BlockRole;
    use crate::geometry::BBox;

    fn context() -> ReadingOrderContext {
        ReadingOrderContext::new().with_size(1000.0, 1400.0)
    }

    fn text(x1: f32, y1: f32, x2: f32, y2: f32) -> OrderItem {
        OrderItem::new(BBox::new(x1, y1, x2, y2), BlockRole::Text)
    }

    #[test]
    fn test_left_column_before_right() {
        let items = vec![
            text(550.0, 100.0, 950.0, 300.0),
            text(50.0, 500.0, 450.0, 700.0),
            text(50.0, 100.0, 450.0, 300.0),
        ];
        let order = TwoColumnStrategy::new().apply(&items, &context()).unwrap();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_midline_item_goes_right() {
        let items = vec![text(500.0, 10.0, 900.0, 50.0), text(499.0, 900.0, 900.0, 950.0)];
        let order = TwoColumnStrategy::new().apply(&items, &context()).unwrap();
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn test_caption_follows_parent_and_separators_are_skipped() {
        let items = vec![
            OrderItem::new(BBox::new(50.0, 300.0, 450.0, 900.0), BlockRole::Figure),
            text(60.0, 850.0, 440.0, 890.0).with_parent(0),
            OrderItem::new(BBox::new(50.0, 200.0, 950.0, 205.0), BlockRole::Separator),
            text(50.0, 100.0, 450.0, 180.0),
            text(50.0, 950.0, 450.0, 1000.0),
        ];
        let order = TwoColumnStrategy::new().apply(&items, &context()).unwrap();
        assert_eq!(order, vec![3, 0, 1, 4]);
    }

    #[test]
    fn test_caption_in_other_column_still_follows_parent() {
        let items = vec![
            OrderItem::new(BBox::new(400.0, 100.0, 900.0, 600.0), BlockRole::Table),
            text(520.0, 550.0, 880.0, 590.0).with_parent(0),
            text(550.0, 700.0, 900.0, 800.0),
        ];
        let order = TwoColumnStrategy::new().apply(&items, &context()).unwrap();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
