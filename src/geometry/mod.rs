//! Geometric primitives for layout consolidation.
//!
//! All boxes stored in a catalog are in pixel space of the page raster at the
//! catalog's detection DPI, origin top-left. The same [`BBox`] type is used for
//! PDF-point rectangles (also top-left origin) when the embedded text path
//! needs them; conversion goes through [`BBox::scale`].
//!
//! Every operation here is a pure function. Ties are broken by the
//! lexicographic order on `(y1, x1, x2, y2)` exposed by [`BBox::lexicographic_cmp`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::utils::safe_float_cmp;

/// Fraction of a box's area that must lie inside another for [`BBox::contains`].
pub const CONTAINMENT_RATIO: f32 = 0.99;

/// An axis-aligned box `(x1, y1, x2, y2)`.
///
/// Serialized as a JSON array `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    /// Left edge
    pub x1: f32,
    /// Top edge
    pub y1: f32,
    /// Right edge
    pub x2: f32,
    /// Bottom edge
    pub y2: f32,
}

impl From<[f32; 4]> for BBox {
    fn from(v: [f32; 4]) -> Self {
        BBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

impl BBox {
    /// Create a box from its corners.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_catalog::geometry::BBox;
    ///
    /// let b = BBox::new(10.0, 20.0, 110.0, 70.0);
    /// assert_eq!(b.width(), 100.0);
    /// assert_eq!(b.height(), 50.0);
    /// ```
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Create a box from a top-left corner and a size.
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Width (zero for inverted boxes).
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    /// Height (zero for inverted boxes).
    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Area in square units.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// True when `x1 < x2` and `y1 < y2` and all coordinates are finite.
    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 < self.x2
            && self.y1 < self.y2
    }

    /// Center point `(x, y)`.
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Overlapping region of two boxes, if any.
    pub fn intersection(&self, other: &BBox) -> Option<BBox> {
        let b = BBox::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        );
        if b.is_valid() {
            Some(b)
        } else {
            None
        }
    }

    /// Area of the overlapping region (0 when disjoint).
    pub fn intersection_area(&self, other: &BBox) -> f32 {
        self.intersection(other).map(|b| b.area()).unwrap_or(0.0)
    }

    /// Does this box overlap `other` with positive area?
    pub fn intersects(&self, other: &BBox) -> bool {
        self.intersection(other).is_some()
    }

    /// Intersection over union.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_catalog::geometry::BBox;
    ///
    /// let a = BBox::new(0.0, 0.0, 100.0, 100.0);
    /// let b = BBox::new(50.0, 0.0, 150.0, 100.0);
    /// assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    /// assert_eq!(a.iou(&BBox::new(200.0, 0.0, 300.0, 100.0)), 0.0);
    /// ```
    pub fn iou(&self, other: &BBox) -> f32 {
        let inter = self.intersection_area(other);
        if inter <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Fraction of `other`'s area lying inside this box.
    pub fn containment_of(&self, other: &BBox) -> f32 {
        let area = other.area();
        if area <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / area
    }

    /// `other ⊆ self`, allowing 1% of `other` to fall outside.
    pub fn contains(&self, other: &BBox) -> bool {
        self.containment_of(other) >= CONTAINMENT_RATIO
    }

    /// Axis-aligned hull of both boxes.
    pub fn merge(&self, other: &BBox) -> BBox {
        BBox::new(
            self.x1.min(other.x1),
            self.y1.min(other.y1),
            self.x2.max(other.x2),
            self.y2.max(other.y2),
        )
    }

    /// Grow by `px` on every side. Callers re-clip afterwards.
    pub fn pad(&self, px: f32) -> BBox {
        BBox::new(self.x1 - px, self.y1 - px, self.x2 + px, self.y2 + px)
    }

    /// Clip to the page rectangle `[0, width] x [0, height]`.
    ///
    /// Returns `None` when nothing with positive area remains.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_catalog::geometry::BBox;
    ///
    /// let b = BBox::new(-5.0, 10.0, 120.0, 50.0).clip(100.0, 100.0).unwrap();
    /// assert_eq!(b, BBox::new(0.0, 10.0, 100.0, 50.0));
    /// assert!(BBox::new(150.0, 0.0, 200.0, 10.0).clip(100.0, 100.0).is_none());
    /// ```
    pub fn clip(&self, width: f32, height: f32) -> Option<BBox> {
        let b = BBox::new(
            self.x1.clamp(0.0, width),
            self.y1.clamp(0.0, height),
            self.x2.clamp(0.0, width),
            self.y2.clamp(0.0, height),
        );
        if b.is_valid() {
            Some(b)
        } else {
            None
        }
    }

    /// Is the box inside `[0, width] x [0, height]`?
    pub fn within(&self, width: f32, height: f32) -> bool {
        self.x1 >= 0.0 && self.y1 >= 0.0 && self.x2 <= width && self.y2 <= height
    }

    /// Multiply every coordinate by the given factors.
    ///
    /// Used for PDF point ↔ pixel conversion (`scale = dpi / 72`).
    pub fn scale(&self, sx: f32, sy: f32) -> BBox {
        BBox::new(self.x1 * sx, self.y1 * sy, self.x2 * sx, self.y2 * sy)
    }

    /// Vertical distance between the boxes; negative when they overlap vertically.
    pub fn vertical_gap(&self, other: &BBox) -> f32 {
        self.y1.max(other.y1) - self.y2.min(other.y2)
    }

    /// Horizontal overlap as a fraction of the narrower box's width.
    pub fn horizontal_overlap_ratio(&self, other: &BBox) -> f32 {
        let overlap = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let narrower = self.width().min(other.width());
        if narrower <= 0.0 {
            0.0
        } else {
            overlap / narrower
        }
    }

    /// Deterministic total order on `(y1, x1, x2, y2)`.
    pub fn lexicographic_cmp(&self, other: &BBox) -> Ordering {
        safe_float_cmp(self.y1, other.y1)
            .then_with(|| safe_float_cmp(self.x1, other.x1))
            .then_with(|| safe_float_cmp(self.x2, other.x2))
            .then_with(|| safe_float_cmp(self.y2, other.y2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_and_validity() {
        let b = BBox::new(0.0, 0.0, 4.0, 4.0);
        assert_eq!(b.area(), 16.0);
        assert!(b.is_valid());
        assert!(!BBox::new(5.0, 0.0, 5.0, 10.0).is_valid());
        assert!(!BBox::new(0.0, 0.0, f32::NAN, 10.0).is_valid());
        assert_eq!(BBox::new(10.0, 10.0, 0.0, 0.0).area(), 0.0);
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&BBox::new(10.0, 0.0, 20.0, 10.0)), 0.0);
    }

    #[test]
    fn test_contains_tolerates_one_percent() {
        let outer = BBox::new(0.0, 0.0, 100.0, 100.0);
        // 0.5% of the inner box sticks out on the right
        let inner = BBox::new(50.0, 0.0, 100.5, 100.0);
        assert!(outer.contains(&inner));
        let outside = BBox::new(50.0, 0.0, 110.0, 100.0);
        assert!(!outer.contains(&outside));
        assert!(!inner.contains(&outer));
    }

    #[test]
    fn test_merge_is_hull() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(20.0, 5.0, 30.0, 40.0);
        assert_eq!(a.merge(&b), BBox::new(0.0, 0.0, 30.0, 40.0));
        assert_eq!(a.merge(&b), b.merge(&a));
    }

    #[test]
    fn test_pad_then_clip() {
        let b = BBox::new(2.0, 2.0, 98.0, 98.0).pad(4.0);
        assert_eq!(b, BBox::new(-2.0, -2.0, 102.0, 102.0));
        assert_eq!(b.clip(100.0, 100.0), Some(BBox::new(0.0, 0.0, 100.0, 100.0)));
    }

    #[test]
    fn test_vertical_gap_and_overlap() {
        let top = BBox::new(60.0, 500.0, 600.0, 620.0);
        let below = BBox::new(80.0, 630.0, 600.0, 750.0);
        assert_eq!(top.vertical_gap(&below), 10.0);
        assert_eq!(below.vertical_gap(&top), 10.0);
        assert!(top.horizontal_overlap_ratio(&below) > 0.99);

        let overlapping = BBox::new(60.0, 600.0, 600.0, 700.0);
        assert!(top.vertical_gap(&overlapping) < 0.0);
    }

    #[test]
    fn test_lexicographic_order() {
        let a = BBox::new(10.0, 5.0, 20.0, 20.0);
        let b = BBox::new(0.0, 6.0, 20.0, 20.0);
        let c = BBox::new(0.0, 5.0, 20.0, 20.0);
        let mut boxes = vec![a, b, c];
        boxes.sort_by(|x, y| x.lexicographic_cmp(y));
        assert_eq!(boxes, vec![c, a, b]);
    }

    #[test]
    fn test_serializes_as_array() {
        let b = BBox::new(1.0, 2.0, 3.5, 4.0);
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, "[1.0,2.0,3.5,4.0]");
        let back: BBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn test_scale_points_to_pixels() {
        let pts = BBox::new(72.0, 72.0, 144.0, 108.0);
        let px = pts.scale(200.0 / 72.0, 200.0 / 72.0);
        assert!((px.x1 - 200.0).abs() < 1e-3);
        assert!((px.y2 - 300.0).abs() < 1e-3);
    }
}
