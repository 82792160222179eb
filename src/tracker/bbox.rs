use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Axis-aligned bounding box in pixel coordinates.
///
/// Stored as TLBR (x1, y1, x2, y2). Also converts to and from the XYSR
/// observation space used by the Kalman filter:
/// - XYSR: Center X, Center Y, Scale (area), Ratio (w/h)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Create a box from TLBR coordinates without validation.
    #[inline]
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Create a box from TLBR coordinates, rejecting non-finite or inverted input.
    ///
    /// Zero-width or zero-height boxes are accepted; they simply never match.
    pub fn validated(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self> {
        let reason = if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            Some("non-finite coordinate")
        } else if x2 < x1 || y2 < y1 {
            Some("inverted coordinates")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(Error::InvalidBox {
                x1,
                y1,
                x2,
                y2,
                reason,
            }),
            None => Ok(Self::new(x1, y1, x2, y2)),
        }
    }

    pub fn from_array(coords: [f32; 4]) -> Result<Self> {
        Self::validated(coords[0], coords[1], coords[2], coords[3])
    }

    /// Create a box from XYSR format (center x, center y, area, aspect ratio).
    ///
    /// A non-positive area collapses to a zero-size box at the center.
    pub fn from_xysr(cx: f32, cy: f32, scale: f32, ratio: f32) -> Self {
        let w = (scale * ratio).max(0.0).sqrt();
        let h = if w > 0.0 { scale / w } else { 0.0 };
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    /// Convert to XYSR format: (center_x, center_y, area, aspect_ratio).
    #[inline]
    pub fn to_xysr(&self) -> [f32; 4] {
        let w = self.width();
        let h = self.height();
        let (cx, cy) = self.center();
        let ratio = if h > 0.0 { w / h } else { 0.0 };
        [cx, cy, w * h, ratio]
    }

    #[inline]
    pub fn to_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Area of the box; inverted boxes report zero.
    #[inline]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Calculate Intersection over Union (IoU) with another bounding box.
    ///
    /// Degenerate boxes yield 0.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let inter_width = (x2 - x1).max(0.0);
        let inter_height = (y2 - y1).max(0.0);
        let inter_area = inter_width * inter_height;

        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 && inter_area.is_finite() {
            inter_area / union_area
        } else {
            0.0
        }
    }

    /// True when every edge of `inner` lies strictly inside this box.
    pub fn strictly_contains(&self, inner: &BoundingBox) -> bool {
        inner.x1 > self.x1 && inner.y1 > self.y1 && inner.x2 < self.x2 && inner.y2 < self.y2
    }

    /// Coordinate-wise linear interpolation; `t = 0` yields `self`, `t = 1` yields `other`.
    pub fn lerp(&self, other: &BoundingBox, t: f32) -> BoundingBox {
        let mix = |a: f32, b: f32| a + (b - a) * t;
        BoundingBox {
            x1: mix(self.x1, other.x1),
            y1: mix(self.y1, other.y1),
            x2: mix(self.x2, other.x2),
            y2: mix(self.y2, other.y2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xysr_conversions() {
        let bbox = BoundingBox::new(10.0, 20.0, 40.0, 60.0);

        let xysr = bbox.to_xysr();
        assert_eq!(xysr[0], 25.0); // cx
        assert_eq!(xysr[1], 40.0); // cy
        assert_eq!(xysr[2], 1200.0); // area = 30 * 40
        assert!((xysr[3] - 0.75).abs() < 1e-6); // ratio = 30/40

        let back = BoundingBox::from_xysr(xysr[0], xysr[1], xysr[2], xysr[3]);
        assert!((back.x1 - 10.0).abs() < 1e-4);
        assert!((back.y1 - 20.0).abs() < 1e-4);
        assert!((back.x2 - 40.0).abs() < 1e-4);
        assert!((back.y2 - 60.0).abs() < 1e-4);
    }

    #[test]
    fn test_from_xysr_negative_scale() {
        let bbox = BoundingBox::from_xysr(5.0, 5.0, -10.0, 1.0);
        assert_eq!(bbox.area(), 0.0);
        assert!(bbox.is_finite());
    }

    #[test]
    fn test_validated_rejects_bad_input() {
        assert!(BoundingBox::validated(0.0, 0.0, 10.0, 10.0).is_ok());
        assert!(BoundingBox::validated(10.0, 0.0, 0.0, 10.0).is_err());
        assert!(BoundingBox::validated(0.0, f32::NAN, 10.0, 10.0).is_err());
        assert!(BoundingBox::validated(0.0, 0.0, f32::INFINITY, 10.0).is_err());
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);

        // Intersection: 5x5 = 25
        // Union: 100 + 100 - 25 = 175
        let iou = a.iou(&b);
        assert!((iou - 25.0 / 175.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_degenerate() {
        let a = BoundingBox::new(5.0, 5.0, 5.0, 5.0);
        assert_eq!(a.iou(&a), 0.0);

        let inverted = BoundingBox::new(10.0, 10.0, 0.0, 0.0);
        let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(inverted.iou(&b), 0.0);
    }

    #[test]
    fn test_strictly_contains() {
        let car = BoundingBox::new(100.0, 100.0, 200.0, 200.0);
        assert!(car.strictly_contains(&BoundingBox::new(110.0, 110.0, 150.0, 130.0)));
        // Touching an edge is not strict containment.
        assert!(!car.strictly_contains(&BoundingBox::new(100.0, 110.0, 150.0, 130.0)));
        assert!(!car.strictly_contains(&BoundingBox::new(190.0, 110.0, 210.0, 130.0)));
    }

    #[test]
    fn test_lerp_midpoint() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(0.0, 0.0, 20.0, 20.0);
        assert_eq!(a.lerp(&b, 0.5), BoundingBox::new(0.0, 0.0, 15.0, 15.0));
    }
}
