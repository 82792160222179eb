//! Builder for turning detector outputs in assorted box layouts into `Detection`s.

use crate::error::Result;
use crate::tracker::{BoundingBox, Detection};

/// Builder for creating `Detection` objects from various input formats.
///
/// The box is validated in [`DetectionBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    bbox: BoundingBox,
    score: f32,
    class_id: u32,
}

impl DetectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Corners: (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.bbox = BoundingBox::new(x1, y1, x2, y2);
        self
    }

    /// Center and size, as YOLO-style heads emit them.
    pub fn xywh(self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        let (hw, hh) = (w / 2.0, h / 2.0);
        self.tlbr(cx - hw, cy - hh, cx + hw, cy + hh)
    }

    /// Top-left corner and size.
    pub fn tlwh(self, left: f32, top: f32, w: f32, h: f32) -> Self {
        self.tlbr(left, top, left + w, top + h)
    }

    pub fn score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn class_id(mut self, class_id: u32) -> Self {
        self.class_id = class_id;
        self
    }

    pub fn build(self) -> Result<Detection> {
        let BoundingBox { x1, y1, x2, y2 } = self.bbox;
        Detection::new(x1, y1, x2, y2, self.score, self.class_id)
    }
}
