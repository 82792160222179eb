//! Detection input and track-to-detection assignment.

use crate::error::Result;
use crate::tracker::bbox::BoundingBox;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Detection input for the tracker and the plate associator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding box in TLBR format (x1, y1, x2, y2)
    pub bbox: BoundingBox,
    /// Detection confidence score
    pub score: f32,
    /// Detector class id (COCO ids for the vehicle detector)
    #[serde(default)]
    pub class_id: u32,
}

impl Detection {
    /// Build a detection, rejecting non-finite or inverted coordinates.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: u32) -> Result<Self> {
        Ok(Self {
            bbox: BoundingBox::validated(x1, y1, x2, y2)?,
            score,
            class_id,
        })
    }

    pub fn from_bbox(bbox: BoundingBox, score: f32, class_id: u32) -> Self {
        Self {
            bbox,
            score,
            class_id,
        }
    }
}

/// Compute IoU distance matrix between tracks and detections.
pub fn iou_distance(track_boxes: &[BoundingBox], det_boxes: &[BoundingBox]) -> Array2<f32> {
    let mut dists = Array2::zeros((track_boxes.len(), det_boxes.len()));
    for (i, t) in track_boxes.iter().enumerate() {
        for (j, d) in det_boxes.iter().enumerate() {
            dists[[i, j]] = 1.0 - t.iou(d);
        }
    }
    dists
}

#[derive(Debug, Clone)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Minimum-cost assignment over an IoU distance matrix.
///
/// Pairs whose cost exceeds `thresh` are reported unmatched on both sides.
/// A cost of 1.0 (zero overlap) never matches regardless of `thresh`.
pub fn linear_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: vec![],
            unmatched_detections: (0..num_cols).collect(),
        };
    }

    if num_cols == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: vec![],
        };
    }

    // lapjv needs a square matrix; padded cells are never accepted below.
    let size = num_rows.max(num_cols);
    let padded = Array2::<f64>::from_shape_fn((size, size), |(i, j)| {
        if i < num_rows && j < num_cols {
            cost_matrix[[i, j]] as f64
        } else {
            1e6
        }
    });

    let row_to_col = match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => row_to_col,
        Err(err) => {
            warn!(error = ?err, "assignment solver failed, leaving all pairs unmatched");
            return AssignmentResult {
                matches: vec![],
                unmatched_tracks: (0..num_rows).collect(),
                unmatched_detections: (0..num_cols).collect(),
            };
        }
    };

    let mut matches = vec![];
    let mut unmatched_tracks = vec![];
    let mut detection_taken = vec![false; num_cols];

    for (row, &col) in row_to_col.iter().take(num_rows).enumerate() {
        let accepted = col < num_cols && {
            let cost = cost_matrix[[row, col]];
            cost <= thresh && cost < 1.0
        };
        if accepted {
            matches.push((row, col));
            detection_taken[col] = true;
        } else {
            unmatched_tracks.push(row);
        }
    }

    let unmatched_detections = (0..num_cols).filter(|&j| !detection_taken[j]).collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}
