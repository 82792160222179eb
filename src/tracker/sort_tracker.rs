//! SORT-style vehicle tracker: Kalman prediction plus IoU assignment.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::tracker::bbox::BoundingBox;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::{self, AssignmentResult, Detection};
use crate::tracker::track::Track;

/// Configuration for the SortTracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Frames a track survives without a match before eviction
    pub max_age: u32,
    /// Consecutive matches required before a track is reported
    pub min_hits: u32,
    /// Minimum IoU for a track/detection pair to be matched
    pub iou_threshold: f32,
    /// Missed frames a confirmed track may still be reported for
    pub max_output_misses: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_age: 1,
            min_hits: 3,
            iou_threshold: 0.3,
            max_output_misses: 0,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(Error::InvalidConfig(format!(
                "tracker.iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            )));
        }
        if self.min_hits == 0 {
            return Err(Error::InvalidConfig(
                "tracker.min_hits must be at least 1".to_string(),
            ));
        }
        if self.max_output_misses > self.max_age {
            return Err(Error::InvalidConfig(format!(
                "tracker.max_output_misses ({}) cannot exceed tracker.max_age ({})",
                self.max_output_misses, self.max_age
            )));
        }
        Ok(())
    }
}

/// A reported vehicle box with its persistent identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedBox {
    pub bbox: BoundingBox,
    pub track_id: u64,
}

pub struct SortTracker {
    tracks: Vec<Track>,
    frame_count: u64,
    next_id: u64,
    config: TrackerConfig,
    kalman_filter: KalmanFilter,
}

impl SortTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            tracks: Vec::new(),
            frame_count: 0,
            next_id: 1,
            config,
            kalman_filter: KalmanFilter::default(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Live tracks, reported or not.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Number of `update` calls so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Advance the tracker by one frame.
    ///
    /// Must be called exactly once per frame, in frame order, including frames
    /// without detections.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<TrackedBox> {
        self.frame_count += 1;

        // Step 1: Predict, dropping tracks whose estimate has diverged
        let kalman_filter = &self.kalman_filter;
        let mut predicted = Vec::with_capacity(self.tracks.len());
        self.tracks.retain_mut(|track| {
            let bbox = track.predict(kalman_filter);
            if bbox.is_finite() {
                predicted.push(bbox);
                true
            } else {
                debug!(track_id = track.track_id, "dropping track with non-finite prediction");
                false
            }
        });

        // Step 2: Associate predictions with detections
        let det_boxes: Vec<BoundingBox> = detections.iter().map(|d| d.bbox).collect();
        let dists = matching::iou_distance(&predicted, &det_boxes);

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::linear_assignment(&dists, 1.0 - self.config.iou_threshold);

        // Step 3: Correct matched tracks
        for (itracked, idet) in matches {
            let det = &detections[idet];
            self.tracks[itracked].update(
                &det.bbox,
                det.score,
                &self.kalman_filter,
                self.config.min_hits,
            );
        }

        for idx in unmatched_tracks {
            self.tracks[idx].mark_missed();
        }

        // Step 4: Spawn tracks for unmatched detections with a usable box
        for idx in unmatched_detections {
            let det = &detections[idx];
            if det.bbox.area() <= 0.0 {
                debug!(frame = self.frame_count, bbox = ?det.bbox, "not spawning track for zero-area detection");
                continue;
            }
            let track = Track::new(self.next_id, det.bbox, det.score, &self.kalman_filter);
            debug!(track_id = track.track_id, frame = self.frame_count, "spawned track");
            self.next_id += 1;
            self.tracks.push(track);
        }

        // Step 5: Report
        let warming_up = self.frame_count <= self.config.min_hits as u64;
        let outputs = self
            .tracks
            .iter()
            .filter(|t| {
                t.time_since_update <= self.config.max_output_misses
                    && (t.is_confirmed() || warming_up)
            })
            .map(|t| TrackedBox {
                bbox: t.bbox(),
                track_id: t.track_id,
            })
            .collect();

        // Step 6: Evict stale tracks
        let max_age = self.config.max_age;
        let frame = self.frame_count;
        self.tracks.retain(|track| {
            let keep = track.time_since_update <= max_age;
            if !keep {
                debug!(track_id = track.track_id, frame, "evicted track");
            }
            keep
        });

        outputs
    }
}
