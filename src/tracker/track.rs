//! Single vehicle track for multi-object tracking.

use ndarray::{Array1, Array2};

use crate::tracker::bbox::BoundingBox;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::track_state::TrackState;

/// Single vehicle track backed by a Kalman state estimate.
#[derive(Debug, Clone)]
pub struct Track {
    /// Unique track identifier, never reused within a tracker
    pub track_id: u64,
    /// Current lifecycle state
    pub state: TrackState,
    /// Frames since the track was spawned
    pub age: u32,
    /// Total number of successful associations
    pub hits: u32,
    /// Consecutive successful associations
    pub hit_streak: u32,
    /// Frames since the last successful association
    pub time_since_update: u32,
    /// Confidence of the last associated detection
    pub score: f32,
    /// Kalman filter state mean (7-dim)
    mean: Array1<f64>,
    /// Kalman filter state covariance (7x7)
    covariance: Array2<f64>,
}

fn to_measurement(bbox: &BoundingBox) -> [f64; 4] {
    let xysr = bbox.to_xysr();
    [
        xysr[0] as f64,
        xysr[1] as f64,
        xysr[2] as f64,
        xysr[3] as f64,
    ]
}

impl Track {
    /// Spawn a new tentative track from an unmatched detection.
    pub fn new(track_id: u64, bbox: BoundingBox, score: f32, kalman_filter: &KalmanFilter) -> Self {
        let (mean, covariance) = kalman_filter.initiate(to_measurement(&bbox));
        Self {
            track_id,
            state: TrackState::Tentative,
            age: 0,
            hits: 0,
            hit_streak: 0,
            time_since_update: 0,
            score,
            mean,
            covariance,
        }
    }

    /// Current box estimate.
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::from_xysr(
            self.mean[0] as f32,
            self.mean[1] as f32,
            self.mean[2] as f32,
            self.mean[3] as f32,
        )
    }

    /// Whether the track has ever reached `min_hits` consecutive matches.
    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, TrackState::Confirmed | TrackState::Lost)
    }

    /// Advance the state one frame and return the predicted box.
    pub fn predict(&mut self, kalman_filter: &KalmanFilter) -> BoundingBox {
        let (mean, covariance) = kalman_filter.predict(&self.mean, &self.covariance);
        self.mean = mean;
        self.covariance = covariance;

        self.age += 1;
        if self.time_since_update > 0 {
            self.hit_streak = 0;
        }
        self.time_since_update += 1;
        self.bbox()
    }

    /// Correct the state with a matched detection.
    pub fn update(
        &mut self,
        bbox: &BoundingBox,
        score: f32,
        kalman_filter: &KalmanFilter,
        min_hits: u32,
    ) {
        if let Some((mean, covariance)) =
            kalman_filter.update(&self.mean, &self.covariance, to_measurement(bbox))
        {
            self.mean = mean;
            self.covariance = covariance;
        }

        self.time_since_update = 0;
        self.hits += 1;
        self.hit_streak += 1;
        self.score = score;

        if self.is_confirmed() || self.hit_streak >= min_hits {
            self.state = TrackState::Confirmed;
        }
    }

    /// Record a frame without a match.
    pub fn mark_missed(&mut self) {
        if self.state == TrackState::Confirmed {
            self.state = TrackState::Lost;
        }
    }
}
