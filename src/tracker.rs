mod bbox;
mod kalman_filter;
mod matching;
mod sort_tracker;
mod track;
mod track_state;

pub use bbox::BoundingBox;
pub use kalman_filter::KalmanFilter;
pub use matching::Detection;
pub use sort_tracker::{SortTracker, TrackedBox, TrackerConfig};
pub use track::Track;
pub use track_state::TrackState;
