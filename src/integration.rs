//! Integration module for connecting detection, frame and OCR backends with
//! the plate pipeline.
//!
//! This module provides the traits a video decoder and detector models
//! implement, a replay source for recorded detections, and the per-frame
//! `PlatePipeline` that drives tracking, association and OCR.

mod builder;
mod detector;
mod pipeline;
mod replay;

pub use builder::DetectionBuilder;
pub use detector::{DetectionSource, Frame, FrameSource};
pub use pipeline::{PlatePipeline, RunSummary, crop_to_box};
pub use replay::{Recording, ReplayDetector, ReplayFrames};
