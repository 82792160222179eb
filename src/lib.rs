//! Vehicle tracking, license plate association and OCR consensus for
//! offline video pipelines.
//!
//! Frames flow through [`PlatePipeline`]: vehicles are tracked with a
//! SORT-style [`SortTracker`], plates are attached to the vehicle that
//! strictly contains them, and plate crops are read through an
//! [`OcrReader`] backend with position-aware correction. Results can be
//! written to CSV and gap-filled with [`interpolate_gaps`].

pub mod association;
pub mod config;
pub mod error;
pub mod integration;
pub mod interpolation;
pub mod ocr;
pub mod persist;
pub mod results;
pub mod tracker;

pub use association::{AssociationPolicy, assign_plate};
pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use integration::{
    DetectionBuilder, DetectionSource, Frame, FrameSource, PlatePipeline, Recording, RunSummary,
};
pub use interpolation::interpolate_gaps;
pub use ocr::{OcrConsensus, OcrReader, OcrReading};
pub use results::{FrameResult, FrameResults, PlateReading, PlateText, ResultSink, VehicleRecord};
pub use tracker::{BoundingBox, Detection, SortTracker, TrackedBox, TrackerConfig};
