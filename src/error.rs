//! Error types shared across the pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid bounding box ({x1}, {y1}, {x2}, {y2}): {reason}")]
    InvalidBox {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        reason: &'static str,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The frame source could not produce the next frame. Fatal for the run.
    #[error("frame source failed: {0}")]
    FrameSource(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("frame {frame} appended after frame {last}")]
    OutOfOrderFrame { frame: u64, last: u64 },

    #[error("malformed result record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}
