//! Traits for detection backends and frame sources.

use image::DynamicImage;

use crate::tracker::Detection;

/// One decoded video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based position in the video
    pub index: u64,
    /// Pixels, when available; plate crops and OCR need them
    pub image: Option<DynamicImage>,
}

impl Frame {
    pub fn new(index: u64, image: DynamicImage) -> Self {
        Self {
            index,
            image: Some(image),
        }
    }

    /// A frame known only by its index, e.g. when replaying recorded detections.
    pub fn without_image(index: u64) -> Self {
        Self { index, image: None }
    }
}

/// Trait for object detection inference backends.
///
/// Implement this trait to connect a vehicle or plate detector to the pipeline.
///
/// # Example
///
/// ```ignore
/// use platetrack_rs::{Detection, DetectionSource, Frame};
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl DetectionSource for MyDetector {
///     type Error = std::io::Error;
///
///     fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
///         // Run inference and return detections
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionSource {
    /// Error type for detection failures.
    type Error: std::fmt::Display;

    /// Run inference on a frame and return its detections.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error>;
}

/// Sequential frame reader, e.g. a video decoder.
pub trait FrameSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error>;
}

impl<D: DetectionSource + ?Sized> DetectionSource for Box<D> {
    type Error = D::Error;

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
        (**self).detect(frame)
    }
}
