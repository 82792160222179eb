//! Trait for optical character recognition backends.

use image::DynamicImage;
use thiserror::Error;

/// Transient recognition failure. Never aborts a run.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR backend failed: {0}")]
    Backend(String),
    #[error("OCR backend rejected the image: {0}")]
    InvalidImage(String),
}

/// One text line found by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRegion {
    /// Corner points of the text region in image coordinates
    pub region: [(f32, f32); 4],
    pub text: String,
    pub confidence: f32,
}

impl TextRegion {
    /// Region-less text, for backends that only report strings.
    pub fn text(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            region: [(0.0, 0.0); 4],
            text: text.into(),
            confidence,
        }
    }
}

/// Trait for OCR backends.
///
/// Implement this trait to connect any recognizer to the consensus engine.
/// The backend is an explicitly owned resource: it is handed to
/// [`OcrConsensus`](super::OcrConsensus) on construction and released when the
/// engine is dropped or unwrapped.
///
/// # Example
///
/// ```ignore
/// use platetrack_rs::ocr::{OcrError, OcrReader, TextRegion};
///
/// struct MyRecognizer { /* model session */ }
///
/// impl OcrReader for MyRecognizer {
///     fn read_text(&mut self, image: &DynamicImage, allowlist: &str) -> Result<Vec<TextRegion>, OcrError> {
///         Ok(vec![])
///     }
/// }
/// ```
pub trait OcrReader {
    /// Read every text line in `image`, restricting output to `allowlist` characters.
    fn read_text(
        &mut self,
        image: &DynamicImage,
        allowlist: &str,
    ) -> Result<Vec<TextRegion>, OcrError>;

    /// `false` for backends that never read anything; plates are then
    /// recorded as `NO_OCR` without cropping or preprocessing.
    fn is_enabled(&self) -> bool {
        true
    }
}

impl<R: OcrReader + ?Sized> OcrReader for Box<R> {
    fn read_text(
        &mut self,
        image: &DynamicImage,
        allowlist: &str,
    ) -> Result<Vec<TextRegion>, OcrError> {
        (**self).read_text(image, allowlist)
    }

    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }
}

/// Backend that turns OCR off. Plates are recorded as `NO_OCR`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledOcr;

impl OcrReader for DisabledOcr {
    fn is_enabled(&self) -> bool {
        false
    }

    fn read_text(
        &mut self,
        _image: &DynamicImage,
        _allowlist: &str,
    ) -> Result<Vec<TextRegion>, OcrError> {
        Ok(Vec::new())
    }
}
