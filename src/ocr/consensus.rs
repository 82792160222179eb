//! Consensus over noisy OCR candidates for a single plate crop.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::format::{PLATE_ALLOWLIST, format_license, license_complies_format};
use super::preprocess::preprocess_plate;
use super::reader::{OcrError, OcrReader};

/// Configuration for the OCR consensus engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Characters the backend may emit
    pub allowlist: String,
    /// Raw candidates shorter than this are discarded
    pub min_candidate_len: usize,
    /// Minimum length of an unvalidated best-effort reading
    pub fallback_min_len: usize,
    /// Confidence multiplier for candidates read from the preprocessed crop
    pub preprocessed_discount: f32,
    /// Whether to run the second, preprocessed pass at all
    pub preprocess: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            allowlist: PLATE_ALLOWLIST.to_string(),
            min_candidate_len: 4,
            fallback_min_len: 5,
            preprocessed_discount: 0.9,
            preprocess: true,
        }
    }
}

/// Final text chosen for one crop.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrReading {
    pub text: String,
    pub confidence: f32,
    /// Whether `text` satisfies the plate grammar
    pub validated: bool,
}

/// A raw reading after the length filter and discounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub confidence: f32,
}

/// OCR consensus engine owning its recognition backend.
pub struct OcrConsensus<R: OcrReader> {
    reader: R,
    config: OcrConfig,
}

impl<R: OcrReader> OcrConsensus<R> {
    pub fn new(reader: R, config: OcrConfig) -> Self {
        Self { reader, config }
    }

    pub fn with_default_config(reader: R) -> Self {
        Self::new(reader, OcrConfig::default())
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Release the backend.
    pub fn into_reader(self) -> R {
        self.reader
    }

    /// Read a plate crop, returning the best candidate or `None` if nothing legible was found.
    ///
    /// Backend failures are logged and reported as `None`.
    pub fn read(&mut self, crop: &DynamicImage) -> Option<OcrReading> {
        if crop.width() == 0 || crop.height() == 0 {
            return None;
        }

        match self.collect_candidates(crop) {
            Ok(candidates) => {
                let reading = select_best(&candidates, self.config.fallback_min_len);
                debug!(candidates = candidates.len(), ?reading, "OCR consensus");
                reading
            }
            Err(err) => {
                warn!(error = %err, "OCR failed, treating plate as unread");
                None
            }
        }
    }

    fn collect_candidates(&mut self, crop: &DynamicImage) -> Result<Vec<Candidate>, OcrError> {
        let min_len = self.config.min_candidate_len;
        let mut candidates = Vec::new();

        for region in self.reader.read_text(crop, &self.config.allowlist)? {
            if region.text.chars().count() >= min_len {
                candidates.push(Candidate {
                    text: region.text,
                    confidence: region.confidence,
                });
            }
        }

        if self.config.preprocess {
            if let Some(processed) = preprocess_plate(crop) {
                let processed = DynamicImage::ImageLuma8(processed);
                for region in self.reader.read_text(&processed, &self.config.allowlist)? {
                    if region.text.chars().count() >= min_len {
                        candidates.push(Candidate {
                            text: region.text,
                            confidence: region.confidence * self.config.preprocessed_discount,
                        });
                    }
                }
            }
        }

        Ok(candidates)
    }
}

/// Pick the best reading among candidates.
///
/// The highest-confidence candidate that satisfies the plate grammar after
/// correction wins. Only when none does is the highest-confidence candidate
/// of at least `fallback_min_len` characters returned, unvalidated.
/// Equal confidences keep the earlier candidate. Candidates without a
/// positive confidence are ignored.
pub fn select_best(candidates: &[Candidate], fallback_min_len: usize) -> Option<OcrReading> {
    let mut best_valid: Option<OcrReading> = None;
    let mut best_fallback: Option<OcrReading> = None;

    for candidate in candidates {
        if candidate.confidence <= 0.0 || candidate.confidence.is_nan() {
            continue;
        }
        let formatted = format_license(&candidate.text);
        if license_complies_format(&formatted) {
            if best_valid
                .as_ref()
                .is_none_or(|best| candidate.confidence > best.confidence)
            {
                best_valid = Some(OcrReading {
                    text: formatted,
                    confidence: candidate.confidence,
                    validated: true,
                });
            }
        } else if formatted.chars().count() >= fallback_min_len
            && best_fallback
                .as_ref()
                .is_none_or(|best| candidate.confidence > best.confidence)
        {
            best_fallback = Some(OcrReading {
                text: formatted,
                confidence: candidate.confidence,
                validated: false,
            });
        }
    }

    best_valid.or(best_fallback)
}
