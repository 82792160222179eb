//! Plate text recognition: backend trait, preprocessing and candidate consensus.

mod consensus;
mod format;
mod preprocess;
mod reader;

pub use consensus::{Candidate, OcrConfig, OcrConsensus, OcrReading, select_best};
pub use format::{PLATE_ALLOWLIST, format_license, license_complies_format, normalize};
pub use preprocess::{clahe, preprocess_plate, white_ratio};
pub use reader::{DisabledOcr, OcrError, OcrReader, TextRegion};
