//! Per-frame pipeline output and the sinks that receive it.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::tracker::BoundingBox;

/// Plate text as persisted, including the two sentinels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlateText {
    Read(String),
    /// OCR was attempted but produced nothing legible
    Unknown,
    /// OCR was not run
    NoOcr,
}

impl PlateText {
    pub const UNKNOWN: &'static str = "UNKNOWN";
    pub const NO_OCR: &'static str = "NO_OCR";

    pub fn as_str(&self) -> &str {
        match self {
            PlateText::Read(text) => text,
            PlateText::Unknown => Self::UNKNOWN,
            PlateText::NoOcr => Self::NO_OCR,
        }
    }

    /// Parse persisted text; sentinels and empty strings map back to their variants.
    pub fn parse(text: &str) -> Self {
        match text {
            Self::NO_OCR => PlateText::NoOcr,
            Self::UNKNOWN | "" => PlateText::Unknown,
            other => PlateText::Read(other.to_string()),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            PlateText::Read(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for PlateText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlateReading {
    pub bbox: BoundingBox,
    /// Plate detector confidence
    pub bbox_score: f32,
    pub text: PlateText,
    /// OCR confidence; 0 for sentinels
    pub text_score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRecord {
    pub vehicle: BoundingBox,
    pub plate: Option<PlateReading>,
    /// Synthesized by gap interpolation rather than observed
    pub interpolated: bool,
}

impl VehicleRecord {
    pub fn observed(vehicle: BoundingBox, plate: Option<PlateReading>) -> Self {
        Self {
            vehicle,
            plate,
            interpolated: false,
        }
    }
}

/// Records for one frame, keyed by vehicle identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameResult {
    pub frame: u64,
    pub vehicles: BTreeMap<u64, VehicleRecord>,
}

impl FrameResult {
    pub fn new(frame: u64) -> Self {
        Self {
            frame,
            vehicles: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

/// Receiver for frame results, appended in strictly increasing frame order.
pub trait ResultSink {
    fn append(&mut self, result: FrameResult) -> Result<()>;

    /// Persist anything buffered so far.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-memory, frame-ordered sequence of results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameResults {
    frames: Vec<FrameResult>,
}

impl FrameResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary frames: sorts by frame index and merges duplicates.
    pub fn from_frames(frames: impl IntoIterator<Item = FrameResult>) -> Self {
        let mut merged: BTreeMap<u64, FrameResult> = BTreeMap::new();
        for result in frames {
            merged
                .entry(result.frame)
                .or_insert_with(|| FrameResult::new(result.frame))
                .vehicles
                .extend(result.vehicles);
        }
        Self {
            frames: merged.into_values().collect(),
        }
    }

    pub fn frames(&self) -> &[FrameResult] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<FrameResult> {
        self.frames
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameResult> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, frame: u64) -> Option<&FrameResult> {
        self.frames
            .binary_search_by_key(&frame, |r| r.frame)
            .ok()
            .map(|idx| &self.frames[idx])
    }

    pub fn record(&self, frame: u64, vehicle_id: u64) -> Option<&VehicleRecord> {
        self.get(frame).and_then(|r| r.vehicles.get(&vehicle_id))
    }

    /// Total number of (frame, vehicle) records.
    pub fn record_count(&self) -> usize {
        self.frames.iter().map(|r| r.vehicles.len()).sum()
    }

    /// Best non-sentinel reading per vehicle, by text confidence.
    ///
    /// Equal confidences keep the earliest frame.
    pub fn best_readings(&self) -> BTreeMap<u64, BestReading> {
        let mut best: BTreeMap<u64, BestReading> = BTreeMap::new();
        for result in &self.frames {
            for (&vehicle_id, record) in &result.vehicles {
                let Some(plate) = &record.plate else {
                    continue;
                };
                let Some(text) = plate.text.text() else {
                    continue;
                };
                let better = best
                    .get(&vehicle_id)
                    .is_none_or(|current| plate.text_score > current.text_score);
                if better {
                    best.insert(
                        vehicle_id,
                        BestReading {
                            text: text.to_string(),
                            text_score: plate.text_score,
                            frame: result.frame,
                            plate_bbox: plate.bbox,
                        },
                    );
                }
            }
        }
        best
    }
}

impl ResultSink for FrameResults {
    fn append(&mut self, result: FrameResult) -> Result<()> {
        if let Some(last) = self.frames.last() {
            if result.frame <= last.frame {
                return Err(Error::OutOfOrderFrame {
                    frame: result.frame,
                    last: last.frame,
                });
            }
        }
        self.frames.push(result);
        Ok(())
    }
}

/// Highest-confidence plate text seen for one vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct BestReading {
    pub text: String,
    pub text_score: f32,
    pub frame: u64,
    pub plate_bbox: BoundingBox,
}
