//! Replay of recorded detections from a JSON Lines file.
//!
//! Each non-empty line holds one frame:
//!
//! ```text
//! {"frame": 0, "vehicles": [{"bbox": [x1, y1, x2, y2], "score": 0.9, "class_id": 2}], "plates": [...]}
//! ```
//!
//! Frames absent from the file are replayed with no detections, so the
//! tracker still ages its tracks across them.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::tracker::Detection;

use super::{DetectionBuilder, DetectionSource, Frame, FrameSource};

#[derive(Debug, Deserialize)]
struct RecordedFrame {
    frame: u64,
    #[serde(default)]
    vehicles: Vec<RecordedDetection>,
    #[serde(default)]
    plates: Vec<RecordedDetection>,
}

#[derive(Debug, Clone, Deserialize)]
struct RecordedDetection {
    bbox: [f32; 4],
    score: f32,
    #[serde(default)]
    class_id: u32,
}

impl RecordedDetection {
    fn build(&self) -> Result<Detection> {
        let [x1, y1, x2, y2] = self.bbox;
        DetectionBuilder::new()
            .tlbr(x1, y1, x2, y2)
            .score(self.score)
            .class_id(self.class_id)
            .build()
    }
}

/// Recorded detections, validated at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    vehicles: BTreeMap<u64, Vec<Detection>>,
    plates: BTreeMap<u64, Vec<Detection>>,
    frame_count: u64,
}

/// Per-frame detections of one kind.
#[derive(Debug, Default)]
pub struct ReplayDetector {
    by_frame: BTreeMap<u64, Vec<Detection>>,
}

/// Image-less frames `0..frame_count`.
#[derive(Debug)]
pub struct ReplayFrames {
    next: u64,
    end: u64,
}

impl Recording {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let recording = Self::from_reader(BufReader::new(File::open(path)?))?;
        info!(
            path = %path.display(),
            frames = recording.frame_count,
            "loaded recorded detections"
        );
        Ok(recording)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut vehicles: BTreeMap<u64, Vec<Detection>> = BTreeMap::new();
        let mut plates: BTreeMap<u64, Vec<Detection>> = BTreeMap::new();
        let mut frame_count = 0;

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx as u64 + 1;
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let malformed = |reason: String| Error::MalformedRecord {
                line: line_no,
                reason,
            };
            let recorded: RecordedFrame =
                serde_json::from_str(&line).map_err(|e| malformed(e.to_string()))?;
            let build_all = |dets: &[RecordedDetection]| {
                dets.iter()
                    .map(|d| d.build().map_err(|e| malformed(e.to_string())))
                    .collect::<Result<Vec<_>>>()
            };

            vehicles
                .entry(recorded.frame)
                .or_default()
                .extend(build_all(&recorded.vehicles)?);
            plates
                .entry(recorded.frame)
                .or_default()
                .extend(build_all(&recorded.plates)?);
            frame_count = frame_count.max(recorded.frame + 1);
        }

        Ok(Self {
            vehicles,
            plates,
            frame_count,
        })
    }

    /// One past the highest recorded frame index.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Split into a vehicle detector, a plate detector and the frame source.
    pub fn into_sources(self) -> (ReplayDetector, ReplayDetector, ReplayFrames) {
        (
            ReplayDetector {
                by_frame: self.vehicles,
            },
            ReplayDetector {
                by_frame: self.plates,
            },
            ReplayFrames {
                next: 0,
                end: self.frame_count,
            },
        )
    }
}

impl ReplayDetector {
    pub fn new(by_frame: BTreeMap<u64, Vec<Detection>>) -> Self {
        Self { by_frame }
    }
}

impl DetectionSource for ReplayDetector {
    type Error = Infallible;

    fn detect(&mut self, frame: &Frame) -> std::result::Result<Vec<Detection>, Self::Error> {
        Ok(self.by_frame.remove(&frame.index).unwrap_or_default())
    }
}

impl ReplayFrames {
    pub fn new(frame_count: u64) -> Self {
        Self {
            next: 0,
            end: frame_count,
        }
    }
}

impl FrameSource for ReplayFrames {
    type Error = Infallible;

    fn next_frame(&mut self) -> std::result::Result<Option<Frame>, Self::Error> {
        if self.next >= self.end {
            return Ok(None);
        }
        let frame = Frame::without_image(self.next);
        self.next += 1;
        Ok(Some(frame))
    }
}
