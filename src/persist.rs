//! Stable CSV format for pipeline results.
//!
//! One row per (frame, vehicle):
//! `frame_nmr,car_id,car_bbox,license_plate_bbox,license_plate_bbox_score,license_number,license_number_score`.
//! Boxes are written as `[x1 y1 x2 y2]`. Records without a plate leave the
//! plate columns empty.

use std::fs::File;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::results::{FrameResult, FrameResults, PlateReading, PlateText, ResultSink, VehicleRecord};
use crate::tracker::BoundingBox;

pub const HEADER: [&str; 7] = [
    "frame_nmr",
    "car_id",
    "car_bbox",
    "license_plate_bbox",
    "license_plate_bbox_score",
    "license_number",
    "license_number_score",
];

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    frame_nmr: u64,
    car_id: u64,
    car_bbox: String,
    license_plate_bbox: String,
    license_plate_bbox_score: Option<f32>,
    license_number: String,
    license_number_score: Option<f32>,
}

impl CsvRow {
    fn new(frame: u64, vehicle_id: u64, record: &VehicleRecord) -> Self {
        let plate = record.plate.as_ref();
        Self {
            frame_nmr: frame,
            car_id: vehicle_id,
            car_bbox: format_bbox(&record.vehicle),
            license_plate_bbox: plate.map(|p| format_bbox(&p.bbox)).unwrap_or_default(),
            license_plate_bbox_score: plate.map(|p| p.bbox_score),
            license_number: plate.map(|p| p.text.to_string()).unwrap_or_default(),
            license_number_score: plate.map(|p| p.text_score),
        }
    }

    fn into_record(self, line: u64) -> Result<(u64, u64, VehicleRecord)> {
        let vehicle = parse_bbox(&self.car_bbox, line)?;
        let plate = if self.license_plate_bbox.trim().is_empty() {
            None
        } else {
            Some(PlateReading {
                bbox: parse_bbox(&self.license_plate_bbox, line)?,
                bbox_score: self.license_plate_bbox_score.unwrap_or(0.0),
                text: PlateText::parse(self.license_number.trim()),
                text_score: self.license_number_score.unwrap_or(0.0),
            })
        };
        Ok((self.frame_nmr, self.car_id, VehicleRecord::observed(vehicle, plate)))
    }
}

fn format_bbox(bbox: &BoundingBox) -> String {
    format!("[{} {} {} {}]", bbox.x1, bbox.y1, bbox.x2, bbox.y2)
}

/// Parse `[x1 y1 x2 y2]`; commas are accepted as separators too.
pub fn parse_bbox(text: &str, line: u64) -> Result<BoundingBox> {
    let malformed = |reason: String| Error::MalformedRecord { line, reason };

    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| malformed(format!("box {text:?} is not bracketed")))?;

    let coords = inner
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f32>()
                .map_err(|e| malformed(format!("bad coordinate {s:?}: {e}")))
        })
        .collect::<Result<Vec<f32>>>()?;

    let coords: [f32; 4] = coords
        .try_into()
        .map_err(|v: Vec<f32>| malformed(format!("expected 4 coordinates, got {}", v.len())))?;

    BoundingBox::from_array(coords).map_err(|e| malformed(e.to_string()))
}

/// Streaming CSV sink; rows are written as frames are appended.
pub struct CsvResultWriter<W: io::Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl CsvResultWriter<File> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(File::create(path)?)
    }
}

impl<W: io::Write> CsvResultWriter<W> {
    /// Wrap a writer and emit the header row.
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(HEADER)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write_frame(&mut self, result: &FrameResult) -> Result<()> {
        for (&vehicle_id, record) in &result.vehicles {
            self.writer
                .serialize(CsvRow::new(result.frame, vehicle_id, record))?;
            self.rows += 1;
        }
        Ok(())
    }

    /// Rows written so far, excluding the header.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}

impl<W: io::Write> ResultSink for CsvResultWriter<W> {
    fn append(&mut self, result: FrameResult) -> Result<()> {
        self.write_frame(&result)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

pub fn write_csv<W: io::Write>(results: &FrameResults, inner: W) -> Result<W> {
    let mut writer = CsvResultWriter::new(inner)?;
    for result in results.iter() {
        writer.write_frame(result)?;
    }
    writer.flush()?;
    writer.into_inner()
}

pub fn write_csv_path(results: &FrameResults, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    write_csv(results, File::create(path)?)?;
    info!(
        path = %path.display(),
        records = results.record_count(),
        "wrote results"
    );
    Ok(())
}

/// Read results back; frames with no rows are not represented.
pub fn read_csv<R: io::Read>(inner: R) -> Result<FrameResults> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(inner);

    let mut frames = Vec::new();
    for (idx, row) in reader.deserialize::<CsvRow>().enumerate() {
        // Line 1 is the header.
        let line = idx as u64 + 2;
        let (frame, vehicle_id, record) = row?.into_record(line)?;
        let mut result = FrameResult::new(frame);
        result.vehicles.insert(vehicle_id, record);
        frames.push(result);
    }
    Ok(FrameResults::from_frames(frames))
}

pub fn read_csv_path(path: impl AsRef<Path>) -> Result<FrameResults> {
    read_csv(File::open(path)?)
}
