//! PlatePipeline for combining detection, tracking, association and OCR.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::association::assign_plate;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::ocr::{DisabledOcr, OcrConsensus, OcrReader};
use crate::results::{FrameResult, PlateReading, PlateText, ResultSink, VehicleRecord};
use crate::tracker::{BoundingBox, Detection, SortTracker, TrackedBox};

use super::{DetectionSource, Frame, FrameSource};

/// Totals for one [`PlatePipeline::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub records: usize,
    /// Stopped by the abort flag before the source was exhausted
    pub aborted: bool,
}

/// Per-frame pipeline: vehicle detection and tracking, plate detection,
/// plate-to-vehicle association and, when an OCR backend is attached,
/// plate reading.
///
/// Without OCR every associated plate is recorded as [`PlateText::NoOcr`].
pub struct PlatePipeline<V, P, R = DisabledOcr>
where
    V: DetectionSource,
    P: DetectionSource,
    R: OcrReader,
{
    vehicle_detector: V,
    plate_detector: P,
    ocr: Option<OcrConsensus<R>>,
    tracker: SortTracker,
    config: PipelineConfig,
}

impl<V: DetectionSource, P: DetectionSource> PlatePipeline<V, P> {
    /// Create a pipeline without OCR.
    pub fn new(vehicle_detector: V, plate_detector: P, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            vehicle_detector,
            plate_detector,
            ocr: None,
            tracker: SortTracker::new(config.tracker.clone()),
            config,
        })
    }
}

impl<V, P, R> PlatePipeline<V, P, R>
where
    V: DetectionSource,
    P: DetectionSource,
    R: OcrReader,
{
    /// Attach an OCR backend, configured from `config.ocr`.
    /// Attach an OCR backend. A backend reporting `is_enabled() == false`
    /// leaves OCR off.
    pub fn with_ocr<R2: OcrReader>(self, reader: R2) -> PlatePipeline<V, P, R2> {
        let engine = reader
            .is_enabled()
            .then(|| OcrConsensus::new(reader, self.config.ocr.clone()));
        PlatePipeline {
            vehicle_detector: self.vehicle_detector,
            plate_detector: self.plate_detector,
            ocr: engine,
            tracker: self.tracker,
            config: self.config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn tracker(&self) -> &SortTracker {
        &self.tracker
    }

    pub fn ocr(&self) -> Option<&OcrConsensus<R>> {
        self.ocr.as_ref()
    }

    /// Process one frame and return its records.
    ///
    /// Detector failures are logged and treated as an empty detection list,
    /// so the tracker still ages its tracks.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameResult {
        let vehicles: Vec<Detection> = run_detector(&mut self.vehicle_detector, frame, "vehicle")
            .into_iter()
            .filter(|d| self.config.is_vehicle_class(d.class_id))
            .collect();
        let tracks = self.tracker.update(&vehicles);

        let plates = run_detector(&mut self.plate_detector, frame, "plate");

        // Keep the most confident plate per vehicle.
        let mut assigned: BTreeMap<u64, &Detection> = BTreeMap::new();
        for plate in &plates {
            let Some(vehicle_id) = assign_plate(&plate.bbox, &tracks, self.config.association)
            else {
                continue;
            };
            match assigned.entry(vehicle_id) {
                Entry::Vacant(slot) => {
                    slot.insert(plate);
                }
                Entry::Occupied(mut slot) => {
                    debug!(frame = frame.index, vehicle_id, "several plates in one vehicle");
                    if plate.score > slot.get().score {
                        slot.insert(plate);
                    }
                }
            }
        }

        let mut result = FrameResult::new(frame.index);
        for (vehicle_id, plate) in assigned {
            let Some(vehicle) = find_track(&tracks, vehicle_id) else {
                continue;
            };
            let reading = self.read_plate(frame, vehicle_id, plate);
            result
                .vehicles
                .insert(vehicle_id, VehicleRecord::observed(vehicle, Some(reading)));
        }

        if self.config.record_unplated_vehicles {
            for track in &tracks {
                result
                    .vehicles
                    .entry(track.track_id)
                    .or_insert_with(|| VehicleRecord::observed(track.bbox, None));
            }
        }

        debug!(
            frame = frame.index,
            vehicles = vehicles.len(),
            tracks = tracks.len(),
            plates = plates.len(),
            records = result.vehicles.len(),
            "processed frame"
        );
        result
    }

    /// Process frames until the source is exhausted or `abort` is set,
    /// appending each frame's records to `sink`.
    ///
    /// The sink is flushed on every exit path that reaches the end of the loop,
    /// including an abort.
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K, abort: &AtomicBool) -> Result<RunSummary>
    where
        S: FrameSource,
        K: ResultSink,
    {
        let mut summary = RunSummary::default();

        loop {
            if abort.load(Ordering::SeqCst) {
                warn!(frames = summary.frames, "run aborted, keeping partial results");
                summary.aborted = true;
                break;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    sink.flush()?;
                    return Err(Error::FrameSource(Box::new(err)));
                }
            };

            let result = self.process_frame(&frame);
            summary.frames += 1;
            summary.records += result.vehicles.len();
            sink.append(result)?;
        }

        sink.flush()?;
        info!(
            frames = summary.frames,
            records = summary.records,
            aborted = summary.aborted,
            "run finished"
        );
        Ok(summary)
    }

    fn read_plate(&mut self, frame: &Frame, vehicle_id: u64, plate: &Detection) -> PlateReading {
        let crop = frame
            .image
            .as_ref()
            .and_then(|image| crop_to_box(image, &plate.bbox));

        if let (Some(dir), Some(crop)) = (&self.config.crop_dir, &crop) {
            save_crop(dir, frame.index, vehicle_id, crop);
        }

        let (text, text_score) = match (self.ocr.as_mut(), crop.as_ref()) {
            (None, _) => (PlateText::NoOcr, 0.0),
            (Some(_), None) => (PlateText::Unknown, 0.0),
            (Some(engine), Some(crop)) => match engine.read(crop) {
                Some(reading) => (PlateText::Read(reading.text), reading.confidence),
                None => (PlateText::Unknown, 0.0),
            },
        };

        PlateReading {
            bbox: plate.bbox,
            bbox_score: plate.score,
            text,
            text_score,
        }
    }
}

fn run_detector<D: DetectionSource>(detector: &mut D, frame: &Frame, kind: &str) -> Vec<Detection> {
    let detections = match detector.detect(frame) {
        Ok(detections) => detections,
        Err(err) => {
            warn!(frame = frame.index, kind, error = %err, "detection failed, using no detections");
            return Vec::new();
        }
    };

    detections
        .into_iter()
        .filter(|d| {
            let b = d.bbox;
            let valid = BoundingBox::validated(b.x1, b.y1, b.x2, b.y2).is_ok();
            if !valid {
                warn!(frame = frame.index, kind, bbox = ?b, "dropping invalid detection");
            }
            valid
        })
        .collect()
}

fn find_track(tracks: &[TrackedBox], track_id: u64) -> Option<BoundingBox> {
    tracks
        .iter()
        .find(|t| t.track_id == track_id)
        .map(|t| t.bbox)
}

/// Crop `bbox` out of `image`, truncating coordinates to whole pixels and
/// clipping to the image bounds. Returns `None` when nothing is left.
pub fn crop_to_box(image: &DynamicImage, bbox: &BoundingBox) -> Option<DynamicImage> {
    let clamp = |v: f32, max: u32| (v.max(0.0) as u32).min(max);
    let x1 = clamp(bbox.x1, image.width());
    let y1 = clamp(bbox.y1, image.height());
    let x2 = clamp(bbox.x2, image.width());
    let y2 = clamp(bbox.y2, image.height());

    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(image.crop_imm(x1, y1, x2 - x1, y2 - y1))
}

fn save_crop(dir: &Path, frame: u64, vehicle_id: u64, crop: &DynamicImage) {
    let path = dir.join(format!("plate_frame{frame}_car{vehicle_id}.jpg"));
    let saved = fs::create_dir_all(dir)
        .map_err(Error::from)
        .and_then(|()| {
            DynamicImage::ImageRgb8(crop.to_rgb8())
                .save(&path)
                .map_err(Error::from)
        });
    if let Err(err) = saved {
        warn!(path = %path.display(), error = %err, "could not save plate crop");
    }
}
