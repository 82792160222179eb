use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::{DynamicImage, RgbImage};
use platetrack_rs::ocr::{OcrError, OcrReader, TextRegion};
use platetrack_rs::persist::{CsvResultWriter, read_csv_path, write_csv_path};
use platetrack_rs::{
    BoundingBox, Detection, DetectionSource, Error, Frame, FrameResults, FrameSource, PipelineConfig,
    PlatePipeline, PlateText, Recording, interpolate_gaps,
};

struct MockDetector {
    by_frame: BTreeMap<u64, Vec<Detection>>,
}

impl DetectionSource for MockDetector {
    type Error = std::convert::Infallible;

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
        Ok(self.by_frame.get(&frame.index).cloned().unwrap_or_default())
    }
}

struct MockOcr;

impl OcrReader for MockOcr {
    fn read_text(
        &mut self,
        _image: &DynamicImage,
        _allowlist: &str,
    ) -> Result<Vec<TextRegion>, OcrError> {
        Ok(vec![TextRegion::text("ABC123", 0.95)])
    }
}

struct MockFrames {
    frames: VecDeque<Frame>,
    /// Raised once this many frames have been handed out
    abort_after: Option<(usize, Arc<AtomicBool>)>,
    handed_out: usize,
}

impl MockFrames {
    fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            abort_after: None,
            handed_out: 0,
        }
    }
}

impl FrameSource for MockFrames {
    type Error = std::io::Error;

    fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.handed_out += 1;
        }
        if let Some((limit, flag)) = &self.abort_after {
            if self.handed_out >= *limit {
                flag.store(true, Ordering::SeqCst);
            }
        }
        Ok(frame)
    }
}

struct BrokenFrames;

impl FrameSource for BrokenFrames {
    type Error = std::io::Error;

    fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
        Err(std::io::Error::other("decoder lost sync"))
    }
}

fn det(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: u32) -> Detection {
    Detection::new(x1, y1, x2, y2, score, class_id).unwrap()
}

fn assert_box_near(bbox: &BoundingBox, expected: [f32; 4]) {
    for (got, want) in bbox.to_array().iter().zip(expected) {
        assert!((got - want).abs() < 1e-3, "{bbox:?} vs {expected:?}");
    }
}

fn image_frame(index: u64) -> Frame {
    Frame::new(index, DynamicImage::ImageRgb8(RgbImage::new(320, 240)))
}

/// A car and its plate visible in frames 0 and 2. Frame 1 has no
/// detections at all.
fn car_with_gap() -> (MockDetector, MockDetector) {
    let car = det(100.0, 100.0, 200.0, 200.0, 0.9, 2);
    let plate = det(110.0, 110.0, 150.0, 130.0, 0.6, 0);

    let vehicles = MockDetector {
        by_frame: BTreeMap::from([(0, vec![car.clone()]), (2, vec![car])]),
    };
    let plates = MockDetector {
        by_frame: BTreeMap::from([(0, vec![plate.clone()]), (2, vec![plate])]),
    };
    (vehicles, plates)
}

#[test]
fn test_end_to_end_with_gap_filling() {
    let (vehicles, plates) = car_with_gap();
    let mut pipeline = PlatePipeline::new(vehicles, plates, PipelineConfig::default())
        .unwrap()
        .with_ocr(MockOcr);

    let mut source = MockFrames::new((0..3).map(image_frame));
    let mut results = FrameResults::new();
    let abort = AtomicBool::new(false);
    let summary = pipeline.run(&mut source, &mut results, &abort).unwrap();

    assert_eq!(summary.frames, 3);
    assert!(!summary.aborted);

    // Nothing detected in frame 1, so nothing recorded there.
    assert!(results.get(1).is_none_or(|r| r.is_empty()));
    for frame in [0, 2] {
        let result = results.get(frame).unwrap();
        assert_eq!(result.vehicles.keys().copied().collect::<Vec<_>>(), vec![1]);
        let record = results.record(frame, 1).unwrap();
        assert_box_near(&record.vehicle, [100.0, 100.0, 200.0, 200.0]);
        let plate = record.plate.as_ref().unwrap();
        assert_eq!(plate.bbox, BoundingBox::new(110.0, 110.0, 150.0, 130.0));
        assert_eq!(plate.text, PlateText::Read("ABC123".to_string()));
        assert!((plate.text_score - 0.95).abs() < 1e-6);
        assert!((plate.bbox_score - 0.6).abs() < 1e-6);
    }

    let filled = interpolate_gaps(&results);
    let mid = filled.record(1, 1).unwrap();
    assert!(mid.interpolated);
    assert_box_near(&mid.vehicle, [100.0, 100.0, 200.0, 200.0]);
    let mid_plate = mid.plate.as_ref().unwrap();
    assert_eq!(mid_plate.bbox, BoundingBox::new(110.0, 110.0, 150.0, 130.0));
    assert_eq!(mid_plate.text, PlateText::Read("ABC123".to_string()));

    let best = filled.best_readings();
    assert_eq!(best.len(), 1);
    assert_eq!(best[&1].text, "ABC123");
    assert_eq!(best[&1].frame, 0);
}

#[test]
fn test_csv_round_trip_on_disk() {
    let (vehicles, plates) = car_with_gap();
    let mut pipeline = PlatePipeline::new(vehicles, plates, PipelineConfig::default())
        .unwrap()
        .with_ocr(MockOcr);

    let mut results = FrameResults::new();
    let mut source = MockFrames::new((0..3).map(image_frame));
    pipeline
        .run(&mut source, &mut results, &AtomicBool::new(false))
        .unwrap();
    let filled = interpolate_gaps(&results);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test_interpolated.csv");
    write_csv_path(&filled, &path).unwrap();
    let loaded = read_csv_path(&path).unwrap();

    assert_eq!(loaded.record_count(), filled.record_count());
    for frame in 0..3 {
        let original = filled.record(frame, 1).unwrap();
        let reloaded = loaded.record(frame, 1).unwrap();
        assert_eq!(reloaded.vehicle, original.vehicle);
        assert_eq!(reloaded.plate, original.plate);
    }
}

#[test]
fn test_crops_saved_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let (vehicles, plates) = car_with_gap();
    let config = PipelineConfig {
        crop_dir: Some(dir.path().join("imagenes")),
        ..PipelineConfig::default()
    };
    let mut pipeline = PlatePipeline::new(vehicles, plates, config).unwrap();

    let result = pipeline.process_frame(&image_frame(0));
    assert_eq!(
        result.vehicles[&1].plate.as_ref().unwrap().text,
        PlateText::NoOcr
    );
    assert!(dir.path().join("imagenes/plate_frame0_car1.jpg").is_file());
}

#[test]
fn test_abort_keeps_partial_results() {
    let (vehicles, plates) = car_with_gap();
    let mut pipeline = PlatePipeline::new(vehicles, plates, PipelineConfig::default()).unwrap();

    let abort = Arc::new(AtomicBool::new(false));
    let mut source = MockFrames::new((0..3).map(Frame::without_image));
    source.abort_after = Some((1, Arc::clone(&abort)));

    let mut sink = CsvResultWriter::new(Vec::new()).unwrap();
    let summary = pipeline.run(&mut source, &mut sink, &abort).unwrap();
    assert!(summary.aborted);
    assert_eq!(summary.frames, 1);

    let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("0,1,"));
    assert!(lines[1].ends_with(",0.6,NO_OCR,0.0"));
}

#[test]
fn test_frame_source_failure_is_fatal() {
    let (vehicles, plates) = car_with_gap();
    let mut pipeline = PlatePipeline::new(vehicles, plates, PipelineConfig::default()).unwrap();
    let mut results = FrameResults::new();
    let err = pipeline
        .run(&mut BrokenFrames, &mut results, &AtomicBool::new(false))
        .unwrap_err();
    assert!(matches!(err, Error::FrameSource(_)));
}

#[test]
fn test_repeated_frame_index_rejected_by_sink() {
    let (vehicles, plates) = car_with_gap();
    let mut pipeline = PlatePipeline::new(vehicles, plates, PipelineConfig::default()).unwrap();
    let mut source = MockFrames::new([Frame::without_image(0), Frame::without_image(0)]);
    let mut results = FrameResults::new();
    let err = pipeline
        .run(&mut source, &mut results, &AtomicBool::new(false))
        .unwrap_err();
    assert!(matches!(err, Error::OutOfOrderFrame { frame: 0, last: 0 }));
}

#[test]
fn test_replay_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("detections.jsonl");
    std::fs::write(
        &path,
        concat!(
            r#"{"frame": 0, "vehicles": [{"bbox": [100, 100, 200, 200], "score": 0.9, "class_id": 2}, {"bbox": [0, 0, 50, 50], "score": 0.8, "class_id": 0}], "plates": [{"bbox": [120, 150, 160, 170], "score": 0.6}]}"#,
            "\n",
            r#"{"frame": 1, "vehicles": [{"bbox": [102, 100, 202, 200], "score": 0.9, "class_id": 2}], "plates": [{"bbox": [122, 150, 162, 170], "score": 0.7}]}"#,
            "\n",
        ),
    )
    .unwrap();

    let recording = Recording::from_path(&path).unwrap();
    let (vehicles, plates, mut frames) = recording.into_sources();
    let mut pipeline = PlatePipeline::new(vehicles, plates, PipelineConfig::default()).unwrap();

    let mut results = FrameResults::new();
    pipeline
        .run(&mut frames, &mut results, &AtomicBool::new(false))
        .unwrap();

    // The person (class 0) is never tracked, so only one identity exists.
    assert_eq!(results.len(), 2);
    assert_eq!(results.record_count(), 2);
    assert_eq!(
        results.record(1, 1).unwrap().plate.as_ref().unwrap().text,
        PlateText::NoOcr
    );
}
