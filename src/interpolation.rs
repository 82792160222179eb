//! Fill frames where a tracked vehicle was not recorded.

use std::collections::BTreeMap;

use tracing::debug;

use crate::results::{FrameResult, FrameResults, PlateReading, VehicleRecord};

/// Linearly interpolate each vehicle across the frames missing between two
/// of its recorded frames.
///
/// Vehicle boxes are always interpolated. Plate boxes are interpolated only
/// when both surrounding records carry a plate; the text and scores are copied
/// from the earlier one. Nothing is synthesized before a vehicle's first or
/// after its last recorded frame.
pub fn interpolate_gaps(results: &FrameResults) -> FrameResults {
    let mut per_vehicle: BTreeMap<u64, Vec<(u64, &VehicleRecord)>> = BTreeMap::new();
    for result in results.iter() {
        for (&vehicle_id, record) in &result.vehicles {
            per_vehicle
                .entry(vehicle_id)
                .or_default()
                .push((result.frame, record));
        }
    }

    let mut frames: BTreeMap<u64, FrameResult> = results
        .iter()
        .map(|r| (r.frame, r.clone()))
        .collect();

    let mut synthesized = 0usize;
    for (vehicle_id, history) in &per_vehicle {
        for pair in history.windows(2) {
            let (f0, start) = pair[0];
            let (f1, end) = pair[1];
            if f1 <= f0 + 1 {
                continue;
            }

            let span = (f1 - f0) as f32;
            for frame in (f0 + 1)..f1 {
                let t = (frame - f0) as f32 / span;
                let record = VehicleRecord {
                    vehicle: start.vehicle.lerp(&end.vehicle, t),
                    plate: interpolate_plate(start.plate.as_ref(), end.plate.as_ref(), t),
                    interpolated: true,
                };
                frames
                    .entry(frame)
                    .or_insert_with(|| FrameResult::new(frame))
                    .vehicles
                    .insert(*vehicle_id, record);
                synthesized += 1;
            }
        }
    }

    debug!(
        vehicles = per_vehicle.len(),
        synthesized, "gap interpolation finished"
    );
    FrameResults::from_frames(frames.into_values())
}

fn interpolate_plate(
    start: Option<&PlateReading>,
    end: Option<&PlateReading>,
    t: f32,
) -> Option<PlateReading> {
    let (start, end) = (start?, end?);
    Some(PlateReading {
        bbox: start.bbox.lerp(&end.bbox, t),
        bbox_score: start.bbox_score,
        text: start.text.clone(),
        text_score: start.text_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::PlateText;
    use crate::tracker::BoundingBox;

    fn record(bbox: [f32; 4], plate: Option<PlateReading>) -> VehicleRecord {
        VehicleRecord::observed(BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3]), plate)
    }

    fn plate(bbox: [f32; 4], text: &str) -> PlateReading {
        PlateReading {
            bbox: BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3]),
            bbox_score: 0.7,
            text: PlateText::Read(text.to_string()),
            text_score: 0.9,
        }
    }

    fn frame_with(frame: u64, id: u64, rec: VehicleRecord) -> FrameResult {
        let mut result = FrameResult::new(frame);
        result.vehicles.insert(id, rec);
        result
    }

    #[test]
    fn test_midpoint_and_no_extrapolation() {
        let results = FrameResults::from_frames(vec![
            frame_with(10, 7, record([0.0, 0.0, 10.0, 10.0], None)),
            frame_with(12, 7, record([0.0, 0.0, 20.0, 20.0], None)),
        ]);
        let filled = interpolate_gaps(&results);

        let mid = filled.record(11, 7).unwrap();
        assert_eq!(mid.vehicle, BoundingBox::new(0.0, 0.0, 15.0, 15.0));
        assert!(mid.interpolated);
        assert!(mid.plate.is_none());

        assert!(filled.get(9).is_none());
        assert!(filled.get(13).is_none());
        assert!(!filled.record(10, 7).unwrap().interpolated);
    }

    #[test]
    fn test_plate_copied_from_earlier_frame() {
        let results = FrameResults::from_frames(vec![
            frame_with(
                0,
                1,
                record([0.0, 0.0, 100.0, 100.0], Some(plate([10.0, 10.0, 30.0, 20.0], "ABC123"))),
            ),
            frame_with(
                4,
                1,
                record([40.0, 0.0, 140.0, 100.0], Some(plate([50.0, 10.0, 70.0, 20.0], "ABC128"))),
            ),
        ]);
        let filled = interpolate_gaps(&results);
        assert_eq!(filled.len(), 5);

        let rec = filled.record(1, 1).unwrap();
        assert_eq!(rec.vehicle, BoundingBox::new(10.0, 0.0, 110.0, 100.0));
        let p = rec.plate.as_ref().unwrap();
        assert_eq!(p.bbox, BoundingBox::new(20.0, 10.0, 40.0, 20.0));
        assert_eq!(p.text, PlateText::Read("ABC123".to_string()));
        assert_eq!(p.text_score, 0.9);
    }

    #[test]
    fn test_vehicles_interpolated_independently() {
        let mut f0 = FrameResult::new(0);
        f0.vehicles.insert(1, record([0.0, 0.0, 10.0, 10.0], None));
        f0.vehicles.insert(2, record([50.0, 50.0, 60.0, 60.0], None));
        let f1 = frame_with(1, 2, record([50.0, 50.0, 60.0, 60.0], None));
        let f3 = frame_with(3, 1, record([0.0, 0.0, 10.0, 10.0], None));

        let filled = interpolate_gaps(&FrameResults::from_frames(vec![f0, f1, f3]));

        // Vehicle 1 fills 1 and 2; vehicle 2 has no gap and no extrapolation.
        assert!(filled.record(1, 1).unwrap().interpolated);
        assert!(filled.record(2, 1).unwrap().interpolated);
        assert!(!filled.record(1, 2).unwrap().interpolated);
        assert!(filled.record(2, 2).is_none());
        assert!(filled.record(3, 2).is_none());
    }

    #[test]
    fn test_empty_results() {
        assert!(interpolate_gaps(&FrameResults::new()).is_empty());
    }
}
