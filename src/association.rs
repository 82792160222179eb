//! Plate-to-vehicle association by strict geometric containment.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tracker::{BoundingBox, TrackedBox};

/// Tie-break used when several vehicle boxes strictly contain one plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationPolicy {
    /// First containing track in iteration order
    FirstMatch,
    /// Containing track with the smallest area; iteration order breaks equal areas
    #[default]
    SmallestContaining,
}

/// Find the vehicle identity whose box strictly contains `plate`.
///
/// Returns `None` when no track contains the plate.
pub fn assign_plate(
    plate: &BoundingBox,
    tracks: &[TrackedBox],
    policy: AssociationPolicy,
) -> Option<u64> {
    let containing: Vec<&TrackedBox> = tracks
        .iter()
        .filter(|t| t.bbox.strictly_contains(plate))
        .collect();

    let chosen = match policy {
        AssociationPolicy::FirstMatch => containing.first().copied()?,
        AssociationPolicy::SmallestContaining => containing.iter().copied().reduce(|best, t| {
            if t.bbox.area() < best.bbox.area() {
                t
            } else {
                best
            }
        })?,
    };

    if containing.len() > 1 {
        debug!(
            chosen = chosen.track_id,
            candidates = containing.len(),
            ?policy,
            "plate contained by several vehicles"
        );
    }

    Some(chosen.track_id)
}
