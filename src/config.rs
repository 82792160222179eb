//! Pipeline configuration, loadable from JSON.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::association::AssociationPolicy;
use crate::error::{Error, Result};
use crate::ocr::OcrConfig;
use crate::tracker::TrackerConfig;

/// COCO class ids for car, motorcycle, bus and truck.
pub const DEFAULT_VEHICLE_CLASSES: [u32; 4] = [2, 3, 5, 7];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tracker: TrackerConfig,
    pub association: AssociationPolicy,
    pub ocr: OcrConfig,
    /// Vehicle detector classes kept for tracking
    pub vehicle_classes: Vec<u32>,
    /// Record tracked vehicles even in frames where no plate was associated
    pub record_unplated_vehicles: bool,
    /// Directory to save associated plate crops into
    pub crop_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            association: AssociationPolicy::default(),
            ocr: OcrConfig::default(),
            vehicle_classes: DEFAULT_VEHICLE_CLASSES.to_vec(),
            record_unplated_vehicles: false,
            crop_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.tracker.validate()?;

        if self.vehicle_classes.is_empty() {
            return Err(Error::InvalidConfig(
                "vehicle_classes must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ocr.preprocessed_discount) {
            return Err(Error::InvalidConfig(format!(
                "ocr.preprocessed_discount must be within [0, 1], got {}",
                self.ocr.preprocessed_discount
            )));
        }
        if self.ocr.allowlist.is_empty() {
            return Err(Error::InvalidConfig(
                "ocr.allowlist must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_vehicle_class(&self, class_id: u32) -> bool {
        self.vehicle_classes.contains(&class_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{ "tracker": { "max_age": 5 }, "association": "first_match" }"#,
        )
        .unwrap();
        assert_eq!(config.tracker.max_age, 5);
        assert_eq!(config.tracker.min_hits, 3);
        assert_eq!(config.association, AssociationPolicy::FirstMatch);
        assert_eq!(config.vehicle_classes, vec![2, 3, 5, 7]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.vehicle_classes.clear();
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = PipelineConfig::default();
        config.ocr.preprocessed_discount = 1.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_vehicle_class_filter() {
        let config = PipelineConfig::default();
        assert!(config.is_vehicle_class(2));
        assert!(config.is_vehicle_class(7));
        assert!(!config.is_vehicle_class(0));
    }
}
