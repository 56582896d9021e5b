//! Pipeline configuration.

use crate::core::OcrError;
use crate::core::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CLS_IMAGE_SHAPE, DEFAULT_LIMIT_SIDE_LEN, DEFAULT_REC_IMAGE_SHAPE,
    DEFAULT_REC_MAX_WIDTH,
};
use serde::{Deserialize, Serialize};

/// Tunable parameters of the OCR pipeline.
///
/// Defaults match the values the detection and recognition models were tuned
/// for; they are the right starting point for photographs of scene text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Binarization threshold applied to the detector probability map.
    pub det_db_thresh: f32,
    /// Minimum mean probability for a detected region to survive.
    pub det_db_box_thresh: f32,
    /// Outward offset ratio applied when expanding shrunk detections.
    pub det_db_unclip_ratio: f32,
    /// Cap on the number of contours considered per image.
    pub det_max_candidates: usize,
    /// Minimum shorter-side length of a detection, in detector pixels.
    pub det_min_size: f32,
    /// Cap applied to the longer image side before detection.
    pub det_limit_side_len: u32,
    /// Whether the binary mask is dilated before contour extraction.
    pub det_use_dilation: bool,

    /// Whether crops pass through the orientation classifier.
    pub use_angle_cls: bool,
    /// Minimum "180" probability before a crop is flipped.
    pub cls_thresh: f32,
    /// Crops per orientation-classification batch.
    pub cls_batch_size: usize,
    /// Classifier input shape `[channels, height, width]`.
    pub cls_image_shape: [usize; 3],

    /// Crops per recognition batch.
    pub rec_batch_size: usize,
    /// Recognizer input shape `[channels, height, width]`.
    pub rec_image_shape: [usize; 3],
    /// Hard cap on the padded recognition batch width.
    pub rec_max_width: usize,

    /// Minimum recognition confidence for a result to be emitted.
    pub drop_score: f32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            det_db_thresh: 0.3,
            det_db_box_thresh: 0.6,
            det_db_unclip_ratio: 1.5,
            det_max_candidates: 1000,
            det_min_size: 3.0,
            det_limit_side_len: DEFAULT_LIMIT_SIDE_LEN,
            det_use_dilation: true,
            use_angle_cls: false,
            cls_thresh: 0.9,
            cls_batch_size: DEFAULT_BATCH_SIZE,
            cls_image_shape: DEFAULT_CLS_IMAGE_SHAPE,
            rec_batch_size: DEFAULT_BATCH_SIZE,
            rec_image_shape: DEFAULT_REC_IMAGE_SHAPE,
            rec_max_width: DEFAULT_REC_MAX_WIDTH,
            drop_score: 0.5,
        }
    }
}

impl OcrConfig {
    /// Validates thresholds, sizes, and shapes.
    pub fn validate(&self) -> Result<(), OcrError> {
        for (name, value) in [
            ("det_db_thresh", self.det_db_thresh),
            ("det_db_box_thresh", self.det_db_box_thresh),
            ("cls_thresh", self.cls_thresh),
            ("drop_score", self.drop_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(OcrError::config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        if self.det_db_unclip_ratio <= 0.0 {
            return Err(OcrError::config("det_db_unclip_ratio must be positive"));
        }
        if self.det_min_size <= 0.0 {
            return Err(OcrError::config("det_min_size must be positive"));
        }
        if self.det_limit_side_len == 0 {
            return Err(OcrError::config("det_limit_side_len must be positive"));
        }

        for (name, value) in [
            ("det_max_candidates", self.det_max_candidates),
            ("cls_batch_size", self.cls_batch_size),
            ("rec_batch_size", self.rec_batch_size),
            ("rec_max_width", self.rec_max_width),
        ] {
            if value == 0 {
                return Err(OcrError::config(format!("{name} must be positive")));
            }
        }

        for (name, shape) in [
            ("cls_image_shape", self.cls_image_shape),
            ("rec_image_shape", self.rec_image_shape),
        ] {
            if shape[0] != 3 || shape[1] == 0 || shape[2] == 0 {
                return Err(OcrError::config(format!(
                    "{name} must be [3, h, w] with positive dimensions, got {shape:?}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuned_values() {
        let cfg = OcrConfig::default();
        assert_eq!(cfg.det_db_thresh, 0.3);
        assert_eq!(cfg.det_db_box_thresh, 0.6);
        assert_eq!(cfg.det_db_unclip_ratio, 1.5);
        assert_eq!(cfg.det_max_candidates, 1000);
        assert_eq!(cfg.det_min_size, 3.0);
        assert_eq!(cfg.det_limit_side_len, 960);
        assert_eq!(cfg.cls_thresh, 0.9);
        assert_eq!(cfg.cls_batch_size, 6);
        assert_eq!(cfg.rec_batch_size, 6);
        assert_eq!(cfg.drop_score, 0.5);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn out_of_range_threshold_fails_validation() {
        let cfg = OcrConfig {
            drop_score: 1.5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_batch_size_fails_validation() {
        let cfg = OcrConfig {
            rec_batch_size: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = OcrConfig {
            use_angle_cls: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: OcrConfig = serde_json::from_str(&json).unwrap();
        assert!(back.use_angle_cls);
        assert_eq!(back.rec_image_shape, cfg.rec_image_shape);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let back: OcrConfig = serde_json::from_str(r#"{"drop_score": 0.7}"#).unwrap();
        assert_eq!(back.drop_score, 0.7);
        assert_eq!(back.det_db_thresh, 0.3);
    }
}
