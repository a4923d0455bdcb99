//! User-facing job options.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::encoding::{
    MAX_QUALITY, MAX_TARGET_FPS, MIN_QUALITY, MIN_TARGET_FPS, TARGET_HEIGHTS,
};

/// Default confidence threshold.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;
/// Upper bound offered by the UI for "process every Nth frame".
pub const MAX_FRAME_STRIDE: u32 = 10;

/// Drawing options for the annotator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationOptions {
    /// Draw the class name next to each box
    #[serde(default = "default_true")]
    pub show_labels: bool,
    /// Draw the confidence (two decimals) next to each box
    #[serde(default = "default_true")]
    pub show_confidence: bool,
}

impl Default for AnnotationOptions {
    fn default() -> Self {
        Self {
            show_labels: true,
            show_confidence: true,
        }
    }
}

/// Compression pre-pass settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CompressionOptions {
    /// Target height; width follows the aspect ratio
    #[validate(custom(function = "validate_target_height"))]
    #[serde(default = "default_target_height")]
    pub target_height: u32,

    /// Target frame rate; `None` keeps the source rate
    #[validate(range(min = MIN_TARGET_FPS, max = MAX_TARGET_FPS))]
    #[serde(default = "default_target_fps")]
    pub target_fps: Option<u32>,

    /// CRF value, lower is better quality
    #[validate(range(min = MIN_QUALITY, max = MAX_QUALITY))]
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            target_height: default_target_height(),
            target_fps: default_target_fps(),
            quality: default_quality(),
        }
    }
}

/// Options for one detection job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct JobOptions {
    /// Minimum confidence for a detection to be kept
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,

    #[serde(default)]
    pub annotation: AnnotationOptions,

    /// Run detection on frames whose index is divisible by this value
    #[validate(range(min = 1))]
    #[serde(default = "default_stride")]
    pub process_every_nth_frame: u32,

    /// Compression pre-pass; `None` processes the source as is
    #[validate(nested)]
    #[serde(default)]
    pub compression: Option<CompressionOptions>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE,
            annotation: AnnotationOptions::default(),
            process_every_nth_frame: default_stride(),
            compression: Some(CompressionOptions::default()),
        }
    }
}

impl JobOptions {
    /// Whether frame `index` is sampled for detection.
    pub fn is_detection_frame(&self, index: u64) -> bool {
        index % u64::from(self.process_every_nth_frame.max(1)) == 0
    }
}

/// Options for single-image detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct ImageOptions {
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,

    #[serde(default)]
    pub annotation: AnnotationOptions,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE,
            annotation: AnnotationOptions::default(),
        }
    }
}

impl From<&JobOptions> for ImageOptions {
    fn from(options: &JobOptions) -> Self {
        Self {
            confidence_threshold: options.confidence_threshold,
            annotation: options.annotation,
        }
    }
}

fn validate_target_height(height: u32) -> Result<(), ValidationError> {
    if TARGET_HEIGHTS.contains(&height) {
        Ok(())
    } else {
        Err(ValidationError::new("unsupported_target_height"))
    }
}

fn default_true() -> bool {
    true
}
fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}
fn default_stride() -> u32 {
    1
}
fn default_target_height() -> u32 {
    480
}
fn default_target_fps() -> Option<u32> {
    Some(15)
}
fn default_quality() -> u8 {
    23
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = JobOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.process_every_nth_frame, 1);
        assert_eq!(options.compression.unwrap().target_height, 480);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let options = JobOptions {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = JobOptions {
            process_every_nth_frame: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_compression() {
        let bad_height = JobOptions {
            compression: Some(CompressionOptions {
                target_height: 500,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(bad_height.validate().is_err());

        let bad_quality = JobOptions {
            compression: Some(CompressionOptions {
                quality: 40,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(bad_quality.validate().is_err());

        let bad_fps = JobOptions {
            compression: Some(CompressionOptions {
                target_fps: Some(60),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(bad_fps.validate().is_err());

        let keep_fps = JobOptions {
            compression: Some(CompressionOptions {
                target_fps: None,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(keep_fps.validate().is_ok());
    }

    #[test]
    fn test_target_height_choices() {
        for &target_height in TARGET_HEIGHTS {
            let options = CompressionOptions {
                target_height,
                ..Default::default()
            };
            assert!(options.validate().is_ok(), "{} rejected", target_height);
        }

        let errors = CompressionOptions {
            target_height: 481,
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        let fields = errors.field_errors();
        assert_eq!(fields["target_height"][0].code, "unsupported_target_height");
    }

    #[test]
    fn test_image_options_from_job() {
        let job = JobOptions {
            confidence_threshold: 0.3,
            ..Default::default()
        };
        let image = ImageOptions::from(&job);
        assert_eq!(image.confidence_threshold, 0.3);
        assert!(image.validate().is_ok());
        assert!(ImageOptions {
            confidence_threshold: -0.1,
            ..Default::default()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_detection_frame_sampling() {
        let options = JobOptions {
            process_every_nth_frame: 5,
            ..Default::default()
        };
        let sampled: Vec<u64> = (0..12).filter(|i| options.is_detection_frame(*i)).collect();
        assert_eq!(sampled, vec![0, 5, 10]);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let options: JobOptions =
            serde_json::from_str(r#"{"process_every_nth_frame": 3}"#).unwrap();
        assert_eq!(options.process_every_nth_frame, 3);
        assert!((options.confidence_threshold - 0.5).abs() < 1e-6);
        assert!(options.compression.is_none());
        assert!(options.annotation.show_labels);
    }
}
