//! CLI configuration, read from the environment.

use std::path::PathBuf;

use vdet_media::detection::{load_class_names, ObjectDetectorConfig, Precision};
use vdet_media::MediaResult;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root for per-job scratch directories
    pub work_dir: PathBuf,
    /// YOLOv8 ONNX model
    pub model_path: PathBuf,
    /// Optional class-names file, one name per line; COCO when unset
    pub class_names_path: Option<PathBuf>,
    /// TrueType font for label text; labels are drawn as bars without it
    pub font_path: Option<PathBuf>,
    pub precision: Precision,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Upper bound for one compression or transcode pass
    pub ffmpeg_timeout_secs: Option<u64>,
    /// Emit JSON log lines
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("vdet"),
            model_path: ObjectDetectorConfig::default().model_path,
            class_names_path: None,
            font_path: None,
            precision: Precision::Full,
            nms_threshold: ObjectDetectorConfig::default().nms_threshold,
            ffmpeg_timeout_secs: None,
            log_json: false,
        }
    }
}

impl AppConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup; unset or unparsable values keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            work_dir: lookup("VDET_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            model_path: lookup("VDET_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            class_names_path: lookup("VDET_CLASS_NAMES").map(PathBuf::from),
            font_path: lookup("VDET_FONT_PATH").map(PathBuf::from),
            precision: lookup("VDET_PRECISION")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.precision),
            nms_threshold: lookup("VDET_NMS_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .filter(|t: &f32| (0.0..=1.0).contains(t))
                .unwrap_or(defaults.nms_threshold),
            ffmpeg_timeout_secs: lookup("VDET_FFMPEG_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0),
            log_json: lookup("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.log_json),
        }
    }

    /// Detector configuration, loading the class-names file if one is set.
    pub fn detector_config(&self) -> MediaResult<ObjectDetectorConfig> {
        let mut config = ObjectDetectorConfig::default()
            .with_model_path(self.model_path.clone())
            .with_precision(self.precision);
        config.nms_threshold = self.nms_threshold;
        if let Some(path) = &self.class_names_path {
            config = config.with_class_names(load_class_names(path)?);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[]));
        assert_eq!(config.model_path, PathBuf::from("models/yolov8n.onnx"));
        assert_eq!(config.precision, Precision::Full);
        assert!((config.nms_threshold - 0.45).abs() < 1e-6);
        assert!(config.class_names_path.is_none());
        assert!(!config.log_json);
    }

    #[test]
    fn test_values_from_lookup() {
        let config = AppConfig::from_lookup(lookup(&[
            ("VDET_WORK_DIR", "/tmp/jobs"),
            ("VDET_MODEL_PATH", "/models/custom.onnx"),
            ("VDET_PRECISION", "fp16"),
            ("VDET_NMS_THRESHOLD", "0.6"),
            ("VDET_FONT_PATH", "/fonts/DejaVuSans.ttf"),
            ("VDET_FFMPEG_TIMEOUT_SECS", "600"),
            ("LOG_FORMAT", "JSON"),
        ]));
        assert_eq!(config.work_dir, PathBuf::from("/tmp/jobs"));
        assert_eq!(config.model_path, PathBuf::from("/models/custom.onnx"));
        assert_eq!(config.precision, Precision::Half);
        assert!((config.nms_threshold - 0.6).abs() < 1e-6);
        assert_eq!(config.font_path, Some(PathBuf::from("/fonts/DejaVuSans.ttf")));
        assert_eq!(config.ffmpeg_timeout_secs, Some(600));
        assert!(config.log_json);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            ("VDET_PRECISION", "int8"),
            ("VDET_NMS_THRESHOLD", "1.5"),
            ("VDET_FFMPEG_TIMEOUT_SECS", "0"),
        ]));
        assert_eq!(config.precision, Precision::Full);
        assert!((config.nms_threshold - 0.45).abs() < 1e-6);
        assert_eq!(config.ffmpeg_timeout_secs, None);
    }

    #[test]
    fn test_detector_config_loads_class_names() {
        let dir = tempfile::tempdir().unwrap();
        let names = dir.path().join("classes.txt");
        std::fs::write(&names, "cat\n\ndog\n").unwrap();

        let config = AppConfig {
            class_names_path: Some(names),
            ..AppConfig::default()
        };
        let detector = config.detector_config().unwrap();
        assert_eq!(detector.class_names, vec!["cat", "dog"]);
    }
}
