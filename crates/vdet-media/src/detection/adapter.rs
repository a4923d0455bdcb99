//! Detector adapter around a raw model backend.

use std::sync::Arc;

use image::RgbImage;
use tracing::trace;
use vdet_models::{BoundingBox, Detection, DetectionResult};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// A detection as reported by the model, before any guarantees apply.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub confidence: f32,
    /// Pixel coordinates of the input image; may exceed its bounds
    pub bbox: BoundingBox,
}

/// Raw object-detection backend.
///
/// Implementations receive RGB frames and may already apply the threshold;
/// the adapter enforces it again either way.
pub trait ObjectModel: Send + Sync {
    /// Run the model on one RGB image.
    fn infer(&self, image: &RgbImage, confidence_threshold: f32) -> MediaResult<Vec<RawDetection>>;

    /// Name of a class id, if the model knows it.
    fn class_name(&self, class_id: usize) -> Option<&str>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Stateless wrapper that turns model output into a `DetectionResult`.
///
/// Guarantees for every returned detection:
/// - `confidence >= threshold` and finite
/// - box clipped to the frame, with positive width and height
#[derive(Clone)]
pub struct DetectorAdapter {
    model: Arc<dyn ObjectModel>,
}

impl DetectorAdapter {
    pub fn new(model: Arc<dyn ObjectModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Detect objects in a frame.
    pub fn detect(&self, frame: &Frame, confidence_threshold: f32) -> MediaResult<DetectionResult> {
        let detections = self.detect_image(frame.image(), confidence_threshold)?;
        Ok(DetectionResult {
            frame_index: frame.index(),
            width: frame.width(),
            height: frame.height(),
            detections,
        })
    }

    /// Detect objects in a still image.
    pub fn detect_image(&self, image: &RgbImage, confidence_threshold: f32) -> MediaResult<Vec<Detection>> {
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(MediaError::detection_failed(format!(
                "Confidence threshold {} outside [0, 1]",
                confidence_threshold
            )));
        }

        let (width, height) = image.dimensions();
        let raw = self.model.infer(image, confidence_threshold)?;
        let reported = raw.len();

        let detections: Vec<Detection> = raw
            .into_iter()
            .filter(|d| d.confidence.is_finite() && d.confidence >= confidence_threshold)
            .filter_map(|d| {
                let bbox = d.bbox.clipped(width, height)?;
                Some(Detection {
                    class_id: d.class_id,
                    class_name: self.resolve_class_name(d.class_id),
                    confidence: d.confidence.min(1.0),
                    bbox,
                })
            })
            .collect();

        trace!(
            model = self.model.name(),
            reported,
            kept = detections.len(),
            "Detector adapter filtered model output"
        );

        Ok(detections)
    }

    /// Class name from the model, or `Class {id}` when unknown.
    pub fn resolve_class_name(&self, class_id: usize) -> String {
        self.model
            .class_name(class_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Class {}", class_id))
    }
}

impl std::fmt::Debug for DetectorAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorAdapter")
            .field("model", &self.model.name())
            .finish()
    }
}
