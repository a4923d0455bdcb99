//! Detection types produced by the detector adapter.

use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates (`x1 < x2`, `y1 < y2`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Clip the box to `[0, width] x [0, height]`.
    ///
    /// Returns `None` when nothing of the box is left inside the frame
    /// or a coordinate is not finite.
    pub fn clipped(&self, width: u32, height: u32) -> Option<Self> {
        let coords = [self.x1, self.y1, self.x2, self.y2];
        if coords.iter().any(|c| !c.is_finite()) {
            return None;
        }

        let (w, h) = (width as f32, height as f32);
        let x1 = self.x1.min(self.x2).clamp(0.0, w);
        let x2 = self.x1.max(self.x2).clamp(0.0, w);
        let y1 = self.y1.min(self.y2).clamp(0.0, h);
        let y2 = self.y1.max(self.y2).clamp(0.0, h);

        if x2 - x1 <= 0.0 || y2 - y1 <= 0.0 {
            return None;
        }
        Some(Self { x1, y1, x2, y2 })
    }

    /// Whether the box lies entirely inside a `width x height` frame.
    pub fn is_within(&self, width: u32, height: u32) -> bool {
        self.x1 >= 0.0
            && self.y1 >= 0.0
            && self.x2 <= width as f32
            && self.y2 <= height as f32
            && self.x1 < self.x2
            && self.y1 < self.y2
    }

    /// Integer location used in tabular exports: `[x1, y1, x2, y2]`.
    pub fn location_label(&self) -> String {
        format!(
            "[{}, {}, {}, {}]",
            self.x1 as i64, self.y1 as i64, self.x2 as i64, self.y2 as i64
        )
    }
}

/// A single detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Model class id
    pub class_id: usize,
    /// Human readable class name
    pub class_name: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Box in pixel coordinates, clipped to the frame
    pub bbox: BoundingBox,
}

/// All detections for one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Index of the frame the detector ran on
    pub frame_index: u64,
    /// Frame width the boxes refer to
    pub width: u32,
    /// Frame height the boxes refer to
    pub height: u32,
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn empty(frame_index: u64, width: u32, height: u32) -> Self {
        Self {
            frame_index,
            width,
            height,
            detections: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Lowest confidence in the result, if any.
    pub fn min_confidence(&self) -> Option<f32> {
        self.detections
            .iter()
            .map(|d| d.confidence)
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// One row of the detection log: appended once per detected box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionLogEntry {
    /// Class name
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
    /// Source frame index
    pub frame: u64,
    /// Seconds since the start of the video (frame / source fps)
    pub time: f64,
}

impl DetectionLogEntry {
    /// Build one log entry per detection of `result`.
    pub fn from_result(result: &DetectionResult, fps: f64) -> Vec<Self> {
        let time = frame_timestamp(result.frame_index, fps);
        result
            .detections
            .iter()
            .map(|d| Self {
                class_name: d.class_name.clone(),
                confidence: d.confidence,
                frame: result.frame_index,
                time,
            })
            .collect()
    }
}

/// Timestamp of a frame in seconds. Zero when the rate is unknown.
pub fn frame_timestamp(frame_index: u64, fps: f64) -> f64 {
    if fps > 0.0 {
        frame_index as f64 / fps
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clipping_keeps_inside_boxes() {
        let b = BoundingBox::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(b.clipped(100, 100), Some(b));
    }

    #[test]
    fn test_clipping_trims_to_frame() {
        let b = BoundingBox::new(-5.0, -3.0, 120.0, 50.0);
        let clipped = b.clipped(100, 40).unwrap();
        assert_eq!(clipped, BoundingBox::new(0.0, 0.0, 100.0, 40.0));
        assert!(clipped.is_within(100, 40));
    }

    #[test]
    fn test_clipping_drops_outside_and_degenerate() {
        assert!(BoundingBox::new(120.0, 0.0, 150.0, 10.0).clipped(100, 100).is_none());
        assert!(BoundingBox::new(10.0, 10.0, 10.0, 20.0).clipped(100, 100).is_none());
        assert!(BoundingBox::new(f32::NAN, 0.0, 5.0, 5.0).clipped(100, 100).is_none());
    }

    #[test]
    fn test_clipping_normalizes_swapped_corners() {
        let b = BoundingBox::new(30.0, 40.0, 10.0, 20.0);
        assert_eq!(b.clipped(100, 100), Some(BoundingBox::new(10.0, 20.0, 30.0, 40.0)));
    }

    #[test]
    fn test_location_label() {
        let b = BoundingBox::new(1.7, 2.2, 30.9, 40.0);
        assert_eq!(b.location_label(), "[1, 2, 30, 40]");
    }

    #[test]
    fn test_log_entries_from_result() {
        let result = DetectionResult {
            frame_index: 25,
            width: 64,
            height: 48,
            detections: vec![
                Detection {
                    class_id: 0,
                    class_name: "person".into(),
                    confidence: 0.9,
                    bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
                },
                Detection {
                    class_id: 2,
                    class_name: "car".into(),
                    confidence: 0.6,
                    bbox: BoundingBox::new(5.0, 5.0, 20.0, 20.0),
                },
            ],
        };

        let entries = DetectionLogEntry::from_result(&result, 10.0);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].frame, 25);
        assert!((entries[0].time - 2.5).abs() < 1e-9);
        assert_eq!(entries[1].class_name, "car");
        assert!((result.min_confidence().unwrap() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_frame_timestamp_unknown_rate() {
        assert_eq!(frame_timestamp(10, 0.0), 0.0);
    }
}
