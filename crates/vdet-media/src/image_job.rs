//! Single-image detection.

use std::collections::BTreeMap;
use std::path::Path;

use image::RgbImage;
use serde::Serialize;
use tracing::info;
use validator::Validate;
use vdet_models::{Detection, ImageOptions};

use crate::annotate::Annotator;
use crate::detection::DetectorAdapter;
use crate::error::{MediaError, MediaResult};
use crate::export::image_detections_to_csv;

/// One row of the image detection table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDetectionRow {
    /// 1-based
    pub id: usize,
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]`
    pub location: String,
}

/// Detections and annotated copy of one image.
#[derive(Debug, Clone)]
pub struct ImageReport {
    pub detections: Vec<Detection>,
    pub annotated: RgbImage,
}

impl ImageReport {
    pub fn rows(&self) -> Vec<ImageDetectionRow> {
        self.detections
            .iter()
            .enumerate()
            .map(|(i, d)| ImageDetectionRow {
                id: i + 1,
                class_name: d.class_name.clone(),
                confidence: d.confidence,
                location: d.bbox.location_label(),
            })
            .collect()
    }

    /// Number of detections per class.
    pub fn class_counts(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for d in &self.detections {
            *counts.entry(d.class_name.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn to_csv(&self) -> String {
        image_detections_to_csv(&self.detections)
    }

    /// Write the annotated image; the format follows the extension.
    pub fn save_annotated(&self, path: &Path) -> MediaResult<()> {
        self.annotated.save(path)?;
        Ok(())
    }
}

/// Load an image, detect objects once and annotate a copy.
pub fn detect_image(
    path: &Path,
    detector: &DetectorAdapter,
    annotator: &Annotator,
    options: &ImageOptions,
) -> MediaResult<ImageReport> {
    options.validate()?;
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    let image = image::open(path)?.to_rgb8();
    detect_rgb_image(image, detector, annotator, options)
}

/// Detect and annotate an already decoded image.
pub fn detect_rgb_image(
    image: RgbImage,
    detector: &DetectorAdapter,
    annotator: &Annotator,
    options: &ImageOptions,
) -> MediaResult<ImageReport> {
    let detections = detector.detect_image(&image, options.confidence_threshold)?;

    let mut annotated = image;
    annotator.draw(&mut annotated, &detections, options.annotation);

    info!(
        width = annotated.width(),
        height = annotated.height(),
        detections = detections.len(),
        "Image detection completed"
    );

    Ok(ImageReport {
        detections,
        annotated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{ObjectModel, RawDetection};
    use std::sync::Arc;
    use tempfile::TempDir;
    use vdet_models::BoundingBox;

    struct TwoDogs;

    impl ObjectModel for TwoDogs {
        fn infer(&self, _image: &RgbImage, _threshold: f32) -> MediaResult<Vec<RawDetection>> {
            Ok(vec![
                RawDetection {
                    class_id: 16,
                    confidence: 0.9,
                    bbox: BoundingBox::new(2.0, 2.0, 20.0, 20.0),
                },
                RawDetection {
                    class_id: 16,
                    confidence: 0.6,
                    bbox: BoundingBox::new(25.0, 5.0, 60.0, 30.0),
                },
                RawDetection {
                    class_id: 0,
                    confidence: 0.2,
                    bbox: BoundingBox::new(0.0, 0.0, 5.0, 5.0),
                },
            ])
        }

        fn class_name(&self, class_id: usize) -> Option<&str> {
            crate::detection::COCO_CLASSES.get(class_id).copied()
        }

        fn name(&self) -> &str {
            "two-dogs"
        }
    }

    fn detector() -> DetectorAdapter {
        DetectorAdapter::new(Arc::new(TwoDogs))
    }

    #[test]
    fn test_detect_rgb_image() {
        let report = detect_rgb_image(
            RgbImage::new(64, 48),
            &detector(),
            &Annotator::new(),
            &ImageOptions::default(),
        )
        .unwrap();

        assert_eq!(report.detections.len(), 2);
        assert_eq!(report.class_counts().get("dog"), Some(&2));

        let rows = report.rows();
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[1].location, "[25, 5, 60, 30]");
        assert!(report.to_csv().starts_with("ID,Class,Confidence,Location\n1,dog,0.90,"));
    }

    #[test]
    fn test_detect_image_round_trips_file() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.png");
        RgbImage::new(64, 48).save(&input).unwrap();

        let report = detect_image(&input, &detector(), &Annotator::new(), &ImageOptions::default()).unwrap();
        let output = dir.path().join("annotated.png");
        report.save_annotated(&output).unwrap();

        let saved = image::open(&output).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (64, 48));
        assert_ne!(saved, RgbImage::new(64, 48));
    }

    #[test]
    fn test_detect_image_missing_file() {
        let err = detect_image(
            Path::new("/no/such/image.jpg"),
            &detector(),
            &Annotator::new(),
            &ImageOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
