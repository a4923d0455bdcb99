//! Object detection.
//!
//! | Layer | Responsibility |
//! |-------|----------------|
//! | `ObjectModel` | Raw model backend (ONNX Runtime YOLOv8, test fakes) |
//! | `DetectorAdapter` | Threshold enforcement, clipping, class names |

pub mod adapter;
pub mod object_detector;

pub use adapter::{DetectorAdapter, ObjectModel, RawDetection};
pub use object_detector::{
    load_class_names, ColorOrder, ObjectDetector, ObjectDetectorConfig, Precision, COCO_CLASSES,
};
