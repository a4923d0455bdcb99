//! Shared data models for the VDet detection pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Detections, per-frame results and the detection log
//! - Per-class statistics
//! - Job state and progress snapshots
//! - Job options (thresholds, sampling, compression)
//! - Encoding constants

pub mod detection;
pub mod encoding;
pub mod job;
pub mod options;
pub mod statistics;

// Re-export common types
pub use detection::{BoundingBox, Detection, DetectionLogEntry, DetectionResult};
pub use encoding::EncodingConfig;
pub use job::{JobId, JobProgress, JobState};
pub use options::{AnnotationOptions, CompressionOptions, ImageOptions, JobOptions};
pub use statistics::ClassStatistics;
