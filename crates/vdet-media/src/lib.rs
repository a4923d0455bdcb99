#![deny(unreachable_patterns)]
//! FFmpeg-backed object-detection video pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a cancellable runner
//! - Sequential RGB frame decoding and encoding over FFmpeg pipes
//! - An optional compression pre-pass and a web-playable final transcode
//! - YOLOv8 detection on ONNX Runtime behind a narrow model trait
//! - Frame annotation, per-class statistics and CSV/JSON exports
//! - The job state machine, cooperative cancellation and session state

pub mod annotate;
pub mod backend;
pub mod command;
pub mod compress;
pub mod detection;
pub mod error;
pub mod export;
pub mod frame;
pub mod image_job;
pub mod job;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod session;
pub mod sink;
pub mod source;
pub mod stats;
pub mod transcode;

pub use annotate::{label_text, Annotator};
pub use backend::{FfmpegBackend, VideoBackend};
pub use command::{FfmpegCommand, FfmpegRunner};
pub use compress::{scaled_dimensions, Compressor, FfmpegCompressor};
pub use detection::{
    ColorOrder, DetectorAdapter, ObjectDetector, ObjectDetectorConfig, ObjectModel, Precision,
    RawDetection,
};
pub use error::{MediaError, MediaResult};
pub use export::{detections_to_json, image_detections_to_csv, stats_to_csv};
pub use frame::{Frame, VideoProperties};
pub use image_job::{detect_image, ImageReport};
pub use job::{job_channel, JobControl, JobHandle, JobNotice, JobOutcome, RunningJob};
pub use logging::JobLogger;
pub use pipeline::VideoPipeline;
pub use probe::{probe_video, VideoInfo};
pub use progress::EncodeProgress;
pub use session::DetectionSession;
pub use sink::{FfmpegFrameSink, FrameSink};
pub use source::{FfmpegFrameSource, FrameSource};
pub use stats::summarize;
pub use transcode::{FfmpegTranscoder, Transcoder};
