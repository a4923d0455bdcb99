//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; the binary decides whether a
//! recorder is installed.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const FRAMES_PROCESSED_TOTAL: &str = "vdet_frames_processed_total";
    pub const DETECTION_RUNS_TOTAL: &str = "vdet_detection_runs_total";
    pub const DETECTIONS_TOTAL: &str = "vdet_detections_total";
    pub const FRAME_FAILURES_TOTAL: &str = "vdet_frame_failures_total";
    pub const DETECTION_DURATION_SECONDS: &str = "vdet_detection_duration_seconds";
    pub const JOBS_FINISHED_TOTAL: &str = "vdet_jobs_finished_total";
    pub const JOB_DURATION_SECONDS: &str = "vdet_job_duration_seconds";
    pub const FALLBACKS_TOTAL: &str = "vdet_fallbacks_total";
}

/// Record one frame written to the output.
pub fn record_frame_processed() {
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(1);
}

/// Record a detector invocation and the boxes it kept.
pub fn record_detection_run(detections: usize, duration_secs: f64) {
    counter!(names::DETECTION_RUNS_TOTAL).increment(1);
    counter!(names::DETECTIONS_TOTAL).increment(detections as u64);
    histogram!(names::DETECTION_DURATION_SECONDS).record(duration_secs);
}

/// Record a recovered per-frame failure (`detection` or `annotation`).
pub fn record_frame_failure(stage: &'static str) {
    let labels = [("stage", stage)];
    counter!(names::FRAME_FAILURES_TOTAL, &labels).increment(1);
}

/// Record a job-level fallback (`compression` or `transcode`).
pub fn record_fallback(stage: &'static str) {
    let labels = [("stage", stage)];
    counter!(names::FALLBACKS_TOTAL, &labels).increment(1);
}

/// Record a job reaching a terminal state.
pub fn record_job_finished(state: &'static str, duration_secs: f64) {
    let labels = [("state", state)];
    counter!(names::JOBS_FINISHED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}
