//! Job-scoped logging.

use std::path::Path;

use tracing::{error, info, warn, Span};
use vdet_models::JobId;

use crate::error::MediaError;
use crate::job::JobOutcome;

/// Logs job lifecycle events with the job id and operation attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    operation: &'static str,
}

impl JobLogger {
    /// `operation` names the kind of job, e.g. `video_detection`.
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.clone(),
            operation,
        }
    }

    pub fn started(&self, input: &Path) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            input = %input.display(),
            "Job started"
        );
    }

    /// A stage failed and the job continues with its fallback.
    pub fn fallback(&self, stage: &str, reason: &str) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            stage,
            "{} failed, continuing with fallback: {}", stage, reason
        );
    }

    pub fn failed(&self, err: &MediaError) {
        error!(
            job_id = %self.job_id,
            operation = self.operation,
            input_error = err.is_input_error(),
            "Job failed: {}", err
        );
    }

    pub fn finished(&self, outcome: &JobOutcome) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            state = %outcome.state,
            frames = outcome.frames_written,
            detection_runs = outcome.detections_run,
            detections = outcome.total_detections(),
            served_raw = outcome.served_raw,
            elapsed_secs = outcome.elapsed.as_secs_f64(),
            "Job finished"
        );
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Span carrying the job fields, for instrumenting the job future.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, operation = self.operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_fields() {
        let job_id = JobId::from_string("job-7");
        let logger = JobLogger::new(&job_id, "video_detection");

        assert_eq!(logger.job_id().as_str(), "job-7");
        assert_eq!(logger.operation(), "video_detection");
    }
}
