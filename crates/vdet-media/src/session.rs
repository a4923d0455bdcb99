//! Interactive session state.
//!
//! Holds everything a front end needs between interactions: the running
//! job (at most one), the last outcome, its processing time and the
//! playback sync offset used to compare original and annotated video.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use vdet_models::{JobOptions, JobState};

use crate::error::{MediaError, MediaResult};
use crate::job::{JobHandle, JobOutcome, RunningJob};
use crate::pipeline::VideoPipeline;

#[derive(Debug, Default)]
pub struct DetectionSession {
    current: Option<JobHandle>,
    last_outcome: Option<JobOutcome>,
    processing_time: Option<Duration>,
    sync_time: f64,
}

impl DetectionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a video job; rejected while another one is running.
    pub fn start(
        &mut self,
        pipeline: &Arc<VideoPipeline>,
        input: PathBuf,
        options: JobOptions,
    ) -> MediaResult<RunningJob> {
        self.ensure_idle()?;
        let job = Arc::clone(pipeline).spawn(input, options)?;
        info!(job_id = %job.handle.job_id(), "Session started job");
        self.current = Some(job.handle.clone());
        Ok(job)
    }

    /// Track a job started elsewhere; rejected while another one is running.
    pub fn attach(&mut self, handle: JobHandle) -> MediaResult<()> {
        self.ensure_idle()?;
        self.current = Some(handle);
        Ok(())
    }

    fn ensure_idle(&self) -> MediaResult<()> {
        if self.is_running() {
            return Err(MediaError::JobAlreadyRunning);
        }
        Ok(())
    }

    /// Whether a job has been started and has not reached a terminal state.
    pub fn is_running(&self) -> bool {
        self.current
            .as_ref()
            .map(|handle| !handle.state().is_terminal())
            .unwrap_or(false)
    }

    /// State of the current job, `Idle` when there is none.
    pub fn state(&self) -> JobState {
        self.current
            .as_ref()
            .map(JobHandle::state)
            .unwrap_or_default()
    }

    pub fn current(&self) -> Option<&JobHandle> {
        self.current.as_ref()
    }

    /// Request cancellation of the running job. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match &self.current {
            Some(handle) if !handle.state().is_terminal() => {
                handle.cancel();
                true
            }
            _ => false,
        }
    }

    /// Record the outcome of the finished job.
    pub fn finish(&mut self, outcome: JobOutcome) {
        debug!(job_id = %outcome.job_id, state = %outcome.state, "Session finished job");
        self.processing_time = Some(outcome.elapsed);
        self.last_outcome = Some(outcome);
        self.current = None;
        self.sync_time = self.clamp_sync_time(self.sync_time);
    }

    /// Forget a job that ended without an outcome (failed).
    pub fn clear_failed(&mut self) {
        if !self.is_running() {
            self.current = None;
        }
    }

    pub fn last_outcome(&self) -> Option<&JobOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn processing_time(&self) -> Option<Duration> {
        self.processing_time
    }

    /// Playback position both players start from, in seconds.
    pub fn sync_time(&self) -> f64 {
        self.sync_time
    }

    /// Set the playback sync offset, clamped to `[0, duration]` of the last
    /// outcome. Returns the value stored.
    pub fn set_sync_time(&mut self, seconds: f64) -> f64 {
        self.sync_time = self.clamp_sync_time(seconds);
        self.sync_time
    }

    fn clamp_sync_time(&self, seconds: f64) -> f64 {
        let duration = self
            .last_outcome
            .as_ref()
            .map(JobOutcome::video_duration)
            .unwrap_or(0.0);
        if seconds.is_nan() {
            return 0.0;
        }
        seconds.clamp(0.0, duration.max(0.0))
    }

    /// Clear the outcome, sync time and processing time for the next video.
    ///
    /// A running job stays tracked.
    pub fn reset(&mut self) {
        self.last_outcome = None;
        self.processing_time = None;
        self.sync_time = 0.0;
        if !self.is_running() {
            self.current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::VideoProperties;
    use crate::job::job_channel;
    use std::collections::BTreeMap;
    use vdet_models::JobId;

    fn outcome(frames: u64, fps: f64) -> JobOutcome {
        JobOutcome {
            job_id: JobId::new(),
            state: JobState::Complete,
            output: PathBuf::from("annotated.mp4"),
            served_raw: false,
            properties: VideoProperties {
                width: 64,
                height: 48,
                fps,
                total_frames: frames,
            },
            stats: BTreeMap::new(),
            detection_log: Vec::new(),
            frames_read: frames,
            frames_written: frames,
            detections_run: frames,
            notices: Vec::new(),
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn test_rejects_second_active_job() {
        let mut session = DetectionSession::new();
        let (first, control) = job_channel(JobId::new());
        session.attach(first).unwrap();
        assert!(session.is_running());

        let (second, _control2) = job_channel(JobId::new());
        assert!(matches!(
            session.attach(second.clone()),
            Err(MediaError::JobAlreadyRunning)
        ));

        control.set_state(JobState::Detecting);
        control.set_state(JobState::Failed);
        assert!(!session.is_running());
        session.attach(second).unwrap();
    }

    #[test]
    fn test_cancel_reaches_running_job() {
        let mut session = DetectionSession::new();
        assert!(!session.cancel());

        let (handle, control) = job_channel(JobId::new());
        session.attach(handle).unwrap();
        assert!(session.cancel());
        assert!(control.is_cancelled());
    }

    #[test]
    fn test_finish_records_outcome() {
        let mut session = DetectionSession::new();
        let (handle, control) = job_channel(JobId::new());
        session.attach(handle).unwrap();
        control.set_state(JobState::Detecting);
        control.set_state(JobState::Transcoding);
        control.set_state(JobState::Cancelled);

        session.finish(outcome(100, 10.0));
        assert_eq!(session.processing_time(), Some(Duration::from_millis(1500)));
        assert!(session.current().is_none());
        assert_eq!(session.state(), JobState::Idle);
    }

    #[test]
    fn test_sync_time_is_clamped() {
        let mut session = DetectionSession::new();
        assert_eq!(session.set_sync_time(5.0), 0.0);

        session.finish(outcome(100, 10.0));
        assert_eq!(session.set_sync_time(4.0), 4.0);
        assert_eq!(session.set_sync_time(25.0), 10.0);
        assert_eq!(session.set_sync_time(-3.0), 0.0);
        assert_eq!(session.set_sync_time(f64::NAN), 0.0);
    }

    #[test]
    fn test_reset_clears_results() {
        let mut session = DetectionSession::new();
        session.finish(outcome(20, 10.0));
        session.set_sync_time(1.0);

        session.reset();
        assert!(session.last_outcome().is_none());
        assert!(session.processing_time().is_none());
        assert_eq!(session.sync_time(), 0.0);
    }
}
