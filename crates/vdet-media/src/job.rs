//! Job handles, notices and outcomes.
//!
//! A job publishes its state and counters on a `watch` channel and reads a
//! cancel flag from another. The orchestrator holds the `JobControl` end,
//! observers hold cloned `JobHandle`s.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;
use vdet_models::{ClassStatistics, DetectionLogEntry, JobId, JobProgress, JobState};

use crate::error::{MediaError, MediaResult};
use crate::frame::VideoProperties;

/// A recovered failure, shown to the user without stopping the job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobNotice {
    /// Compression failed; the original source was processed
    CompressionFallback { reason: String },
    /// Detection failed on one frame; the previous result was reused
    DetectionFailed { frame: u64, reason: String },
    /// Annotation failed on one frame; it was written unannotated
    AnnotationFailed { frame: u64, reason: String },
    /// Transcoding failed; the raw annotated file is served
    TranscodeFallback { reason: String },
}

impl fmt::Display for JobNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CompressionFallback { reason } => {
                write!(f, "Compression failed, using original video: {}", reason)
            }
            Self::DetectionFailed { frame, reason } => {
                write!(f, "Error processing frame {}: {}", frame, reason)
            }
            Self::AnnotationFailed { frame, reason } => {
                write!(f, "Error annotating frame {}: {}", frame, reason)
            }
            Self::TranscodeFallback { reason } => {
                write!(f, "Error converting video, serving raw output: {}", reason)
            }
        }
    }
}

/// Result of a job that produced usable output.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    /// `Complete` or `Cancelled`
    pub state: JobState,
    /// File to serve
    pub output: PathBuf,
    /// Whether `output` is the untranscoded intermediate stream
    pub served_raw: bool,
    /// Geometry and rate of the processed stream
    pub properties: VideoProperties,
    pub stats: BTreeMap<String, ClassStatistics>,
    pub detection_log: Vec<DetectionLogEntry>,
    pub frames_read: u64,
    pub frames_written: u64,
    pub detections_run: u64,
    pub notices: Vec<JobNotice>,
    pub elapsed: Duration,
}

impl JobOutcome {
    /// Duration in seconds of the processed video.
    pub fn video_duration(&self) -> f64 {
        if self.properties.fps <= 0.0 {
            return 0.0;
        }
        let frames = self.properties.total_frames.max(self.frames_read);
        frames as f64 / self.properties.fps
    }

    /// Total detections across all classes.
    pub fn total_detections(&self) -> u64 {
        self.stats.values().map(|s| s.count).sum()
    }
}

/// Observer and cancel end of a job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_id: JobId,
    cancel_tx: Arc<watch::Sender<bool>>,
    progress_rx: watch::Receiver<JobProgress>,
}

impl JobHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Request cooperative cancellation; observed between frames.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancel_requested(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Latest progress snapshot.
    pub fn progress(&self) -> JobProgress {
        self.progress_rx.borrow().clone()
    }

    pub fn state(&self) -> JobState {
        self.progress_rx.borrow().state
    }

    /// A receiver for awaiting progress changes.
    pub fn subscribe(&self) -> watch::Receiver<JobProgress> {
        self.progress_rx.clone()
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait_terminal(&self) -> JobState {
        let mut rx = self.progress_rx.clone();
        let state = match rx.wait_for(|p| p.state.is_terminal()).await {
            Ok(progress) => progress.state,
            // Orchestrator dropped without a terminal update
            Err(_) => JobState::Failed,
        };
        state
    }
}

/// Orchestrator end of a job.
#[derive(Debug)]
pub struct JobControl {
    job_id: JobId,
    cancel_rx: watch::Receiver<bool>,
    progress_tx: watch::Sender<JobProgress>,
}

impl JobControl {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    pub fn state(&self) -> JobState {
        self.progress_tx.borrow().state
    }

    /// Move the job to `next`, warning on edges outside the state machine.
    pub fn set_state(&self, next: JobState) {
        self.progress_tx.send_modify(|progress| {
            if !progress.state.can_transition_to(next) {
                warn!(
                    job_id = %self.job_id,
                    from = %progress.state,
                    to = %next,
                    "Unexpected job state transition"
                );
            }
            progress.state = next;
        });
    }

    /// Update the counters of the current snapshot.
    pub fn update(&self, f: impl FnOnce(&mut JobProgress)) {
        self.progress_tx.send_modify(f);
    }
}

/// Create the two ends of a job in the `Idle` state.
pub fn job_channel(job_id: JobId) -> (JobHandle, JobControl) {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (progress_tx, progress_rx) = watch::channel(JobProgress::default());
    (
        JobHandle {
            job_id: job_id.clone(),
            cancel_tx: Arc::new(cancel_tx),
            progress_rx,
        },
        JobControl {
            job_id,
            cancel_rx,
            progress_tx,
        },
    )
}

/// A spawned job: its handle plus the task producing the outcome.
#[derive(Debug)]
pub struct RunningJob {
    pub handle: JobHandle,
    pub task: JoinHandle<MediaResult<JobOutcome>>,
}

impl RunningJob {
    /// Wait for the job task to finish.
    pub async fn wait(self) -> MediaResult<JobOutcome> {
        self.task
            .await
            .map_err(|e| MediaError::internal(format!("Job task failed: {}", e)))?
    }
}
