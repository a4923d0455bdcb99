//! Job identity, state machine states and progress snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a video detection job.
///
/// ```text
/// Idle -> Compressing -> Detecting -> Transcoding -> Complete
///                                             |
///                                             +-> Cancelled
/// any -> Failed
/// ```
///
/// A cancel signal ends the frame loop early; the partial output is still
/// transcoded and the job ends in `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Idle,
    /// Optional pre-pass re-encoding the source
    Compressing,
    /// Frame loop: decode, detect, annotate, encode
    Detecting,
    /// Final web-playable re-encode
    Transcoding,
    /// Finished; output is usable
    Complete,
    /// Stopped by the user; partial output is usable
    Cancelled,
    /// Unrecoverable error; output (if any) is unusable
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Compressing => "compressing",
            JobState::Detecting => "detecting",
            JobState::Transcoding => "transcoding",
            JobState::Complete => "complete",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Complete | JobState::Cancelled | JobState::Failed
        )
    }

    /// Whether a job in this state is currently running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobState::Compressing | JobState::Detecting | JobState::Transcoding
        )
    }

    /// Whether the output produced in this state can be served.
    pub fn has_usable_output(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Cancelled)
    }

    /// Whether `self -> next` is an edge of the job state machine.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Idle, Compressing) | (Idle, Detecting) => true,
            (Compressing, Detecting) => true,
            (Detecting, Transcoding) => true,
            (Transcoding, Complete) | (Transcoding, Cancelled) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of a running job, published to observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub state: JobState,
    /// Frames decoded from the source so far
    pub frames_read: u64,
    /// Frames written to the annotated output so far
    pub frames_written: u64,
    /// Detector invocations so far
    pub detections_run: u64,
    /// Total frames reported by the container (0 when unknown)
    pub total_frames: u64,
}

impl JobProgress {
    /// Progress percentage of the frame loop (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        ((self.frames_written as f64 / self.total_frames as f64) * 100.0).min(100.0)
    }
}
