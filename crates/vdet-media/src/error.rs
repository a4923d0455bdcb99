//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
///
/// Fatal to a job: `FileNotFound`, `InvalidVideo`, `NoFrames`, `OutputStream`,
/// `Io`. Everything else is recovered by the pipeline with a fallback.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Video has no readable frames: {0}")]
    NoFrames(PathBuf),

    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    #[error("Object detection failed: {0}")]
    DetectionFailed(String),

    #[error("Annotation failed: {0}")]
    AnnotationFailed(String),

    #[error("Output stream error: {0}")]
    OutputStream(String),

    #[error("A detection job is already running")]
    JobAlreadyRunning,

    #[error("Invalid job options: {0}")]
    InvalidOptions(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Create an annotation failure error.
    pub fn annotation_failed(message: impl Into<String>) -> Self {
        Self::AnnotationFailed(message.into())
    }

    /// Create a compression failure error.
    pub fn compression_failed(message: impl Into<String>) -> Self {
        Self::CompressionFailed(message.into())
    }

    /// Create an output stream error.
    pub fn output_stream(message: impl Into<String>) -> Self {
        Self::OutputStream(message.into())
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the input could not be opened at all.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound(_) | Self::InvalidVideo(_) | Self::NoFrames(_)
        )
    }

    /// Diagnostic output captured from an external tool, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::FfmpegFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors() {
        assert!(MediaError::NoFrames(PathBuf::from("a.mp4")).is_input_error());
        assert!(MediaError::InvalidVideo("x".into()).is_input_error());
        assert!(!MediaError::output_stream("disk full").is_input_error());
    }

    #[test]
    fn test_diagnostics() {
        let err = MediaError::ffmpeg_failed("boom", Some("Unknown encoder".into()), Some(1));
        assert_eq!(err.diagnostics(), Some("Unknown encoder"));
        assert!(MediaError::JobAlreadyRunning.diagnostics().is_none());
        assert_eq!(err.to_string(), "FFmpeg command failed: boom");
    }
}
