//! Compression pre-pass.
//!
//! Re-encodes the source at a lower height, frame rate and quality before
//! detection to bound processing cost. Failure is never fatal to a job: the
//! caller falls back to the original source.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use vdet_models::{CompressionOptions, EncodingConfig};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Re-encodes a video into a cheaper one.
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Compress `input` into `output`; on error no partial output is left.
    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        options: &CompressionOptions,
    ) -> MediaResult<PathBuf>;
}

/// Output size for a target height, preserving aspect ratio.
///
/// Only downscales: sources no taller than `target_height` keep their size.
pub fn scaled_dimensions(width: u32, height: u32, target_height: u32) -> (u32, u32) {
    if height > target_height && target_height > 0 {
        let scaled = (f64::from(width) * f64::from(target_height) / f64::from(height)).round();
        ((scaled as u32).max(1), target_height)
    } else {
        (width, height)
    }
}

/// Round dimensions down to even values (4:2:0 chroma), never below 2.
pub fn even_dimensions((width, height): (u32, u32)) -> (u32, u32) {
    ((width - width % 2).max(2), (height - height % 2).max(2))
}

/// Compressor backed by the FFmpeg CLI.
#[derive(Debug, Default, Clone)]
pub struct FfmpegCompressor {
    timeout_secs: Option<u64>,
}

impl FfmpegCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up on FFmpeg after `secs`.
    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    async fn run(&self, input: &Path, output: &Path, options: &CompressionOptions) -> MediaResult<()> {
        let info = probe_video(input).await?;

        let (width, height) =
            even_dimensions(scaled_dimensions(info.width, info.height, options.target_height));
        let fps = options.target_fps.map(f64::from).unwrap_or(info.fps);

        info!(
            input = %input.display(),
            from = %format!("{}x{}@{:.2}", info.width, info.height, info.fps),
            to = %format!("{}x{}@{:.2}", width, height, fps),
            quality = options.quality,
            "Compressing video"
        );

        let cmd = FfmpegCommand::new(input, output)
            .video_filter(format!("scale={}:{}:flags=area", width, height))
            .frame_rate(fps)
            .encoding(&EncodingConfig::for_compression(options.quality))
            .no_audio();

        let expected_frames = info.total_frames;
        FfmpegRunner::new()
            .with_timeout(self.timeout_secs)
            .run_with_progress(&cmd, move |progress| {
                debug!(
                    frame = progress.frame,
                    percent = progress.percent_of(expected_frames),
                    remaining_secs = ?progress.remaining_secs(expected_frames),
                    speed = progress.speed,
                    "Compression progress"
                );
            })
            .await?;

        let written = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(MediaError::compression_failed("Encoder produced an empty file"));
        }
        Ok(())
    }
}

#[async_trait]
impl Compressor for FfmpegCompressor {
    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        options: &CompressionOptions,
    ) -> MediaResult<PathBuf> {
        match self.run(input, output, options).await {
            Ok(()) => Ok(output.to_path_buf()),
            Err(e) => {
                discard_partial(output).await;
                let detail = match e.diagnostics() {
                    Some(stderr) => format!("{}: {}", e, stderr),
                    None => e.to_string(),
                };
                Err(MediaError::compression_failed(detail))
            }
        }
    }
}

/// Remove a partially written output, ignoring a missing file.
pub(crate) async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Failed to remove partial output: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scaled_dimensions_downscales() {
        assert_eq!(scaled_dimensions(1920, 1080, 480), (853, 480));
        assert_eq!(scaled_dimensions(1280, 720, 360), (640, 360));
        // Display geometry of a portrait phone recording
        assert_eq!(scaled_dimensions(1080, 1920, 480), (270, 480));
    }

    #[test]
    fn test_scaled_dimensions_keeps_small_sources() {
        assert_eq!(scaled_dimensions(640, 360, 480), (640, 360));
        assert_eq!(scaled_dimensions(640, 480, 480), (640, 480));
    }

    #[test]
    fn test_scaled_dimensions_rounds() {
        // 1000 * 240 / 1080 = 222.2
        assert_eq!(scaled_dimensions(1000, 1080, 240), (222, 240));
        // 1001 * 360 / 720 = 500.5
        assert_eq!(scaled_dimensions(1001, 720, 360), (501, 360));
    }

    #[test]
    fn test_even_dimensions() {
        assert_eq!(even_dimensions((853, 480)), (852, 480));
        assert_eq!(even_dimensions((1, 1)), (2, 2));
    }

    #[tokio::test]
    async fn test_compress_unreadable_input_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("corrupt.mp4");
        let output = dir.path().join("compressed.mp4");
        tokio::fs::write(&input, b"not a video").await.unwrap();
        tokio::fs::write(&output, b"stale").await.unwrap();

        let err = FfmpegCompressor::new()
            .compress(&input, &output, &CompressionOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::CompressionFailed(_)));
        assert!(!output.exists());
    }
}
