//! Final web-playable re-encode.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;
use vdet_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::compress::discard_partial;
use crate::error::MediaResult;

/// Re-encodes the raw annotated stream into a widely playable file.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Transcode `raw` into `output`; the raw file is left untouched.
    async fn transcode(&self, raw: &Path, output: &Path) -> MediaResult<PathBuf>;
}

/// H.264 / yuv420p / faststart transcoder backed by the FFmpeg CLI.
///
/// The exit code is the only success signal; stderr is captured into the
/// error so it can be surfaced to the user.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    encoding: EncodingConfig,
    timeout_secs: Option<u64>,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::with_encoding(EncodingConfig::for_web())
    }

    pub fn with_encoding(encoding: EncodingConfig) -> Self {
        Self {
            encoding,
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn command(&self, raw: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(raw, output).encoding(&self.encoding)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, raw: &Path, output: &Path) -> MediaResult<PathBuf> {
        info!(
            raw = %raw.display(),
            output = %output.display(),
            "Converting video to web-compatible format"
        );

        let cmd = self.command(raw, output);
        let result = FfmpegRunner::new()
            .with_timeout(self.timeout_secs)
            .run(&cmd)
            .await;
        if let Err(e) = result {
            discard_partial(output).await;
            return Err(e);
        }
        Ok(output.to_path_buf())
    }
}
