//! Factory for frame sources and sinks.

use async_trait::async_trait;
use std::path::Path;
use vdet_models::EncodingConfig;

use crate::error::MediaResult;
use crate::frame::VideoProperties;
use crate::sink::{FfmpegFrameSink, FrameSink};
use crate::source::{FfmpegFrameSource, FrameSource};

/// Opens the decode and encode ends of a job.
#[async_trait]
pub trait VideoBackend: Send + Sync {
    /// Open `path` for sequential decoding.
    async fn open_source(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>>;

    /// Open an encoder writing `path` with the given geometry and rate.
    async fn open_sink(
        &self,
        path: &Path,
        properties: VideoProperties,
    ) -> MediaResult<Box<dyn FrameSink>>;
}

/// FFmpeg CLI backend.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    raw_encoding: EncodingConfig,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegBackend {
    /// Backend writing the intermediate stream as high-quality MPEG-4.
    pub fn new() -> Self {
        Self {
            raw_encoding: EncodingConfig::for_raw_output(),
        }
    }
}

#[async_trait]
impl VideoBackend for FfmpegBackend {
    async fn open_source(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>> {
        Ok(Box::new(FfmpegFrameSource::open(path).await?))
    }

    async fn open_sink(
        &self,
        path: &Path,
        properties: VideoProperties,
    ) -> MediaResult<Box<dyn FrameSink>> {
        Ok(Box::new(
            FfmpegFrameSink::create(path, properties, &self.raw_encoding).await?,
        ))
    }
}
