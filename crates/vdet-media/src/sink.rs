//! Annotated output stream.
//!
//! `FfmpegFrameSink` feeds packed RGB24 frames to an FFmpeg encoder over its
//! stdin. Closing stdin lets FFmpeg finalize the container, so a sink that
//! is finished early (cancellation) still leaves a playable file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info};
use vdet_models::EncodingConfig;

use crate::command::{check_ffmpeg, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::frame::{Frame, VideoProperties};

/// A sequential consumer of output frames.
#[async_trait]
pub trait FrameSink: Send {
    /// Append one frame to the output.
    async fn write(&mut self, frame: &Frame) -> MediaResult<()>;

    /// Flush and finalize the output, returning its path.
    async fn finish(&mut self) -> MediaResult<PathBuf>;
}

/// Frame sink backed by an FFmpeg encoder reading rawvideo from stdin.
pub struct FfmpegFrameSink {
    path: PathBuf,
    properties: VideoProperties,
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    diagnostics: Arc<Mutex<Vec<String>>>,
    frames_written: u64,
}

impl FfmpegFrameSink {
    /// Start an encoder writing `path` at the source geometry and frame rate.
    pub async fn create(
        path: impl AsRef<Path>,
        properties: VideoProperties,
        encoding: &EncodingConfig,
    ) -> MediaResult<Self> {
        let path = path.as_ref().to_path_buf();
        check_ffmpeg().map_err(|e| MediaError::output_stream(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    MediaError::output_stream(format!("{}: {}", parent.display(), e))
                })?;
            }
        }

        let args = output_command(&path, &properties, encoding).build_args();
        debug!("Running FFmpeg encoder: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::output_stream(format!("Failed to spawn encoder: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::output_stream("Encoder stdin not captured"))?;

        let diagnostics = Arc::new(Mutex::new(Vec::new()));
        if let Some(stderr) = child.stderr.take() {
            let sink = Arc::clone(&diagnostics);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    // Progress output is noise here
                    if line.contains('=') && !line.contains(' ') {
                        continue;
                    }
                    if let Ok(mut lines) = sink.lock() {
                        lines.push(line);
                    }
                }
            });
        }

        info!(
            path = %path.display(),
            width = properties.width,
            height = properties.height,
            fps = properties.fps,
            "Opened output stream"
        );

        Ok(Self {
            path,
            properties,
            child: Some(child),
            stdin: Some(BufWriter::new(stdin)),
            diagnostics,
            frames_written: 0,
        })
    }

    fn stderr_text(&self) -> Option<String> {
        self.diagnostics
            .lock()
            .ok()
            .map(|lines| lines.join("\n"))
            .filter(|s| !s.is_empty())
    }
}

/// Build the encoder command for a raw RGB24 stdin stream.
fn output_command(path: &Path, properties: &VideoProperties, encoding: &EncodingConfig) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new("-", path).raw_rgb_input(
        properties.width,
        properties.height,
        properties.fps,
    );

    // 4:2:0 output needs even dimensions
    if properties.width % 2 == 1 || properties.height % 2 == 1 {
        cmd = cmd.video_filter("pad=ceil(iw/2)*2:ceil(ih/2)*2");
    }

    cmd.encoding(encoding).no_audio().frame_rate(properties.fps)
}

#[async_trait]
impl FrameSink for FfmpegFrameSink {
    async fn write(&mut self, frame: &Frame) -> MediaResult<()> {
        if frame.width() != self.properties.width || frame.height() != self.properties.height {
            return Err(MediaError::output_stream(format!(
                "Frame {} is {}x{}, output stream expects {}x{}",
                frame.index(),
                frame.width(),
                frame.height(),
                self.properties.width,
                self.properties.height
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::output_stream("Output stream already finished"))?;

        if let Err(e) = stdin.write_all(frame.as_raw()).await {
            let detail = self.stderr_text().unwrap_or_default();
            return Err(MediaError::output_stream(format!(
                "Failed to write frame {}: {} {}",
                frame.index(),
                e,
                detail
            )));
        }

        self.frames_written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> MediaResult<PathBuf> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin
                .flush()
                .await
                .map_err(|e| MediaError::output_stream(format!("Failed to flush encoder: {}", e)))?;
            stdin
                .shutdown()
                .await
                .map_err(|e| MediaError::output_stream(format!("Failed to close encoder: {}", e)))?;
        }

        if let Some(mut child) = self.child.take() {
            let status = child.wait().await?;
            if !status.success() {
                return Err(MediaError::output_stream(format!(
                    "Encoder exited with status {:?}: {}",
                    status.code(),
                    self.stderr_text().unwrap_or_default()
                )));
            }
        }

        debug!(
            path = %self.path.display(),
            frames = self.frames_written,
            "Output stream finalized"
        );
        Ok(self.path.clone())
    }
}
