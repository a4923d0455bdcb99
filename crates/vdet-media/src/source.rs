//! Sequential frame decoding.
//!
//! `FfmpegFrameSource` decodes a video with an FFmpeg child process writing
//! packed RGB24 frames to its stdout. Reads are strictly sequential; there is
//! no seeking.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use crate::command::check_ffmpeg;
use crate::error::{MediaError, MediaResult};
use crate::frame::{Frame, VideoProperties};
use crate::probe::probe_video;

/// A sequential source of decoded frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Geometry and timing of the stream.
    fn properties(&self) -> VideoProperties;

    /// Read the next frame; `None` once the stream is exhausted.
    async fn read_next(&mut self) -> MediaResult<Option<Frame>>;

    /// Release the underlying decoder. Safe to call more than once.
    async fn close(&mut self) -> MediaResult<()> {
        Ok(())
    }
}

/// Frame source backed by `ffmpeg -f rawvideo -pix_fmt rgb24 pipe:1`.
///
/// FFmpeg applies the stream's display rotation while decoding, so frames
/// have the display geometry reported by `probe_video`.
pub struct FfmpegFrameSource {
    path: PathBuf,
    properties: VideoProperties,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    /// First frame, decoded eagerly by `open`
    pending: Option<Frame>,
    next_index: u64,
}

impl FfmpegFrameSource {
    /// Open a video for sequential decoding.
    ///
    /// Fails with `FileNotFound`/`InvalidVideo` when the container cannot be
    /// read and with `NoFrames` when it yields no frame at all.
    pub async fn open(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref().to_path_buf();
        let info = probe_video(&path).await?;
        check_ffmpeg()?;

        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(&path)
            .args([
                "-map",
                "0:v:0",
                "-fps_mode",
                "passthrough",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg decoder: {}", e), None, None)
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg decoder stdout not captured"))?;

        // Drain stderr so the decoder never blocks on a full pipe
        if let Some(stderr) = child.stderr.take() {
            let source = path.display().to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(source = %source, "decoder: {}", line);
                }
            });
        }

        let mut source = Self {
            path,
            properties: info.properties(),
            child: Some(child),
            stdout: Some(BufReader::new(stdout)),
            pending: None,
            next_index: 0,
        };

        match source.decode_next().await? {
            Some(frame) => source.pending = Some(frame),
            None => {
                source.close().await?;
                return Err(MediaError::NoFrames(source.path.clone()));
            }
        }

        debug!(
            path = %source.path.display(),
            width = source.properties.width,
            height = source.properties.height,
            fps = source.properties.fps,
            total_frames = source.properties.total_frames,
            "Opened frame source"
        );

        Ok(source)
    }

    async fn decode_next(&mut self) -> MediaResult<Option<Frame>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        match read_frame(stdout, &self.properties, self.next_index).await? {
            Some(frame) => {
                self.next_index += 1;
                Ok(Some(frame))
            }
            None => {
                self.finish_decoder().await;
                Ok(None)
            }
        }
    }

    /// Reap the decoder after end of stream.
    async fn finish_decoder(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    warn!(
                        path = %self.path.display(),
                        exit_code = ?status.code(),
                        "Decoder exited with non-zero status"
                    );
                }
                Err(e) => warn!(path = %self.path.display(), "Failed to reap decoder: {}", e),
                _ => {}
            }
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn properties(&self) -> VideoProperties {
        self.properties
    }

    async fn read_next(&mut self) -> MediaResult<Option<Frame>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        self.decode_next().await
    }

    async fn close(&mut self) -> MediaResult<()> {
        self.stdout = None;
        self.pending = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            child.wait().await?;
        }
        Ok(())
    }
}

/// Read one packed RGB24 frame of the stream geometry.
///
/// Returns `None` at end of stream; a truncated trailing frame is dropped.
async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    properties: &VideoProperties,
    index: u64,
) -> MediaResult<Option<Frame>> {
    let frame_size = properties.frame_size();
    let mut buf = vec![0u8; frame_size];
    let filled = read_full(reader, &mut buf).await?;

    if filled < frame_size {
        if filled > 0 {
            warn!(
                frame = index,
                bytes = filled,
                expected = frame_size,
                "Discarding truncated trailing frame"
            );
        }
        return Ok(None);
    }

    Frame::from_raw(index, properties.fps, properties.width, properties.height, buf).map(Some)
}

/// Read until `buf` is full or the reader hits end of stream.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> MediaResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
