//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};
use vdet_models::EncodingConfig;

use crate::error::{MediaError, MediaResult};
use crate::progress::EncodeProgress;

/// Number of diagnostic stderr lines kept for error reports.
const MAX_DIAGNOSTIC_LINES: usize = 40;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    /// Add input arguments (before -i).
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Declare a raw RGB24 input of the given geometry (used with `-` input).
    pub fn raw_rgb_input(self, width: u32, height: u32, fps: f64) -> Self {
        self.input_args([
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-s".to_string(),
            format!("{}x{}", width, height),
            "-r".to_string(),
            format_rate(fps),
        ])
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set output frame rate.
    pub fn frame_rate(self, fps: f64) -> Self {
        self.output_arg("-r").output_arg(format_rate(fps))
    }

    /// Apply an encoding configuration.
    pub fn encoding(self, config: &EncodingConfig) -> Self {
        self.output_args(config.to_ffmpeg_args())
    }

    /// Drop audio streams.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        // Overwrite, errors only
        let mut args = vec!["-y".to_string(), "-v".to_string(), "error".to_string()];

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        // Input args
        args.extend(self.input_args.clone());

        // Input file
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        // Output args
        args.extend(self.output_args.clone());

        // Output file
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Format a frame rate for FFmpeg (`30` or `29.970`).
pub(crate) fn format_rate(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as u64)
    } else {
        format!("{:.3}", fps)
    }
}

/// Runner for FFmpeg commands with progress tracking and an optional
/// timeout.
pub struct FfmpegRunner {
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { timeout_secs: None }
    }

    /// Kill FFmpeg after `secs`; `None` waits indefinitely.
    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with progress callback.
    ///
    /// Non-progress stderr lines are kept and attached to the error when
    /// FFmpeg exits with a non-zero status.
    pub async fn run_with_progress<F>(
        &self,
        cmd: &FfmpegCommand,
        progress_callback: F,
    ) -> MediaResult<()>
    where
        F: Fn(EncodeProgress) + Send + 'static,
    {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;
        let mut reader = BufReader::new(stderr).lines();
        let diagnostics = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&diagnostics);

        // Spawn progress parsing task
        let progress_handle = tokio::spawn(async move {
            let mut current_progress = EncodeProgress::default();

            while let Ok(Some(line)) = reader.next_line().await {
                if is_progress_line(&line) {
                    if let Some(progress) = apply_progress_line(&line, &mut current_progress) {
                        progress_callback(progress);
                    }
                } else if let Ok(mut lines) = sink.lock() {
                    if lines.len() == MAX_DIAGNOSTIC_LINES {
                        lines.remove(0);
                    }
                    lines.push(line);
                }
            }
        });

        // Wait for completion with optional timeout
        let result = self.wait_for_completion(&mut child).await;

        // Wait for progress task to complete
        let _ = progress_handle.await;

        match result {
            Err(MediaError::FfmpegFailed {
                message, exit_code, ..
            }) => {
                let stderr = diagnostics
                    .lock()
                    .map(|lines| lines.join("\n"))
                    .unwrap_or_default();
                Err(MediaError::ffmpeg_failed(
                    message,
                    (!stderr.is_empty()).then_some(stderr),
                    exit_code,
                ))
            }
            other => other,
        }
    }

    /// Wait for child process with timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<()> {
        let timeout = async {
            match self.timeout_secs {
                Some(secs) => tokio::time::sleep(std::time::Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = timeout => {
                let secs = self.timeout_secs.unwrap_or_default();
                warn!("FFmpeg timed out after {} seconds, killing process", secs);
                let _ = child.kill().await;
                return Err(MediaError::ffmpeg_failed(
                    format!("FFmpeg timed out after {} seconds", secs),
                    None,
                    None,
                ));
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                None,
                status.code(),
            ))
        }
    }
}

/// Keys FFmpeg writes with `-progress`.
fn is_progress_line(line: &str) -> bool {
    const KEYS: &[&str] = &[
        "frame", "fps", "stream_0_0_q", "bitrate", "total_size", "out_time_us",
        "out_time_ms", "out_time", "dup_frames", "drop_frames", "speed", "progress",
    ];
    line.trim()
        .split_once('=')
        .map(|(key, _)| KEYS.contains(&key) || key.starts_with("stream_"))
        .unwrap_or(false)
}

/// Fold one `-progress` line into `current`; returns a snapshot at the end
/// of each block.
fn apply_progress_line(line: &str, current: &mut EncodeProgress) -> Option<EncodeProgress> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // Both keys carry microseconds
        "out_time_us" | "out_time_ms" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => current.frame = value.parse().unwrap_or(current.frame),
        "fps" => current.fps = value.parse().unwrap_or(current.fps),
        "speed" => {
            // "1.5x" or "N/A"
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            current.finished = value == "end";
            return Some(*current);
        }
        _ => {}
    }
    None
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .encoding(&EncodingConfig::for_web())
            .no_audio();

        let args = cmd.build_args();
        assert_eq!(args[..3], ["-y", "-v", "error"]);
        assert!(args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args.last().unwrap(), "output.mp4");
    }

    #[test]
    fn test_raw_input_precedes_input_flag() {
        let cmd = FfmpegCommand::new("-", "out.mp4").raw_rgb_input(640, 360, 29.97);
        let args = cmd.build_args();

        let size = args.iter().position(|a| a == "640x360").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(size < input);
        assert!(args.contains(&"29.970".to_string()));
        assert!(args.contains(&"rgb24".to_string()));
    }

    #[test]
    fn test_encoding_args_follow_input() {
        let cmd = FfmpegCommand::new("in.mp4", "out.mp4").encoding(&EncodingConfig::for_web());
        let args = cmd.build_args();
        let input = args.iter().position(|a| a == "-i").unwrap();
        let codec = args.iter().position(|a| a == "libx264").unwrap();
        assert!(codec > input);
        assert!(args.contains(&"+faststart".to_string()));
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(30.0), "30");
        assert_eq!(format_rate(29.97), "29.970");
    }

    #[test]
    fn test_progress_block() {
        let mut progress = EncodeProgress::default();

        assert!(apply_progress_line("frame=48", &mut progress).is_none());
        apply_progress_line("out_time_us=5000000", &mut progress);
        apply_progress_line("speed=1.5x", &mut progress);
        apply_progress_line("speed=N/A", &mut progress);

        let snapshot = apply_progress_line("progress=continue", &mut progress).unwrap();
        assert_eq!(snapshot.frame, 48);
        assert_eq!(snapshot.out_time_ms, 5000);
        assert!((snapshot.speed - 1.5).abs() < 0.01);
        assert!(!snapshot.finished);

        let last = apply_progress_line("progress=end", &mut progress).unwrap();
        assert!(last.finished);
    }

    #[test]
    fn test_progress_line_detection() {
        assert!(is_progress_line("frame=120"));
        assert!(is_progress_line("stream_0_0_q=28.0"));
        assert!(!is_progress_line("Unknown encoder 'libx265'"));
        assert!(!is_progress_line("[mp4 @ 0x55] width=3 not divisible"));
    }
}
