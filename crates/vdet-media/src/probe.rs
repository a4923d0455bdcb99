//! FFprobe video information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};
use crate::frame::VideoProperties;

/// Video file information.
///
/// `width` and `height` are display dimensions: for streams carrying a
/// quarter-turn rotation they are swapped relative to the coded size, which
/// matches the frames FFmpeg decodes with autorotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Display rotation in degrees, normalized to 0, 90, 180 or 270
    #[serde(default)]
    pub rotation: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Frame count reported by the container, or estimated from the duration
    pub total_frames: u64,
    /// Video codec
    pub codec: String,
    /// File size in bytes
    pub size: u64,
}

impl VideoInfo {
    pub fn properties(&self) -> VideoProperties {
        VideoProperties {
            width: self.width,
            height: self.height,
            fps: self.fps,
            total_frames: self.total_frames,
        }
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

impl FfprobeStream {
    /// Rotation from the display matrix, falling back to the legacy tag.
    fn rotation(&self) -> u32 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| self.tags.rotate.as_ref().and_then(|r| r.trim().parse().ok()))
            .unwrap_or(0.0);
        normalize_rotation(degrees)
    }
}

/// Probe a video file for information.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::InvalidVideo(format!(
            "{}: ffprobe could not read the container",
            path.display()
        )));
    }

    parse_probe_output(&output.stdout, path)
}

/// Turn ffprobe JSON into `VideoInfo`.
fn parse_probe_output(stdout: &[u8], path: &Path) -> MediaResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    // Find video stream
    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| {
            MediaError::InvalidVideo(format!("{}: no video stream found", path.display()))
        })?;

    let coded_width = video_stream.width.unwrap_or(0);
    let coded_height = video_stream.height.unwrap_or(0);
    if coded_width == 0 || coded_height == 0 {
        return Err(MediaError::InvalidVideo(format!(
            "{}: video stream has no dimensions",
            path.display()
        )));
    }

    let rotation = video_stream.rotation();
    let (width, height) = match rotation {
        90 | 270 => (coded_height, coded_width),
        _ => (coded_width, coded_height),
    };

    let duration = video_stream
        .duration
        .as_ref()
        .or(probe.format.as_ref().and_then(|f| f.duration.as_ref()))
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size = probe
        .format
        .as_ref()
        .and_then(|f| f.size.as_ref())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    // Parse frame rate
    let fps = video_stream
        .avg_frame_rate
        .as_ref()
        .and_then(|r| parse_frame_rate(r))
        .or_else(|| {
            video_stream
                .r_frame_rate
                .as_ref()
                .and_then(|r| parse_frame_rate(r))
        })
        .unwrap_or(30.0);

    let total_frames = video_stream
        .nb_frames
        .as_ref()
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or_else(|| (duration * fps).round().max(0.0) as u64);

    Ok(VideoInfo {
        duration,
        width,
        height,
        rotation,
        fps,
        total_frames,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        size,
    })
}

/// Snap a rotation in degrees to the nearest quarter turn in `0..360`.
fn normalize_rotation(degrees: f64) -> u32 {
    if !degrees.is_finite() {
        return 0;
    }
    let quarter_turns = (degrees / 90.0).round() as i64;
    (quarter_turns.rem_euclid(4) * 90) as u32
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
///
/// Returns `None` for zero or unparseable rates ("0/0" is common for
/// streams without timing information).
fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.parse().ok()?
    };
    (rate > 0.0 && rate.is_finite()).then_some(rate)
}
