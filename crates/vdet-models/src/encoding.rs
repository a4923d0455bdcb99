//! Video encoding configuration.

use serde::{Deserialize, Serialize};

/// Web-playable codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default CRF (Constant Rate Factor) for the final web transcode
pub const DEFAULT_CRF: u8 = 23;
/// Pixel format with 4:2:0 chroma for maximum player compatibility
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";
/// Codec for the intermediate annotated stream (fast to write, finalizes on close)
pub const RAW_VIDEO_CODEC: &str = "mpeg4";
/// Quantizer for the intermediate annotated stream
pub const RAW_QSCALE: u8 = 2;

/// Target heights offered for the compression pre-pass
pub const TARGET_HEIGHTS: &[u32] = &[240, 360, 480, 720, 1080];
/// Allowed compression quality (CRF) range
pub const MIN_QUALITY: u8 = 18;
pub const MAX_QUALITY: u8 = 28;
/// Allowed compression frame rate range
pub const MIN_TARGET_FPS: u32 = 1;
pub const MAX_TARGET_FPS: u32 = 30;

/// Rate control for an encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "value")]
pub enum RateControl {
    /// Constant Rate Factor (lower = higher fidelity)
    Crf(u8),
    /// Fixed quantizer (lower = higher fidelity)
    Qscale(u8),
}

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264", "mpeg4")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (x264 only)
    #[serde(default)]
    pub preset: Option<String>,

    #[serde(default = "default_rate_control")]
    pub rate_control: RateControl,

    /// Output pixel format
    #[serde(default)]
    pub pixel_format: Option<String>,

    /// Move the moov atom to the front for progressive playback
    #[serde(default)]
    pub faststart: bool,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_rate_control() -> RateControl {
    RateControl::Crf(DEFAULT_CRF)
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self::for_web()
    }
}

impl EncodingConfig {
    /// H.264, CRF 23, yuv420p, faststart: the final web-playable output.
    pub fn for_web() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: Some(DEFAULT_PRESET.to_string()),
            rate_control: RateControl::Crf(DEFAULT_CRF),
            pixel_format: Some(DEFAULT_PIXEL_FORMAT.to_string()),
            faststart: true,
            extra_args: Vec::new(),
        }
    }

    /// Compression pre-pass at the requested quality.
    pub fn for_compression(quality: u8) -> Self {
        Self {
            preset: Some("veryfast".to_string()),
            rate_control: RateControl::Crf(quality),
            faststart: false,
            ..Self::for_web()
        }
    }

    /// Intermediate annotated stream written frame by frame.
    pub fn for_raw_output() -> Self {
        Self {
            codec: RAW_VIDEO_CODEC.to_string(),
            preset: None,
            rate_control: RateControl::Qscale(RAW_QSCALE),
            pixel_format: Some(DEFAULT_PIXEL_FORMAT.to_string()),
            faststart: false,
            extra_args: Vec::new(),
        }
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.codec.clone()];

        if let Some(preset) = &self.preset {
            args.extend_from_slice(&["-preset".to_string(), preset.clone()]);
        }

        match self.rate_control {
            RateControl::Crf(crf) => {
                args.extend_from_slice(&["-crf".to_string(), crf.to_string()])
            }
            RateControl::Qscale(q) => {
                args.extend_from_slice(&["-q:v".to_string(), q.to_string()])
            }
        }

        if let Some(pix_fmt) = &self.pixel_format {
            args.extend_from_slice(&["-pix_fmt".to_string(), pix_fmt.clone()]);
        }

        if self.faststart {
            args.extend_from_slice(&["-movflags".to_string(), "+faststart".to_string()]);
        }

        args.extend(self.extra_args.clone());

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_web() {
        let config = EncodingConfig::default();
        assert_eq!(config.codec, "libx264");
        assert_eq!(config.rate_control, RateControl::Crf(23));
        assert!(config.faststart);
    }

    #[test]
    fn test_web_args() {
        let args = EncodingConfig::for_web().to_ffmpeg_args();
        assert_eq!(
            args,
            vec![
                "-c:v", "libx264", "-preset", "fast", "-crf", "23", "-pix_fmt", "yuv420p",
                "-movflags", "+faststart"
            ]
        );
    }

    #[test]
    fn test_raw_output_uses_qscale() {
        let args = EncodingConfig::for_raw_output().to_ffmpeg_args();
        assert!(args.contains(&"mpeg4".to_string()));
        assert!(args.contains(&"-q:v".to_string()));
        assert!(!args.contains(&"-crf".to_string()));
        assert!(!args.contains(&"-preset".to_string()));
    }

    #[test]
    fn test_compression_quality() {
        let args = EncodingConfig::for_compression(27).to_ffmpeg_args();
        assert!(args.contains(&"27".to_string()));
        assert!(!args.contains(&"+faststart".to_string()));
    }
}
