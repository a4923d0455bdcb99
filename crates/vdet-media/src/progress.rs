//! Progress of an FFmpeg encode pass, parsed from its `-progress` output.

/// Snapshot of a running compression or transcode pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EncodeProgress {
    /// Frames encoded so far
    pub frame: u64,
    /// Encoder throughput in frames per second
    pub fps: f64,
    /// Position in the output, milliseconds
    pub out_time_ms: i64,
    /// Multiple of realtime
    pub speed: f64,
    /// FFmpeg reported `progress=end`
    pub finished: bool,
}

impl EncodeProgress {
    /// Percent of `total_frames` encoded; 100 once finished.
    pub fn percent_of(&self, total_frames: u64) -> f64 {
        if self.finished {
            return 100.0;
        }
        if total_frames == 0 {
            return 0.0;
        }
        (self.frame as f64 / total_frames as f64 * 100.0).min(100.0)
    }

    /// Seconds left at the current throughput, when it can be estimated.
    pub fn remaining_secs(&self, total_frames: u64) -> Option<f64> {
        if self.finished {
            return Some(0.0);
        }
        if total_frames == 0 || self.fps <= 0.0 {
            return None;
        }
        Some(total_frames.saturating_sub(self.frame) as f64 / self.fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_of() {
        let mut progress = EncodeProgress {
            frame: 30,
            ..Default::default()
        };
        assert!((progress.percent_of(120) - 25.0).abs() < 0.01);
        assert_eq!(progress.percent_of(0), 0.0);
        assert_eq!(progress.percent_of(10), 100.0);

        progress.finished = true;
        assert_eq!(progress.percent_of(0), 100.0);
    }

    #[test]
    fn test_remaining_secs() {
        let progress = EncodeProgress {
            frame: 100,
            fps: 50.0,
            ..Default::default()
        };
        assert_eq!(progress.remaining_secs(300), Some(4.0));
        assert_eq!(progress.remaining_secs(0), None);
        assert_eq!(EncodeProgress::default().remaining_secs(300), None);
    }
}
