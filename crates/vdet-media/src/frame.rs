//! Decoded frames and stream geometry.

use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use vdet_models::detection::frame_timestamp;

use crate::error::{MediaError, MediaResult};

/// Geometry and timing of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoProperties {
    pub width: u32,
    pub height: u32,
    /// Source frame rate
    pub fps: f64,
    /// Frame count reported by the container (0 when unknown)
    pub total_frames: u64,
}

impl VideoProperties {
    /// Size in bytes of one RGB24 frame.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// An immutable RGB24 frame with its position in the stream.
///
/// The pixel buffer is shared; producing a modified frame always copies it.
#[derive(Debug, Clone)]
pub struct Frame {
    index: u64,
    timestamp: f64,
    image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(index: u64, fps: f64, image: RgbImage) -> Self {
        Self {
            index,
            timestamp: frame_timestamp(index, fps),
            image: Arc::new(image),
        }
    }

    /// Build a frame from packed RGB24 bytes.
    pub fn from_raw(index: u64, fps: f64, width: u32, height: u32, data: Vec<u8>) -> MediaResult<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(MediaError::internal(format!(
                "Invalid frame data length: expected {}, got {}",
                expected,
                data.len()
            )));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| MediaError::internal("Failed to create frame buffer"))?;
        Ok(Self::new(index, fps, image))
    }

    /// A frame at the same position carrying different pixels.
    pub fn with_image(&self, image: RgbImage) -> Self {
        Self {
            index: self.index,
            timestamp: self.timestamp,
            image: Arc::new(image),
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Seconds since the start of the stream.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Packed RGB24 bytes.
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Whether both frames share the same pixel buffer.
    pub fn shares_buffer(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}
