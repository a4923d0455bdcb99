//! In-memory fakes for pipeline tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use tokio::sync::Semaphore;
use vdet_media::detection::{ObjectModel, RawDetection};
use vdet_media::{
    Compressor, Frame, FrameSink, FrameSource, JobHandle, MediaError, MediaResult, Transcoder,
    VideoBackend, VideoProperties,
};
use vdet_models::{BoundingBox, CompressionOptions};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;

/// Frame `i` is filled with red = `i % 256`, so models and assertions can
/// recover the index from any pixel.
pub fn source_pixel(index: u64) -> Rgb<u8> {
    Rgb([(index % 256) as u8, 0, 0])
}

pub fn properties(total_frames: u64, fps: f64) -> VideoProperties {
    VideoProperties {
        width: WIDTH,
        height: HEIGHT,
        fps,
        total_frames,
    }
}

pub struct MemorySource {
    properties: VideoProperties,
    next: u64,
    cancel_at: Option<(u64, JobHandle)>,
    closed: Arc<Mutex<bool>>,
}

#[async_trait]
impl FrameSource for MemorySource {
    fn properties(&self) -> VideoProperties {
        self.properties
    }

    async fn read_next(&mut self) -> MediaResult<Option<Frame>> {
        if self.next >= self.properties.total_frames {
            return Ok(None);
        }
        let index = self.next;
        self.next += 1;

        if let Some((at, handle)) = &self.cancel_at {
            if *at == index {
                handle.cancel();
            }
        }

        let image = RgbImage::from_pixel(WIDTH, HEIGHT, source_pixel(index));
        Ok(Some(Frame::new(index, self.properties.fps, image)))
    }

    async fn close(&mut self) -> MediaResult<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct SinkRecord {
    pub frames: Vec<Frame>,
    pub properties: Option<VideoProperties>,
    pub finished: bool,
}

pub struct MemorySink {
    path: PathBuf,
    record: Arc<Mutex<SinkRecord>>,
    written: u64,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn write(&mut self, frame: &Frame) -> MediaResult<()> {
        self.record.lock().unwrap().frames.push(frame.clone());
        self.written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> MediaResult<PathBuf> {
        std::fs::write(&self.path, format!("{} frames", self.written))?;
        self.record.lock().unwrap().finished = true;
        Ok(self.path.clone())
    }
}

/// Backend decoding synthetic frames and recording written ones.
#[derive(Default)]
pub struct MemoryBackend {
    pub frames: u64,
    pub fps: f64,
    pub cancel_at: Option<(u64, JobHandle)>,
    pub fail_open: bool,
    /// When set, opening a source waits for a permit
    pub gate: Option<Arc<Semaphore>>,
    pub opened: Mutex<Vec<PathBuf>>,
    pub sink: Arc<Mutex<SinkRecord>>,
    pub source_closed: Arc<Mutex<bool>>,
}

impl MemoryBackend {
    pub fn new(frames: u64, fps: f64) -> Self {
        Self {
            frames,
            fps,
            ..Default::default()
        }
    }

    pub fn opened_paths(&self) -> Vec<PathBuf> {
        self.opened.lock().unwrap().clone()
    }

    pub fn written(&self) -> Vec<Frame> {
        self.sink.lock().unwrap().frames.clone()
    }
}

#[async_trait]
impl VideoBackend for MemoryBackend {
    async fn open_source(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>> {
        self.opened.lock().unwrap().push(path.to_path_buf());
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| MediaError::internal(e.to_string()))?
                .forget();
        }
        if self.fail_open {
            return Err(MediaError::NoFrames(path.to_path_buf()));
        }
        Ok(Box::new(MemorySource {
            properties: properties(self.frames, self.fps),
            next: 0,
            cancel_at: self.cancel_at.clone(),
            closed: Arc::clone(&self.source_closed),
        }))
    }

    async fn open_sink(
        &self,
        path: &Path,
        properties: VideoProperties,
    ) -> MediaResult<Box<dyn FrameSink>> {
        self.sink.lock().unwrap().properties = Some(properties);
        Ok(Box::new(MemorySink {
            path: path.to_path_buf(),
            record: Arc::clone(&self.sink),
            written: 0,
        }))
    }
}

/// Model whose output is a function of the frame index.
pub struct ScriptedModel {
    script: Box<dyn Fn(u64) -> Vec<RawDetection> + Send + Sync>,
    fail_on: HashSet<u64>,
    calls: Mutex<Vec<u64>>,
}

impl ScriptedModel {
    pub fn new(script: impl Fn(u64) -> Vec<RawDetection> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            fail_on: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.fail_on.extend(frames);
        self
    }

    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().unwrap().clone()
    }
}

impl ObjectModel for ScriptedModel {
    fn infer(&self, image: &RgbImage, _threshold: f32) -> MediaResult<Vec<RawDetection>> {
        let index = u64::from(image.get_pixel(0, 0)[0]);
        self.calls.lock().unwrap().push(index);
        if self.fail_on.contains(&index) {
            return Err(MediaError::detection_failed(format!("scripted failure on {}", index)));
        }
        Ok((self.script)(index))
    }

    fn class_name(&self, class_id: usize) -> Option<&str> {
        ["person", "dog"].get(class_id).copied()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn raw(class_id: usize, confidence: f32, bbox: (f32, f32, f32, f32)) -> RawDetection {
    RawDetection {
        class_id,
        confidence,
        bbox: BoundingBox::new(bbox.0, bbox.1, bbox.2, bbox.3),
    }
}

/// Compressor that copies its input, or fails.
#[derive(Default)]
pub struct CopyCompressor {
    pub fail: bool,
    pub outputs: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl Compressor for CopyCompressor {
    async fn compress(
        &self,
        input: &Path,
        output: &Path,
        _options: &CompressionOptions,
    ) -> MediaResult<PathBuf> {
        if self.fail {
            return Err(MediaError::compression_failed("moov atom not found"));
        }
        std::fs::copy(input, output)?;
        self.outputs.lock().unwrap().push(output.to_path_buf());
        Ok(output.to_path_buf())
    }
}

/// Transcoder that copies its input, or fails like a broken encoder.
#[derive(Default)]
pub struct CopyTranscoder {
    pub fail: bool,
    /// Raw streams handed to the transcoder
    pub inputs: Arc<Mutex<Vec<PathBuf>>>,
}

impl CopyTranscoder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Transcoder for CopyTranscoder {
    async fn transcode(&self, raw: &Path, output: &Path) -> MediaResult<PathBuf> {
        self.inputs.lock().unwrap().push(raw.to_path_buf());
        if self.fail {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with status 1",
                Some("Unknown encoder 'libx264'".into()),
                Some(1),
            ));
        }
        std::fs::copy(raw, output)?;
        Ok(output.to_path_buf())
    }
}
