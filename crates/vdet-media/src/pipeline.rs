//! Video detection pipeline.
//!
//! Runs one job through the state machine:
//!
//! ```text
//! Idle -> [Compressing] -> Detecting -> Transcoding -> Complete
//!                                               |
//!                                               +-> Cancelled
//! any fatal error -> Failed
//! ```
//!
//! A cancel signal stops the frame loop after the current frame. The
//! partial output goes through the same transcode as a finished one.
//!
//! Detection runs on every Nth frame; the frames in between are annotated
//! with the most recent successful result so the output keeps every frame
//! at the source rate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempPath;
use tracing::{debug, info, warn, Instrument};
use validator::Validate;
use vdet_models::{DetectionLogEntry, DetectionResult, JobId, JobOptions, JobState};

use crate::annotate::Annotator;
use crate::backend::{FfmpegBackend, VideoBackend};
use crate::compress::{discard_partial, Compressor, FfmpegCompressor};
use crate::detection::DetectorAdapter;
use crate::error::{MediaError, MediaResult};
use crate::job::{job_channel, JobControl, JobNotice, JobOutcome, RunningJob};
use crate::logging::JobLogger;
use crate::metrics;
use crate::sink::FrameSink;
use crate::source::FrameSource;
use crate::stats::summarize;
use crate::transcode::{FfmpegTranscoder, Transcoder};

const COMPRESSED_FILE: &str = "compressed.mp4";
const RAW_OUTPUT_FILE: &str = "annotated_raw.mp4";
const FINAL_OUTPUT_FILE: &str = "annotated.mp4";

/// How the frame loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    Exhausted,
    Cancelled,
}

/// Mutable state of one run, owned by the orchestrator.
#[derive(Default)]
struct RunState {
    /// Most recent successful detection, reused on skipped frames
    cache: Option<Arc<DetectionResult>>,
    log: Vec<DetectionLogEntry>,
    notices: Vec<JobNotice>,
    frames_read: u64,
    frames_written: u64,
    detections_run: u64,
}

/// Orchestrates decode, detection, annotation, encoding and transcoding.
pub struct VideoPipeline {
    backend: Arc<dyn VideoBackend>,
    compressor: Arc<dyn Compressor>,
    transcoder: Arc<dyn Transcoder>,
    detector: DetectorAdapter,
    annotator: Arc<Annotator>,
    work_dir: PathBuf,
}

impl VideoPipeline {
    pub fn new(
        backend: Arc<dyn VideoBackend>,
        compressor: Arc<dyn Compressor>,
        transcoder: Arc<dyn Transcoder>,
        detector: DetectorAdapter,
        annotator: Arc<Annotator>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            compressor,
            transcoder,
            detector,
            annotator,
            work_dir: work_dir.into(),
        }
    }

    /// Pipeline backed by the FFmpeg CLI for every media stage.
    ///
    /// `ffmpeg_timeout_secs` bounds the compression and transcode passes.
    pub fn ffmpeg(
        detector: DetectorAdapter,
        annotator: Annotator,
        work_dir: impl Into<PathBuf>,
        ffmpeg_timeout_secs: Option<u64>,
    ) -> Self {
        Self::new(
            Arc::new(FfmpegBackend::new()),
            Arc::new(FfmpegCompressor::new().with_timeout(ffmpeg_timeout_secs)),
            Arc::new(FfmpegTranscoder::new().with_timeout(ffmpeg_timeout_secs)),
            detector,
            Arc::new(annotator),
            work_dir,
        )
    }

    pub fn detector(&self) -> &DetectorAdapter {
        &self.detector
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Validate the options and run the job on a new task.
    pub fn spawn(self: Arc<Self>, input: PathBuf, options: JobOptions) -> MediaResult<RunningJob> {
        options.validate()?;

        let (handle, control) = job_channel(JobId::new());
        let span = JobLogger::new(handle.job_id(), "video_detection").span();
        let task = tokio::spawn(
            async move { self.run(&input, &options, control).await }.instrument(span),
        );

        Ok(RunningJob { handle, task })
    }

    /// Run one job to a terminal state. `options` must already be validated.
    ///
    /// Returns the outcome for `Complete` and `Cancelled`; fatal errors put
    /// the job in `Failed` and are returned.
    pub async fn run(&self, input: &Path, options: &JobOptions, control: JobControl) -> MediaResult<JobOutcome> {
        let started = Instant::now();
        let logger = JobLogger::new(control.job_id(), "video_detection");
        logger.started(input);

        match self.execute(input, options, &control, &logger, started).await {
            Ok(outcome) => {
                metrics::record_job_finished(outcome.state.as_str(), outcome.elapsed.as_secs_f64());
                logger.finished(&outcome);
                Ok(outcome)
            }
            Err(e) => {
                control.set_state(JobState::Failed);
                metrics::record_job_finished(
                    JobState::Failed.as_str(),
                    started.elapsed().as_secs_f64(),
                );
                logger.failed(&e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        input: &Path,
        options: &JobOptions,
        control: &JobControl,
        logger: &JobLogger,
        started: Instant,
    ) -> MediaResult<JobOutcome> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }

        let job_dir = self.work_dir.join(control.job_id().as_str());
        tokio::fs::create_dir_all(&job_dir).await?;

        let mut state = RunState::default();

        // Removed when dropped, on every exit path
        let mut compressed: Option<TempPath> = None;
        let source_path = match &options.compression {
            Some(compression) => {
                control.set_state(JobState::Compressing);
                let target = job_dir.join(COMPRESSED_FILE);
                match self.compressor.compress(input, &target, compression).await {
                    Ok(path) => {
                        compressed = Some(TempPath::try_from_path(path.clone())?);
                        path
                    }
                    Err(e) => {
                        logger.fallback("compression", &e.to_string());
                        metrics::record_fallback("compression");
                        state.notices.push(JobNotice::CompressionFallback {
                            reason: e.to_string(),
                        });
                        input.to_path_buf()
                    }
                }
            }
            None => input.to_path_buf(),
        };

        control.set_state(JobState::Detecting);
        let mut source = self.backend.open_source(&source_path).await?;
        let properties = source.properties();
        control.update(|p| p.total_frames = properties.total_frames);

        let raw_path = job_dir.join(RAW_OUTPUT_FILE);
        let mut sink = match self.backend.open_sink(&raw_path, properties).await {
            Ok(sink) => sink,
            Err(e) => {
                close_source(source.as_mut()).await;
                return Err(e);
            }
        };

        let loop_result = self
            .frame_loop(source.as_mut(), sink.as_mut(), options, control, &mut state)
            .await;
        close_source(source.as_mut()).await;

        let end = match loop_result {
            Ok(end) => end,
            Err(e) => {
                if let Err(finish_err) = sink.finish().await {
                    debug!("Output stream not finalized after failure: {}", finish_err);
                }
                return Err(e);
            }
        };

        let raw = sink.finish().await?;
        drop(compressed.take());

        if end == LoopEnd::Cancelled {
            info!(frames = state.frames_written, "Job cancelled, finalizing partial output");
        }
        let terminal = match end {
            LoopEnd::Exhausted => JobState::Complete,
            LoopEnd::Cancelled => JobState::Cancelled,
        };

        control.set_state(JobState::Transcoding);
        let final_path = job_dir.join(FINAL_OUTPUT_FILE);
        let (output, served_raw) = match self.transcoder.transcode(&raw, &final_path).await {
            Ok(path) => {
                discard_partial(&raw).await;
                (path, false)
            }
            Err(e) => {
                let reason = match e.diagnostics() {
                    Some(stderr) => format!("{}: {}", e, stderr),
                    None => e.to_string(),
                };
                logger.fallback("transcode", &reason);
                metrics::record_fallback("transcode");
                state.notices.push(JobNotice::TranscodeFallback { reason });
                (raw, true)
            }
        };
        control.set_state(terminal);

        let stats = summarize(&state.log);
        Ok(JobOutcome {
            job_id: control.job_id().clone(),
            state: terminal,
            output,
            served_raw,
            properties,
            stats,
            detection_log: state.log,
            frames_read: state.frames_read,
            frames_written: state.frames_written,
            detections_run: state.detections_run,
            notices: state.notices,
            elapsed: started.elapsed(),
        })
    }

    /// Decode, detect every Nth frame, annotate, encode.
    ///
    /// Exactly one frame is written per frame read. The cancel flag is
    /// polled after each write.
    async fn frame_loop(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        options: &JobOptions,
        control: &JobControl,
        state: &mut RunState,
    ) -> MediaResult<LoopEnd> {
        let fps = source.properties().fps;

        loop {
            let Some(frame) = source.read_next().await? else {
                return Ok(LoopEnd::Exhausted);
            };
            state.frames_read += 1;

            if options.is_detection_frame(frame.index()) {
                state.detections_run += 1;
                let detect_started = Instant::now();
                match self.detector.detect(&frame, options.confidence_threshold) {
                    Ok(result) => {
                        metrics::record_detection_run(
                            result.len(),
                            detect_started.elapsed().as_secs_f64(),
                        );
                        state.log.extend(DetectionLogEntry::from_result(&result, fps));
                        state.cache = Some(Arc::new(result));
                    }
                    Err(e) => {
                        warn!(frame = frame.index(), "Detection failed, reusing previous result: {}", e);
                        metrics::record_frame_failure("detection");
                        state.notices.push(JobNotice::DetectionFailed {
                            frame: frame.index(),
                            reason: e.to_string(),
                        });
                    }
                }
            }

            let annotated = match self
                .annotator
                .annotate(&frame, state.cache.as_deref(), options.annotation)
            {
                Ok(annotated) => annotated,
                Err(e) => {
                    warn!(frame = frame.index(), "Annotation failed, writing original frame: {}", e);
                    metrics::record_frame_failure("annotation");
                    state.notices.push(JobNotice::AnnotationFailed {
                        frame: frame.index(),
                        reason: e.to_string(),
                    });
                    frame
                }
            };

            sink.write(&annotated).await?;
            state.frames_written += 1;
            metrics::record_frame_processed();

            let (read, written, runs) = (state.frames_read, state.frames_written, state.detections_run);
            control.update(|p| {
                p.frames_read = read;
                p.frames_written = written;
                p.detections_run = runs;
            });

            if control.is_cancelled() {
                return Ok(LoopEnd::Cancelled);
            }
        }
    }
}

async fn close_source(source: &mut dyn FrameSource) {
    if let Err(e) = source.close().await {
        warn!("Failed to close frame source: {}", e);
    }
}
