//! VDet command line.
//!
//! Runs object detection on a video or a single image and writes the
//! annotated media plus CSV/JSON reports.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vdet_media::command::{check_ffmpeg, check_ffprobe};
use vdet_media::image_job::detect_image;
use vdet_media::{
    detections_to_json, probe_video, stats_to_csv, Annotator, DetectionSession, DetectorAdapter,
    JobHandle, JobOutcome, ObjectDetector, VideoPipeline,
};
use vdet_models::encoding::DEFAULT_CRF;
use vdet_models::{
    AnnotationOptions, CompressionOptions, ImageOptions, JobId, JobOptions, JobState,
};

use crate::config::AppConfig;

const VIDEO_OUTPUT_FILE: &str = "processed_video.mp4";
const VIDEO_STATS_FILE: &str = "video_detection_results.csv";
const VIDEO_LOG_FILE: &str = "video_detections.json";
const IMAGE_OUTPUT_FILE: &str = "annotated_image.png";
const IMAGE_CSV_FILE: &str = "detection_results.csv";

#[derive(Parser)]
#[command(name = "vdet")]
#[command(about = "Object detection for videos and images", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// ONNX model path (overrides VDET_MODEL_PATH)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Scratch directory for job files (overrides VDET_WORK_DIR)
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(clap::Args)]
struct DrawArgs {
    /// Minimum confidence for a detection to be kept
    #[arg(long, short, default_value_t = 0.5)]
    confidence: f32,

    /// Do not draw class names
    #[arg(long)]
    hide_labels: bool,

    /// Do not draw confidence values
    #[arg(long)]
    hide_confidence: bool,
}

impl DrawArgs {
    fn annotation(&self) -> AnnotationOptions {
        AnnotationOptions {
            show_labels: !self.hide_labels,
            show_confidence: !self.hide_confidence,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Detect objects in a video
    Video {
        /// Input video
        input: PathBuf,

        /// Directory for the annotated video and reports
        #[arg(long, short, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        draw: DrawArgs,

        /// Run detection on every Nth frame
        #[arg(long, short = 'n', default_value_t = 1)]
        every_nth: u32,

        /// Process the original video without the compression pre-pass
        #[arg(long)]
        no_compress: bool,

        /// Compression target height
        #[arg(long, default_value_t = 480)]
        height: u32,

        /// Compression target frame rate; omit to keep the source rate
        #[arg(long)]
        fps: Option<u32>,

        /// Compression CRF, lower is better
        #[arg(long, default_value_t = DEFAULT_CRF)]
        quality: u8,

        /// Also write the per-detection log as JSON
        #[arg(long)]
        json: bool,
    },
    /// Detect objects in a single image
    Image {
        /// Input image
        input: PathBuf,

        /// Directory for the annotated image and CSV
        #[arg(long, short, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        draw: DrawArgs,
    },
    /// Show video metadata
    Probe {
        input: PathBuf,
    },
    /// Verify FFmpeg and the model are available
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env();
    if let Some(model) = cli.model {
        config.model_path = model;
    }
    if let Some(work_dir) = cli.work_dir {
        config.work_dir = work_dir;
    }
    config.log_json |= cli.log_json;

    init_tracing(config.log_json);

    match cli.command {
        Commands::Video {
            input,
            output_dir,
            draw,
            every_nth,
            no_compress,
            height,
            fps,
            quality,
            json,
        } => {
            let options = JobOptions {
                confidence_threshold: draw.confidence,
                annotation: draw.annotation(),
                process_every_nth_frame: every_nth,
                compression: (!no_compress).then_some(CompressionOptions {
                    target_height: height,
                    target_fps: fps,
                    quality,
                }),
            };
            run_video(&config, input, &output_dir, options, json).await
        }
        Commands::Image {
            input,
            output_dir,
            draw,
        } => {
            let options = ImageOptions {
                confidence_threshold: draw.confidence,
                annotation: draw.annotation(),
            };
            run_image(&config, &input, &output_dir, &options)
        }
        Commands::Probe { input } => {
            let info = probe_video(&input).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Commands::Check => run_check(&config),
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("vdet=info,vdet_media=info,ort=warn")
    });

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}

fn build_detector(config: &AppConfig) -> Result<DetectorAdapter> {
    let detector_config = config.detector_config()?;
    let detector = ObjectDetector::new(detector_config)
        .with_context(|| format!("Failed to load model {}", config.model_path.display()))?;
    Ok(DetectorAdapter::new(Arc::new(detector)))
}

fn build_annotator(config: &AppConfig) -> Result<Annotator> {
    match &config.font_path {
        Some(path) => Annotator::from_font_file(path)
            .with_context(|| format!("Failed to load font {}", path.display())),
        None => {
            warn!("VDET_FONT_PATH not set, labels are drawn without text");
            Ok(Annotator::new())
        }
    }
}

async fn run_video(
    config: &AppConfig,
    input: PathBuf,
    output_dir: &Path,
    options: JobOptions,
    write_json: bool,
) -> Result<()> {
    let detector = build_detector(config)?;
    let annotator = build_annotator(config)?;
    let pipeline = Arc::new(VideoPipeline::ffmpeg(
        detector,
        annotator,
        config.work_dir.clone(),
        config.ffmpeg_timeout_secs,
    ));

    let mut session = DetectionSession::new();
    let job = session.start(&pipeline, input, options)?;
    let handle = job.handle.clone();

    let reporter = tokio::spawn(report_progress(handle.clone()));
    let cancel_handle = handle.clone();
    let ctrl_c = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, stopping after the current frame");
            cancel_handle.cancel();
        }
    });

    let result = job.wait().await;
    ctrl_c.abort();
    reporter.abort();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            session.clear_failed();
            remove_job_dir(&config.work_dir, handle.job_id()).await;
            if e.is_input_error() {
                error!(job_id = %handle.job_id(), "Could not read the input video: {}", e);
            } else {
                error!(job_id = %handle.job_id(), "Video processing failed: {}", e);
            }
            return Err(e.into());
        }
    };
    session.finish(outcome.clone());

    write_video_artifacts(&outcome, output_dir, write_json).await?;
    remove_job_dir(&config.work_dir, &outcome.job_id).await;
    print_video_summary(&outcome, &session);
    Ok(())
}

/// Log state changes and every tenth of progress.
async fn report_progress(handle: JobHandle) {
    let mut rx = handle.subscribe();
    let mut last_state = JobState::Idle;
    let mut last_decile = 0u64;

    while rx.changed().await.is_ok() {
        let progress = rx.borrow_and_update().clone();
        if progress.state != last_state {
            info!(state = %progress.state, "Job state changed");
            last_state = progress.state;
        }
        let decile = (progress.percentage() / 10.0) as u64;
        if decile > last_decile {
            info!(
                frames = progress.frames_written,
                total = progress.total_frames,
                "Processed {:.0}%",
                progress.percentage()
            );
            last_decile = decile;
        }
        if progress.state.is_terminal() {
            break;
        }
    }
}

async fn write_video_artifacts(outcome: &JobOutcome, output_dir: &Path, write_json: bool) -> Result<()> {
    tokio::fs::create_dir_all(output_dir).await?;

    let video = output_dir.join(VIDEO_OUTPUT_FILE);
    tokio::fs::copy(&outcome.output, &video)
        .await
        .with_context(|| format!("Failed to copy {}", outcome.output.display()))?;

    tokio::fs::write(output_dir.join(VIDEO_STATS_FILE), stats_to_csv(&outcome.stats)).await?;

    if write_json {
        let json = detections_to_json(&outcome.detection_log)?;
        tokio::fs::write(output_dir.join(VIDEO_LOG_FILE), json).await?;
    }

    info!(output = %video.display(), "Wrote annotated video");
    Ok(())
}

/// Delete a job's scratch directory; its artifacts live in the output dir.
async fn remove_job_dir(work_dir: &Path, job_id: &JobId) {
    let job_dir = work_dir.join(job_id.as_str());
    match tokio::fs::remove_dir_all(&job_dir).await {
        Ok(()) => debug!(path = %job_dir.display(), "Removed job directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            job_id = %job_id,
            path = %job_dir.display(),
            "Failed to remove job directory: {}",
            e
        ),
    }
}

fn print_video_summary(outcome: &JobOutcome, session: &DetectionSession) {
    match outcome.state {
        JobState::Cancelled => println!("Processing cancelled, partial video saved."),
        _ => println!("Processing complete."),
    }
    if outcome.served_raw {
        println!("Note: the saved video is the unconverted intermediate stream.");
    }
    for notice in &outcome.notices {
        println!("Warning: {}", notice);
    }

    if let Some(elapsed) = session.processing_time() {
        println!(
            "Frames: {} written, {} analysed in {:.1}s",
            outcome.frames_written,
            outcome.detections_run,
            elapsed.as_secs_f64()
        );
    }

    if outcome.stats.is_empty() {
        println!("No objects detected.");
        return;
    }
    println!("Total detections: {}", outcome.total_detections());
    for stats in outcome.stats.values() {
        println!(
            "  {:<16} {:>5}  avg {:.2}  {}",
            stats.class_name,
            stats.count,
            stats.avg_confidence,
            stats.timeline_label()
        );
    }
}

fn run_image(config: &AppConfig, input: &Path, output_dir: &Path, options: &ImageOptions) -> Result<()> {
    let detector = build_detector(config)?;
    let annotator = build_annotator(config)?;

    let report = detect_image(input, &detector, &annotator, options)?;

    std::fs::create_dir_all(output_dir)?;
    let image_path = output_dir.join(IMAGE_OUTPUT_FILE);
    report.save_annotated(&image_path)?;
    std::fs::write(output_dir.join(IMAGE_CSV_FILE), report.to_csv())?;

    if report.detections.is_empty() {
        println!("No objects detected.");
    } else {
        println!("Detected {} objects:", report.detections.len());
        for (class, count) in report.class_counts() {
            println!("  {:<16} {:>5}", class, count);
        }
    }
    info!(output = %image_path.display(), "Wrote annotated image");
    Ok(())
}

fn run_check(config: &AppConfig) -> Result<()> {
    let ffmpeg = check_ffmpeg()?;
    println!("ffmpeg:  {}", ffmpeg.display());
    let ffprobe = check_ffprobe()?;
    println!("ffprobe: {}", ffprobe.display());

    let detector = build_detector(config)?;
    println!("model:   {} ({})", config.model_path.display(), detector.model_name());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remove_job_dir_only_touches_the_job() {
        let work_dir = tempfile::tempdir().unwrap();
        let job_id = JobId::from_string("job-1");
        let job_dir = work_dir.path().join("job-1");
        std::fs::create_dir_all(&job_dir).unwrap();
        std::fs::write(job_dir.join("annotated.mp4"), b"video").unwrap();
        let other = work_dir.path().join("job-2");
        std::fs::create_dir_all(&other).unwrap();

        remove_job_dir(work_dir.path(), &job_id).await;
        assert!(!job_dir.exists());
        assert!(other.exists());

        // Already gone
        remove_job_dir(work_dir.path(), &job_id).await;
    }
}
