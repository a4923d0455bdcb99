//! YOLOv8 object detection on ONNX Runtime.
//!
//! Execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when the `cuda` feature is enabled)
//! - CoreML on macOS
//! - CPU fallback on all platforms

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use half::f16;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::ArrayView2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vdet_models::BoundingBox;

use super::adapter::{ObjectModel, RawDetection};
use crate::error::{MediaError, MediaResult};

/// COCO class names (80 classes).
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

/// Numeric precision of the model input tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// fp32
    #[default]
    Full,
    /// fp16, for models exported with `half=True`
    Half,
}

impl FromStr for Precision {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" | "fp32" | "f32" => Ok(Self::Full),
            "half" | "fp16" | "f16" => Ok(Self::Half),
            other => Err(MediaError::internal(format!("Unknown precision: {}", other))),
        }
    }
}

/// Channel order the model was trained on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorOrder {
    #[default]
    Rgb,
    Bgr,
}

impl ColorOrder {
    fn channels(self) -> [usize; 3] {
        match self {
            Self::Rgb => [0, 1, 2],
            Self::Bgr => [2, 1, 0],
        }
    }
}

/// Configuration for object detection.
///
/// Precision and colour order are fixed once the detector is built.
#[derive(Debug, Clone)]
pub struct ObjectDetectorConfig {
    /// Path to ONNX model file
    pub model_path: PathBuf,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Input image size (model expects square input)
    pub input_size: u32,
    /// Name of the detection output tensor
    pub output_name: String,
    pub precision: Precision,
    pub color_order: ColorOrder,
    /// Class id -> name table
    pub class_names: Vec<String>,
}

impl Default for ObjectDetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/yolov8n.onnx"),
            nms_threshold: 0.45,
            input_size: 640,
            output_name: "output0".to_string(),
            precision: Precision::Full,
            color_order: ColorOrder::Rgb,
            class_names: COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ObjectDetectorConfig {
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_class_names(mut self, names: Vec<String>) -> Self {
        self.class_names = names;
        self
    }
}

/// Read a class-names file: one name per line, blank lines ignored.
pub fn load_class_names(path: &Path) -> MediaResult<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    let names: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        return Err(MediaError::internal(format!(
            "Class names file {} is empty",
            path.display()
        )));
    }
    Ok(names)
}

/// Object detector using a YOLOv8 ONNX model.
pub struct ObjectDetector {
    session: Mutex<Session>,
    config: ObjectDetectorConfig,
}

impl ObjectDetector {
    /// Load the model.
    ///
    /// Returns error if model file doesn't exist or cannot be loaded.
    pub fn new(config: ObjectDetectorConfig) -> MediaResult<Self> {
        if !config.model_path.exists() {
            return Err(MediaError::model_not_found(config.model_path.display().to_string()));
        }

        let session = Mutex::new(create_session(&config.model_path)?);
        info!(
            model_path = %config.model_path.display(),
            input_size = config.input_size,
            precision = ?config.precision,
            classes = config.class_names.len(),
            "Object detector initialized"
        );

        Ok(Self { session, config })
    }

    pub fn config(&self) -> &ObjectDetectorConfig {
        &self.config
    }

    /// Resize to the model input, normalize to [0, 1] and lay out as NCHW.
    fn preprocess(&self, image: &RgbImage) -> MediaResult<Value> {
        let size = self.config.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        let plane = (size * size) as usize;
        let order = self.config.color_order.channels();

        let mut chw = vec![0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for (c, &src) in order.iter().enumerate() {
                chw[c * plane + i] = f32::from(pixel[src]) / 255.0;
            }
        }

        let shape = vec![1usize, 3, size as usize, size as usize];
        let tensor = match self.config.precision {
            Precision::Full => Tensor::from_array((shape, chw.into_boxed_slice())).map(Value::from),
            Precision::Half => {
                let data: Vec<f16> = chw.into_iter().map(f16::from_f32).collect();
                Tensor::from_array((shape, data.into_boxed_slice())).map(Value::from)
            }
        };
        tensor.map_err(|e| MediaError::detection_failed(format!("Failed to create tensor: {}", e)))
    }

    /// Run inference, returning the output shape and values as f32.
    fn run_inference(&self, input: Value) -> MediaResult<(Vec<i64>, Vec<f32>)> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection_failed(format!("ONNX inference failed: {}", e)))?;

        let output = outputs.get(self.config.output_name.as_str()).ok_or_else(|| {
            MediaError::detection_failed(format!("Missing {} tensor", self.config.output_name))
        })?;

        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            return Ok((shape.iter().copied().collect(), data.to_vec()));
        }
        let (shape, data) = output
            .try_extract_tensor::<f16>()
            .map_err(|e| MediaError::detection_failed(format!("Failed to extract tensor: {}", e)))?;
        Ok((
            shape.iter().copied().collect(),
            data.iter().map(|v| v.to_f32()).collect(),
        ))
    }
}

impl ObjectModel for ObjectDetector {
    fn infer(&self, image: &RgbImage, confidence_threshold: f32) -> MediaResult<Vec<RawDetection>> {
        let (width, height) = image.dimensions();
        let input = self.preprocess(image)?;
        let (shape, data) = self.run_inference(input)?;

        let input_size = self.config.input_size as f32;
        let candidates = decode_yolo_output(
            &shape,
            &data,
            (width as f32 / input_size, height as f32 / input_size),
            confidence_threshold,
        )?;
        let detections = non_maximum_suppression(candidates, self.config.nms_threshold);

        debug!(count = detections.len(), "Object detection completed");
        Ok(detections)
    }

    fn class_name(&self, class_id: usize) -> Option<&str> {
        self.config.class_names.get(class_id).map(String::as_str)
    }

    fn name(&self) -> &str {
        "yolov8-onnx"
    }
}

/// Decode a YOLOv8 head of shape `[1, 4 + classes, boxes]`.
///
/// Each candidate is `(cx, cy, w, h, score_0 .. score_n)` in model input
/// pixels; `scale` maps them back to the source image. Heads exported
/// transposed (`[1, boxes, 4 + classes]`) are accepted too.
pub fn decode_yolo_output(
    shape: &[i64],
    data: &[f32],
    scale: (f32, f32),
    confidence_threshold: f32,
) -> MediaResult<Vec<RawDetection>> {
    let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    let (rows, cols) = match dims.as_slice() {
        [1, rows, cols] | [rows, cols] => (*rows, *cols),
        _ => {
            return Err(MediaError::detection_failed(format!(
                "Unexpected output shape {:?}",
                shape
            )))
        }
    };

    let view = ArrayView2::from_shape((rows, cols), data)
        .map_err(|e| MediaError::detection_failed(format!("Failed to reshape output: {}", e)))?;
    // Fewer features than candidates is the standard layout
    let candidates = if rows <= cols { view.reversed_axes() } else { view };
    let num_features = candidates.ncols();
    if num_features < 5 {
        return Err(MediaError::detection_failed(format!(
            "Output has {} features, need at least 5",
            num_features
        )));
    }

    let (scale_w, scale_h) = scale;
    let mut detections = Vec::new();
    for row in candidates.rows() {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for (c, &score) in row.iter().skip(4).enumerate() {
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        if !best_score.is_finite() || best_score < confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        detections.push(RawDetection {
            class_id: best_class,
            confidence: best_score,
            bbox: BoundingBox::new(
                (cx - w / 2.0) * scale_w,
                (cy - h / 2.0) * scale_h,
                (cx + w / 2.0) * scale_w,
                (cy + h / 2.0) * scale_h,
            ),
        });
    }

    Ok(detections)
}

/// Class-aware NMS: keeps the highest-confidence box among same-class
/// overlaps above `iou_threshold`.
pub fn non_maximum_suppression(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = keep.iter().any(|kept| {
            kept.class_id == candidate.class_id && iou(&kept.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let intersection = inter_w * inter_h;
    let union = a.area() + b.area() - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::internal(format!("Failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    info!("Using CPU execution provider for object detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))
}
