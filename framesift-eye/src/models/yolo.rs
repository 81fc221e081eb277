//! YOLO object detection over ONNX Runtime

use super::decode::{decode_predictions, DecodeParams};
use crate::detector::Detector;
use crate::error::EyeError;
use framesift_core::{Frame, FrameResult, PipelineConfig};
use image::imageops::{self, FilterType};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use tracing::{debug, info};

/// Largest input tensor accepted for one batch
const MAX_INPUT_ELEMENTS: usize = 200_000_000;

/// YOLOv8/YOLO11 detector running one session call per batch.
pub struct YoloDetector {
    session: Session,
    input_size: u32,
    min_confidence: f32,
    iou_threshold: f32,
    class_names: Vec<String>,
}

impl YoloDetector {
    /// Load the model named by `config.model_path`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, EyeError> {
        let mut detector = Self::new(&config.model_path, config.model_input_size)?;
        detector.min_confidence = config.min_confidence;
        detector.iou_threshold = config.nms_iou_threshold;
        detector.class_names = config.class_names.clone();
        Ok(detector)
    }

    pub fn new(model_path: &Path, input_size: u32) -> Result<Self, EyeError> {
        if !model_path.is_file() {
            return Err(EyeError::Ort(format!("Model file {} not found", model_path.display())));
        }

        let session = Session::builder()
            .map_err(|e| EyeError::Ort(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EyeError::Ort(format!("Failed to set optimization level: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| EyeError::Ort(format!("Failed to load YOLO model: {}", e)))?;

        info!("YOLO model loaded from {:?} ({}x{} input)", model_path, input_size, input_size);

        Ok(Self {
            session,
            input_size,
            min_confidence: 0.25,
            iou_threshold: 0.45,
            class_names: Vec::new(),
        })
    }

    /// Resize every frame to the model resolution and pack them as `[N, 3, S, S]`.
    fn preprocess(&self, frames: &[Frame]) -> Result<Tensor<f32>, EyeError> {
        let size = self.input_size as usize;
        let plane = size * size;
        let total = frames
            .len()
            .checked_mul(3 * plane)
            .filter(|&n| n <= MAX_INPUT_ELEMENTS)
            .ok_or_else(|| EyeError::Detection(format!("batch of {} frames is too large", frames.len())))?;

        let mut data = vec![0.0f32; total];
        for (n, frame) in frames.iter().enumerate() {
            let resized = imageops::resize(&frame.image, self.input_size, self.input_size, FilterType::Triangle);
            let offset = n * 3 * plane;
            for (i, pixel) in resized.pixels().enumerate() {
                for c in 0..3 {
                    data[offset + c * plane + i] = pixel.0[c] as f32 / 255.0;
                }
            }
        }

        Tensor::from_array(([frames.len(), 3, size, size], data))
            .map_err(|e| EyeError::Ort(format!("Failed to create input tensor: {}", e)))
    }
}

impl Detector for YoloDetector {
    fn name(&self) -> &str {
        "yolo"
    }

    fn detect<'a>(&mut self, frames: &'a [Frame]) -> Result<Vec<FrameResult<'a>>, EyeError> {
        if frames.is_empty() {
            return Ok(Vec::new());
        }

        let input = self.preprocess(frames)?;
        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(|e| EyeError::Ort(format!("YOLO inference failed: {}", e)))?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EyeError::Ort(format!("Failed to extract output tensor: {}", e)))?;

        debug!("YOLO output shape: {:?}", shape);
        if shape.len() != 3 || shape[0] as usize != frames.len() {
            return Err(EyeError::Detection(format!(
                "unexpected output shape {:?} for {} frames",
                shape,
                frames.len()
            )));
        }
        let channels = shape[1] as usize;
        let anchors = shape[2] as usize;
        let per_image = channels * anchors;

        let mut results = Vec::with_capacity(frames.len());
        for (n, frame) in frames.iter().enumerate() {
            let params = DecodeParams {
                input_size: self.input_size,
                frame_width: frame.width(),
                frame_height: frame.height(),
                min_confidence: self.min_confidence,
                iou_threshold: self.iou_threshold,
                class_names: &self.class_names,
            };
            let slice = data
                .get(n * per_image..(n + 1) * per_image)
                .ok_or_else(|| EyeError::Detection(format!("output too short for frame {}", n)))?;
            let detections = decode_predictions(slice, channels, anchors, &params)?;
            debug!("Frame {}: {} detections", frame.index, detections.len());
            results.push(FrameResult::new(frame, detections));
        }
        Ok(results)
    }
}
