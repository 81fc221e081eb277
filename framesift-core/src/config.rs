//! Configuration for the frame pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// What the consumer writes for a selected frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Annotated rendering plus the raw frame, sharing one identifier
    FullFrame,
    /// One expanded crop per qualifying detection
    Cropped,
}

impl std::str::FromStr for OutputMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "full_frame" | "fullframe" => Ok(OutputMode::FullFrame),
            "crop" | "cropped" => Ok(OutputMode::Cropped),
            other => Err(ConfigError::ValidationError(format!("unknown output mode '{}'", other))),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory scanned for input videos
    pub input_dir: PathBuf,
    /// Annotated renderings (full-frame mode)
    pub results_dir: PathBuf,
    /// Raw frames and crops
    pub processed_dir: PathBuf,
    /// Accepted video file extensions, without the dot
    pub video_extensions: Vec<String>,
    /// Maximum number of batches buffered between producer and consumer
    pub queue_capacity: usize,
    /// Nominal number of frames per batch
    pub batch_size: usize,
    /// Keep every Nth frame
    pub sample_stride: u32,
    /// A frame is persisted when a detection scores strictly above this
    pub confidence_threshold: f32,
    pub crop_expand_width: f32,
    pub crop_expand_height: f32,
    /// How long the consumer waits for a batch before re-checking for shutdown
    pub dequeue_timeout_ms: u64,
    pub output_mode: OutputMode,
    /// ONNX model used by the YOLO detector
    pub model_path: PathBuf,
    /// Square model input resolution
    pub model_input_size: u32,
    /// Candidates below this score are dropped before NMS
    pub min_confidence: f32,
    pub nms_iou_threshold: f32,
    /// Class labels in model order; COCO names are used when empty
    pub class_names: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("Dataset/raw-live"),
            results_dir: PathBuf::from("Results"),
            processed_dir: PathBuf::from("Dataset/processed-live"),
            video_extensions: vec!["mp4".to_string(), "avi".to_string(), "mov".to_string()],
            queue_capacity: 50,
            batch_size: 5,
            sample_stride: 12,
            confidence_threshold: 0.7,
            crop_expand_width: 1.3,
            crop_expand_height: 1.7,
            dequeue_timeout_ms: 1000,
            output_mode: OutputMode::FullFrame,
            model_path: PathBuf::from("yolo11n_trained.onnx"),
            model_input_size: 640,
            min_confidence: 0.25,
            nms_iou_threshold: 0.45,
            class_names: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON, TOML or YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::from_str(&content)
    }

    /// Load configuration from a string, trying JSON, then TOML, then YAML
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<PipelineConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<PipelineConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = serde_yaml::from_str::<PipelineConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::ParseError("Unknown format".to_string()))
    }

    /// Apply `FRAMESIFT_*` environment overrides
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("FRAMESIFT_INPUT_DIR") {
            self.input_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("FRAMESIFT_RESULTS_DIR") {
            self.results_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("FRAMESIFT_PROCESSED_DIR") {
            self.processed_dir = PathBuf::from(dir);
        }
        if let Some(model) = lookup("FRAMESIFT_MODEL_PATH") {
            self.model_path = PathBuf::from(model);
        }
        if let Some(mode) = lookup("FRAMESIFT_OUTPUT_MODE") {
            self.output_mode = mode.parse()?;
        }
        if let Some(threshold) = lookup("FRAMESIFT_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = threshold.trim().parse().map_err(|_| {
                ConfigError::ParseError(format!("FRAMESIFT_CONFIDENCE_THRESHOLD: '{}' is not a number", threshold))
            })?;
        }
        Ok(())
    }

    /// Render as TOML, the format `framesift config` prints
    pub fn to_toml(&self) -> crate::Result<String> {
        toml::to_string_pretty(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    /// True when `path` carries one of the configured video extensions
    pub fn accepts_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.video_extensions
                    .iter()
                    .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ValidationError("queue_capacity must be > 0".to_string()));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::ValidationError("batch_size must be > 0".to_string()));
        }

        if self.sample_stride == 0 {
            return Err(ConfigError::ValidationError("sample_stride must be > 0".to_string()));
        }

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::ValidationError(
                "confidence_threshold must be between 0 and 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.min_confidence) || !(0.0..=1.0).contains(&self.nms_iou_threshold) {
            return Err(ConfigError::ValidationError(
                "min_confidence and nms_iou_threshold must be between 0 and 1".to_string(),
            ));
        }

        for (name, factor) in [
            ("crop_expand_width", self.crop_expand_width),
            ("crop_expand_height", self.crop_expand_height),
        ] {
            if !factor.is_finite() || factor < 1.0 {
                return Err(ConfigError::ValidationError(format!("{} must be a finite value >= 1", name)));
            }
        }

        if self.dequeue_timeout_ms == 0 {
            return Err(ConfigError::ValidationError("dequeue_timeout_ms must be > 0".to_string()));
        }

        if self.video_extensions.iter().all(|ext| ext.trim_start_matches('.').is_empty()) {
            return Err(ConfigError::ValidationError("video_extensions cannot be empty".to_string()));
        }

        if !(32..=4096).contains(&self.model_input_size) {
            return Err(ConfigError::ValidationError(
                "model_input_size must be between 32 and 4096".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Configuration(err.to_string())
    }
}
