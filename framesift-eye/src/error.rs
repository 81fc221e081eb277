//! Error types for framesift-eye

use framesift_core::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EyeError {
    #[error("Source error: {0}")]
    Source(String),

    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Persist error: {0}")]
    Persist(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[cfg(feature = "onnx")]
    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<EyeError> for CoreError {
    fn from(err: EyeError) -> Self {
        CoreError::Pipeline(format!("Eye error: {}", err))
    }
}

impl From<framesift_core::ConfigError> for EyeError {
    fn from(err: framesift_core::ConfigError) -> Self {
        EyeError::Config(err.to_string())
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for EyeError {
    fn from(err: opencv::Error) -> Self {
        EyeError::OpenCv(err.message)
    }
}
