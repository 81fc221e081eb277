//! framesift-eye: bounded producer/consumer pipeline for video frame detection
//!
//! A frame batcher decodes and subsamples videos into fixed-size batches, a
//! bounded queue applies backpressure, and an inference consumer runs a batch
//! detector and persists frames or crops whose detections clear the threshold.

pub mod annotate;
pub mod batcher;
pub mod consumer;
pub mod detector;
pub mod error;
pub mod models;
pub mod persist;
pub mod pipeline;
pub mod queue;
pub mod shutdown;
pub mod video;

#[cfg(test)]
mod test_support;

pub use batcher::{BatcherReport, FrameBatcher, VideoScan};
pub use consumer::{ConsumerReport, InferenceConsumer, SelectionPolicy};
pub use detector::{Detector, NullDetector};
pub use error::EyeError;
pub use persist::ArtifactWriter;
pub use pipeline::{Pipeline, PipelineReport};
pub use queue::{BatchConsumer, BatchProducer, BatchQueue, Dequeued, QueueMonitor, QueueStats};
pub use shutdown::ShutdownToken;
pub use video::{FrameReader, InMemoryBackend, SyntheticClip, VideoBackend};

#[cfg(feature = "onnx")]
pub use models::YoloDetector;
#[cfg(feature = "opencv")]
pub use video::OpenCvBackend;
