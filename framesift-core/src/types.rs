use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// An opened, decodable video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSource {
    pub path: PathBuf,
    /// Frame count reported by the container, if known
    pub frame_count: Option<u64>,
    pub fps: Option<f64>,
    pub width: u32,
    pub height: u32,
}

impl VideoSource {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// A decoded RGB frame and its 1-based position within its source.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Ordered, non-empty group of sampled frames from one source.
///
/// Frames whose index is not a multiple of `stride` were skipped by the sampler.
#[derive(Debug)]
pub struct FrameBatch {
    sequence: u64,
    source: Arc<VideoSource>,
    stride: u32,
    frames: Vec<Frame>,
}

impl FrameBatch {
    pub fn new(sequence: u64, source: Arc<VideoSource>, stride: u32, frames: Vec<Frame>) -> Result<Self> {
        if frames.is_empty() {
            return Err(Error::InvalidBatch(format!(
                "batch {} from {} has no frames",
                sequence,
                source.name()
            )));
        }
        if frames.windows(2).any(|w| w[0].index >= w[1].index) {
            return Err(Error::InvalidBatch(format!(
                "batch {} from {} is not in temporal order",
                sequence,
                source.name()
            )));
        }

        Ok(Self {
            sequence,
            source,
            stride,
            frames,
        })
    }

    /// Position of this batch in the global production order.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn source(&self) -> &Arc<VideoSource> {
        &self.source
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

/// One predicted object instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    /// Always within [0, 1]
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_id: usize, label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self {
            class_id,
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// Detections for one frame of a batch, borrowed for the duration of processing.
#[derive(Debug, Clone)]
pub struct FrameResult<'a> {
    pub frame: &'a Frame,
    pub detections: Vec<Detection>,
}

impl<'a> FrameResult<'a> {
    pub fn new(frame: &'a Frame, detections: Vec<Detection>) -> Self {
        Self { frame, detections }
    }

    pub fn empty(frame: &'a Frame) -> Self {
        Self::new(frame, Vec::new())
    }

    pub fn max_confidence(&self) -> Option<f32> {
        self.detections
            .iter()
            .map(|d| d.confidence)
            .fold(None, |acc, c| Some(acc.map_or(c, |m: f32| m.max(c))))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Frame with detections drawn on it
    Annotated,
    /// Untouched copy of a selected frame
    RawFrame,
    /// Expanded detection region
    Crop,
}

/// A file written by the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedArtifact {
    pub id: Uuid,
    pub kind: ArtifactKind,
    pub path: PathBuf,
}
