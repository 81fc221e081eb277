pub mod types;
pub mod geometry;
pub mod error;
pub mod config;

pub use error::{Error, Result};
pub use config::{PipelineConfig, OutputMode, ConfigError};
pub use geometry::{BoundingBox, CropRect};
pub use types::{
    VideoSource, Frame, FrameBatch, Detection, FrameResult, ArtifactKind, PersistedArtifact,
};
