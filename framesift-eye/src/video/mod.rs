//! Video decoding backends
//!
//! The batcher only sees [`VideoBackend`] and [`FrameReader`]; codec handling
//! lives entirely behind them.

pub mod memory;
#[cfg(feature = "opencv")]
pub mod capture;

use crate::error::EyeError;
use framesift_core::VideoSource;
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;

pub use memory::{InMemoryBackend, SyntheticClip};
#[cfg(feature = "opencv")]
pub use capture::OpenCvBackend;

/// Opens video files for sequential decoding.
pub trait VideoBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameReader>, EyeError>;
}

/// Sequential frame reader for one opened video.
pub trait FrameReader: Send {
    fn source(&self) -> &Arc<VideoSource>;

    /// Next decoded frame, `Ok(None)` at end of stream.
    fn read_frame(&mut self) -> Result<Option<RgbImage>, EyeError>;
}
