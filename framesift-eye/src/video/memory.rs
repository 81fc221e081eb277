//! Synthetic in-memory video backend

use super::{FrameReader, VideoBackend};
use crate::error::EyeError;
use framesift_core::VideoSource;
use image::{Rgb, RgbImage};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Description of a generated clip
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticClip {
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub color: [u8; 3],
    /// Fail with a decode error once this many frames have been read
    pub fail_after: Option<u64>,
}

impl SyntheticClip {
    pub fn new(frame_count: u64, width: u32, height: u32) -> Self {
        Self {
            frame_count,
            width,
            height,
            fps: 24.0,
            color: [0, 0, 0],
            fail_after: None,
        }
    }

    /// A uniform clip lasting `seconds` at `fps`.
    pub fn blank(seconds: u64, fps: u32, width: u32, height: u32) -> Self {
        Self::new(seconds * fps as u64, width, height).with_fps(fps as f64)
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_color(mut self, color: [u8; 3]) -> Self {
        self.color = color;
        self
    }

    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }
}

/// Backend that serves generated clips keyed by file name.
///
/// The files still have to exist on disk for the batcher to discover them;
/// their contents are ignored.
#[derive(Default)]
pub struct InMemoryBackend {
    clips: RwLock<HashMap<String, Option<SyntheticClip>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, file_name: impl Into<String>, clip: SyntheticClip) {
        self.clips.write().insert(file_name.into(), Some(clip));
    }

    /// Register a name that exists but cannot be opened.
    pub fn register_unopenable(&self, file_name: impl Into<String>) {
        self.clips.write().insert(file_name.into(), None);
    }

    pub fn with_clip(self, file_name: impl Into<String>, clip: SyntheticClip) -> Self {
        self.register(file_name, clip);
        self
    }
}

impl VideoBackend for InMemoryBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameReader>, EyeError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| EyeError::Source(format!("{} has no file name", path.display())))?;

        let clip = match self.clips.read().get(&name) {
            Some(Some(clip)) => clip.clone(),
            Some(None) => {
                return Err(EyeError::Source(format!("Failed to open {}: unsupported stream", name)))
            }
            None => return Err(EyeError::Source(format!("Failed to open {}: no such clip", name))),
        };

        let source = Arc::new(VideoSource {
            path: path.to_path_buf(),
            frame_count: Some(clip.frame_count),
            fps: Some(clip.fps),
            width: clip.width,
            height: clip.height,
        });

        Ok(Box::new(SyntheticReader {
            source,
            clip,
            position: 0,
        }))
    }
}

struct SyntheticReader {
    source: Arc<VideoSource>,
    clip: SyntheticClip,
    position: u64,
}

impl FrameReader for SyntheticReader {
    fn source(&self) -> &Arc<VideoSource> {
        &self.source
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>, EyeError> {
        if self.position >= self.clip.frame_count {
            return Ok(None);
        }
        if self.clip.fail_after.map_or(false, |limit| self.position >= limit) {
            return Err(EyeError::Source(format!(
                "Decode failure in {} at frame {}",
                self.source.name(),
                self.position + 1
            )));
        }

        self.position += 1;
        Ok(Some(RgbImage::from_pixel(
            self.clip.width,
            self.clip.height,
            Rgb(self.clip.color),
        )))
    }
}
