//! OpenCV-backed video decoding

use super::{FrameReader, VideoBackend};
use crate::error::EyeError;
use framesift_core::VideoSource;
use image::RgbImage;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Decodes files through `cv::VideoCapture`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvBackend;

impl OpenCvBackend {
    pub fn new() -> Self {
        Self
    }
}

impl VideoBackend for OpenCvBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameReader>, EyeError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| EyeError::Source(format!("Non UTF-8 path: {}", path.display())))?;

        let capture = VideoCapture::from_file(path_str, CAP_ANY)
            .map_err(|e| EyeError::Source(format!("Failed to open {}: {}", path.display(), e)))?;

        if !capture.is_opened()
            .map_err(|e| EyeError::Source(format!("{} not opened: {}", path.display(), e)))? {
            return Err(EyeError::Source(format!("{} failed to open", path.display())));
        }

        let frame_count = capture.get(CAP_PROP_FRAME_COUNT).ok().filter(|c| *c > 0.0).map(|c| c as u64);
        let fps = capture.get(CAP_PROP_FPS).ok().filter(|f| *f > 0.0);
        let width = capture.get(CAP_PROP_FRAME_WIDTH).unwrap_or(0.0).max(0.0) as u32;
        let height = capture.get(CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0).max(0.0) as u32;

        debug!("Opened {} ({}x{}, {:?} frames @ {:?} fps)", path.display(), width, height, frame_count, fps);

        Ok(Box::new(OpenCvReader {
            capture,
            source: Arc::new(VideoSource {
                path: path.to_path_buf(),
                frame_count,
                fps,
                width,
                height,
            }),
        }))
    }
}

struct OpenCvReader {
    capture: VideoCapture,
    source: Arc<VideoSource>,
}

impl FrameReader for OpenCvReader {
    fn source(&self) -> &Arc<VideoSource> {
        &self.source
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>, EyeError> {
        let mut frame = Mat::default();
        let grabbed = self.capture.read(&mut frame)
            .map_err(|e| EyeError::Source(format!("Failed to read frame from {}: {}", self.source.name(), e)))?;
        if !grabbed || frame.empty() {
            return Ok(None);
        }

        mat_to_rgb_image(&frame).map(Some)
    }
}

impl Drop for OpenCvReader {
    fn drop(&mut self) {
        let _ = self.capture.release();
    }
}

/// Convert a BGR `Mat` into an owned RGB image
fn mat_to_rgb_image(mat: &Mat) -> Result<RgbImage, EyeError> {
    let (width, height) = (mat.cols(), mat.rows());
    if width <= 0 || height <= 0 {
        return Err(EyeError::Source("Invalid frame dimensions".to_string()));
    }

    let mut rgb = Mat::default();
    imgproc::cvt_color(mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
    if !rgb.is_continuous() {
        rgb = rgb.try_clone()?;
    }

    let data = rgb.data_bytes()?.to_vec();
    RgbImage::from_raw(width as u32, height as u32, data)
        .ok_or_else(|| EyeError::Source(format!("Frame buffer does not match {}x{}", width, height)))
}
