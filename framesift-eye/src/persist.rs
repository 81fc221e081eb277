//! Writes selected frames and crops to disk

use crate::annotate::draw_detections;
use crate::error::EyeError;
use framesift_core::{ArtifactKind, CropRect, Frame, FrameResult, PersistedArtifact};
use image::imageops;
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Owns the two output directories and the file naming scheme.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    results_dir: PathBuf,
    processed_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(results_dir: impl Into<PathBuf>, processed_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
            processed_dir: processed_dir.into(),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    /// Create both output directories.
    pub fn ensure_dirs(&self) -> Result<(), EyeError> {
        for dir in [&self.results_dir, &self.processed_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                EyeError::Persist(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// Write the annotated rendering and the raw copy of a selected frame.
    ///
    /// Both files share one id: `result_{id}.jpg` in the results directory and
    /// `raw_result_{id}.jpg` in the processed directory.
    pub fn write_full_frame(&self, result: &FrameResult<'_>) -> Result<[PersistedArtifact; 2], EyeError> {
        let id = Uuid::new_v4();

        let mut annotated = result.frame.image.clone();
        draw_detections(&mut annotated, &result.detections);
        let annotated_path = self.results_dir.join(format!("result_{}.jpg", id));
        save(&annotated, &annotated_path)?;

        let raw_path = self.processed_dir.join(format!("raw_result_{}.jpg", id));
        save(&result.frame.image, &raw_path)?;

        Ok([
            artifact(id, ArtifactKind::Annotated, annotated_path),
            artifact(id, ArtifactKind::RawFrame, raw_path),
        ])
    }

    /// Write one crop of `frame` as `crop_{id}.jpg` in the processed directory.
    pub fn write_crop(&self, frame: &Frame, rect: CropRect) -> Result<PersistedArtifact, EyeError> {
        if !rect.fits_within(frame.width(), frame.height()) {
            return Err(EyeError::Persist(format!(
                "crop {:?} outside {}x{} frame {}",
                rect,
                frame.width(),
                frame.height(),
                frame.index
            )));
        }

        let id = Uuid::new_v4();
        let crop = imageops::crop_imm(&frame.image, rect.x, rect.y, rect.width, rect.height).to_image();
        let path = self.processed_dir.join(format!("crop_{}.jpg", id));
        save(&crop, &path)?;
        Ok(artifact(id, ArtifactKind::Crop, path))
    }
}

fn save(image: &RgbImage, path: &Path) -> Result<(), EyeError> {
    image
        .save(path)
        .map_err(|e| EyeError::Persist(format!("Failed to write {}: {}", path.display(), e)))
}

fn artifact(id: Uuid, kind: ArtifactKind, path: PathBuf) -> PersistedArtifact {
    info!("Wrote {:?} artifact {}", kind, path.display());
    PersistedArtifact { id, kind, path }
}
