//! Object detector abstraction

use crate::error::EyeError;
use framesift_core::{Frame, FrameResult};

/// Runs object detection over a whole batch in one call.
///
/// Implementations must return exactly one [`FrameResult`] per input frame, in
/// input order, each borrowing the frame it describes. The consumer rejects a
/// batch whose results violate this.
pub trait Detector: Send {
    fn name(&self) -> &str;

    fn detect<'a>(&mut self, frames: &'a [Frame]) -> Result<Vec<FrameResult<'a>>, EyeError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn detect<'a>(&mut self, frames: &'a [Frame]) -> Result<Vec<FrameResult<'a>>, EyeError> {
        (**self).detect(frames)
    }
}

/// Detector that never finds anything. Useful for dry runs of the decode path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn name(&self) -> &str {
        "null"
    }

    fn detect<'a>(&mut self, frames: &'a [Frame]) -> Result<Vec<FrameResult<'a>>, EyeError> {
        Ok(frames.iter().map(FrameResult::empty).collect())
    }
}

/// Check that `results` describe `frames` one-to-one and in order.
pub(crate) fn check_alignment(frames: &[Frame], results: &[FrameResult<'_>]) -> Result<(), EyeError> {
    if frames.len() != results.len() {
        return Err(EyeError::Detection(format!(
            "expected {} results, got {}",
            frames.len(),
            results.len()
        )));
    }
    if let Some(pos) = frames
        .iter()
        .zip(results)
        .position(|(frame, result)| !std::ptr::eq(frame, result.frame))
    {
        return Err(EyeError::Detection(format!("result {} does not match its frame", pos)));
    }
    Ok(())
}
