//! Consumer side: detection, selection and persistence per batch

use crate::detector::{check_alignment, Detector};
use crate::error::EyeError;
use crate::persist::ArtifactWriter;
use crate::queue::{BatchConsumer, Dequeued};
use crate::shutdown::ShutdownToken;
use framesift_core::{Detection, FrameBatch, FrameResult, OutputMode, PipelineConfig};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Decides which frames are worth persisting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionPolicy {
    pub threshold: f32,
}

impl SelectionPolicy {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn qualifies(&self, detection: &Detection) -> bool {
        detection.confidence > self.threshold
    }

    /// A frame is selected when any of its detections qualifies.
    pub fn selects(&self, result: &FrameResult<'_>) -> bool {
        result.detections.iter().any(|d| self.qualifies(d))
    }

    pub fn qualifying<'d>(&self, detections: &'d [Detection]) -> impl Iterator<Item = &'d Detection> + 'd {
        let policy = *self;
        detections.iter().filter(move |d| policy.qualifies(d))
    }

    /// Selected results, in their original order.
    pub fn select<'a>(&self, results: &[FrameResult<'a>]) -> Vec<FrameResult<'a>> {
        results.iter().filter(|r| self.selects(r)).cloned().collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    pub batches_processed: u64,
    pub batches_failed: u64,
    pub frames_processed: u64,
    pub frames_selected: u64,
    pub artifacts_written: u64,
    /// Stopped by the shutdown token rather than by draining the queue
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    frames: u64,
    selected: u64,
    artifacts: u64,
}

/// Pulls batches off the queue and runs them through the detector.
pub struct InferenceConsumer {
    config: Arc<PipelineConfig>,
    detector: Box<dyn Detector>,
    writer: ArtifactWriter,
    policy: SelectionPolicy,
    shutdown: ShutdownToken,
}

impl InferenceConsumer {
    pub fn new(
        config: Arc<PipelineConfig>,
        detector: Box<dyn Detector>,
        writer: ArtifactWriter,
        shutdown: ShutdownToken,
    ) -> Self {
        let policy = SelectionPolicy::new(config.confidence_threshold);
        Self {
            config,
            detector,
            writer,
            policy,
            shutdown,
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Consume until the queue is drained or shutdown is requested.
    pub fn run(mut self, queue: BatchConsumer) -> ConsumerReport {
        let timeout = self.config.dequeue_timeout();
        let mut report = ConsumerReport::default();
        info!("Inference consumer started with detector '{}'", self.detector.name());

        loop {
            if self.shutdown.is_cancelled() {
                info!("Inference consumer cancelled with {} batches still queued", queue.len());
                report.cancelled = true;
                break;
            }

            match queue.dequeue(timeout) {
                Dequeued::Batch(batch) => self.handle(batch, &mut report),
                Dequeued::TimedOut => debug!("No batch within {:?}", timeout),
                Dequeued::Drained => break,
            }
        }

        info!(
            "Inference consumer finished: {} batches ({} failed), {} frames, {} selected, {} artifacts",
            report.batches_processed,
            report.batches_failed,
            report.frames_processed,
            report.frames_selected,
            report.artifacts_written
        );
        report
    }

    fn handle(&mut self, batch: FrameBatch, report: &mut ConsumerReport) {
        let sequence = batch.sequence();
        let source = batch.source().name();

        match catch_unwind(AssertUnwindSafe(|| self.process_batch(&batch))) {
            Ok(Ok(outcome)) => {
                info!(
                    "Batch {} from {}: {} frames, {} selected, {} artifacts",
                    sequence, source, outcome.frames, outcome.selected, outcome.artifacts
                );
                report.batches_processed += 1;
                report.frames_processed += outcome.frames;
                report.frames_selected += outcome.selected;
                report.artifacts_written += outcome.artifacts;
            }
            Ok(Err(e)) => {
                error!("Batch {} from {} failed: {}", sequence, source, e);
                report.batches_failed += 1;
            }
            Err(panic) => {
                error!("Batch {} from {} panicked: {}", sequence, source, panic_message(panic.as_ref()));
                report.batches_failed += 1;
            }
        }
    }

    fn process_batch(&mut self, batch: &FrameBatch) -> Result<BatchOutcome, EyeError> {
        let frames = batch.frames();
        let results = self.detector.detect(frames)?;
        check_alignment(frames, &results)?;

        let mut outcome = BatchOutcome {
            frames: results.len() as u64,
            ..BatchOutcome::default()
        };

        for result in results.iter().filter(|r| self.policy.selects(r)) {
            outcome.selected += 1;
            outcome.artifacts += self.persist(result)?;
        }
        Ok(outcome)
    }

    fn persist(&self, result: &FrameResult<'_>) -> Result<u64, EyeError> {
        match self.config.output_mode {
            OutputMode::FullFrame => {
                let written = self.writer.write_full_frame(result)?;
                Ok(written.len() as u64)
            }
            OutputMode::Cropped => {
                let frame = result.frame;
                let mut written = 0;
                for detection in self.policy.qualifying(&result.detections) {
                    let rect = detection.bbox.crop_region(
                        self.config.crop_expand_width,
                        self.config.crop_expand_height,
                        frame.width(),
                        frame.height(),
                    );
                    match rect {
                        Some(rect) => {
                            self.writer.write_crop(frame, rect)?;
                            written += 1;
                        }
                        None => debug!(
                            "Skipping empty crop for {} in frame {}",
                            detection.label, frame.index
                        ),
                    }
                }
                Ok(written)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
