//! Producer/consumer orchestration

use crate::batcher::{BatcherReport, FrameBatcher};
use crate::consumer::{ConsumerReport, InferenceConsumer};
use crate::detector::Detector;
use crate::error::EyeError;
use crate::persist::ArtifactWriter;
use crate::queue::{BatchQueue, QueueStats};
use crate::shutdown::ShutdownToken;
use crate::video::VideoBackend;
use framesift_core::PipelineConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Outcome of a complete pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub batcher: BatcherReport,
    pub consumer: ConsumerReport,
    pub queue: QueueStats,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn cancelled(&self) -> bool {
        self.batcher.cancelled || self.consumer.cancelled
    }
}

/// Wires a frame batcher and an inference consumer around one bounded queue.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    backend: Arc<dyn VideoBackend>,
    detector: Box<dyn Detector>,
    shutdown: ShutdownToken,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        backend: Arc<dyn VideoBackend>,
        detector: Box<dyn Detector>,
    ) -> Result<Self, EyeError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            backend,
            detector,
            shutdown: ShutdownToken::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Handle for cancelling the run from outside, e.g. on Ctrl-C.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Run both workers to completion.
    ///
    /// Fails before starting any worker if the input directory is missing or
    /// an output directory cannot be created.
    pub async fn run(self) -> Result<PipelineReport, EyeError> {
        let start = Instant::now();

        if !self.config.input_dir.is_dir() {
            return Err(EyeError::Source(format!(
                "Input directory {} does not exist",
                self.config.input_dir.display()
            )));
        }
        let writer = ArtifactWriter::new(&self.config.results_dir, &self.config.processed_dir);
        writer.ensure_dirs()?;

        let (producer, queue) = BatchQueue::bounded(self.config.queue_capacity)?;
        let monitor = queue.monitor();

        info!(
            "Starting pipeline: input={}, mode={:?}, detector='{}', queue capacity={}",
            self.config.input_dir.display(),
            self.config.output_mode,
            self.detector.name(),
            self.config.queue_capacity
        );

        let batcher = FrameBatcher::new(self.config.clone(), self.backend, self.shutdown.clone());
        let consumer = InferenceConsumer::new(self.config.clone(), self.detector, writer, self.shutdown.clone());

        let producer_task = tokio::task::spawn_blocking(move || batcher.run(producer));
        let consumer_task = tokio::task::spawn_blocking(move || consumer.run(queue));
        let (batcher_joined, consumer_joined) = tokio::join!(producer_task, consumer_task);

        let batcher_result =
            batcher_joined.map_err(|e| EyeError::Worker(format!("Frame batcher task failed: {}", e)))?;
        let consumer =
            consumer_joined.map_err(|e| EyeError::Worker(format!("Inference consumer task failed: {}", e)))?;

        finish(batcher_result, consumer, monitor.stats(), start.elapsed())
    }
}

/// Assemble the report and log the run summary. A batcher error is returned
/// as is, but only after the consumer's work has been logged.
fn finish(
    batcher: Result<BatcherReport, EyeError>,
    consumer: ConsumerReport,
    queue: QueueStats,
    elapsed: Duration,
) -> Result<PipelineReport, EyeError> {
    let batcher = match batcher {
        Ok(batcher) => batcher,
        Err(e) => {
            error!(
                "Pipeline failed after {:.2?}: {}; consumer still processed {} batches ({} failed), {} frames selected, {} artifacts, {}/{} queued batches consumed",
                elapsed,
                e,
                consumer.batches_processed,
                consumer.batches_failed,
                consumer.frames_selected,
                consumer.artifacts_written,
                queue.dequeued,
                queue.enqueued
            );
            return Err(e);
        }
    };

    let report = PipelineReport {
        batcher,
        consumer,
        queue,
        elapsed,
    };

    info!(
        "Pipeline finished in {:.2?}: {} videos, {} batches, {} frames selected, {} artifacts, peak queue {}/{}{}",
        report.elapsed,
        report.batcher.videos_seen,
        report.consumer.batches_processed,
        report.consumer.frames_selected,
        report.consumer.artifacts_written,
        report.queue.peak,
        report.queue.capacity,
        if report.cancelled() { " (cancelled)" } else { "" }
    );
    Ok(report)
}
