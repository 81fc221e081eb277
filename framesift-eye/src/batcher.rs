//! Producer side: decode, subsample and batch frames

use crate::error::EyeError;
use crate::queue::BatchProducer;
use crate::shutdown::ShutdownToken;
use crate::video::{FrameReader, VideoBackend};
use framesift_core::{Frame, FrameBatch, PipelineConfig, VideoSource};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-video outcome of a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoScan {
    pub path: PathBuf,
    pub frames_read: u64,
    pub frames_sampled: u64,
    /// Sizes of the batches enqueued for this video, in order
    pub batch_sizes: Vec<usize>,
    /// Open or decode failure, if any
    pub error: Option<String>,
}

impl VideoScan {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            frames_read: 0,
            frames_sampled: 0,
            batch_sizes: Vec::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatcherReport {
    pub videos_seen: usize,
    pub videos_failed: usize,
    pub frames_read: u64,
    pub frames_sampled: u64,
    pub batches_enqueued: u64,
    pub cancelled: bool,
    pub videos: Vec<VideoScan>,
}

impl BatcherReport {
    fn record(&mut self, scan: VideoScan) {
        self.videos_seen += 1;
        if scan.error.is_some() {
            self.videos_failed += 1;
        }
        self.frames_read += scan.frames_read;
        self.frames_sampled += scan.frames_sampled;
        self.videos.push(scan);
    }
}

/// Scans the input directory and feeds sampled frame batches into the queue.
pub struct FrameBatcher {
    config: Arc<PipelineConfig>,
    backend: Arc<dyn VideoBackend>,
    shutdown: ShutdownToken,
}

impl FrameBatcher {
    pub fn new(config: Arc<PipelineConfig>, backend: Arc<dyn VideoBackend>, shutdown: ShutdownToken) -> Self {
        Self {
            config,
            backend,
            shutdown,
        }
    }

    /// Video files in the input directory, sorted by name.
    pub fn discover_videos(&self) -> Result<Vec<PathBuf>, EyeError> {
        let entries = std::fs::read_dir(&self.config.input_dir).map_err(|e| {
            EyeError::Source(format!("Failed to list {}: {}", self.config.input_dir.display(), e))
        })?;

        Ok(self.collect_videos(entries.map(|entry| entry.map(|e| e.path()))))
    }

    /// Keep accepted video files from a directory listing. An entry that
    /// cannot be read is logged and skipped.
    fn collect_videos<I>(&self, entries: I) -> Vec<PathBuf>
    where
        I: IntoIterator<Item = std::io::Result<PathBuf>>,
    {
        let mut videos = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", self.config.input_dir.display(), e);
                    continue;
                }
            };
            if path.is_file() && self.config.accepts_extension(&path) {
                videos.push(path);
            }
        }
        videos.sort();
        videos
    }

    /// Run the scan to completion.
    ///
    /// The producer is completed on every exit path, so the consumer always
    /// observes the end of input.
    pub fn run(self, producer: BatchProducer) -> Result<BatcherReport, EyeError> {
        let mut report = BatcherReport::default();
        let result = self.scan(&producer, &mut report);
        producer.complete();

        match result {
            Ok(()) => {}
            // A cancelled consumer drops its end, so a disconnect after shutdown is a cancellation too
            Err(e) if matches!(e, EyeError::Cancelled) || self.shutdown.is_cancelled() => {
                warn!("Frame batcher cancelled after {} batches", report.batches_enqueued);
                report.cancelled = true;
            }
            Err(e) => {
                warn!("Frame batcher stopped early: {}", e);
                return Err(e);
            }
        }

        info!(
            "Frame batcher finished: {} videos ({} failed), {} frames read, {} sampled, {} batches",
            report.videos_seen,
            report.videos_failed,
            report.frames_read,
            report.frames_sampled,
            report.batches_enqueued
        );
        Ok(report)
    }

    fn scan(&self, producer: &BatchProducer, report: &mut BatcherReport) -> Result<(), EyeError> {
        let videos = self.discover_videos()?;
        info!("Found {} videos in {}", videos.len(), self.config.input_dir.display());

        for path in videos {
            if self.shutdown.is_cancelled() {
                return Err(EyeError::Cancelled);
            }

            let mut scan = VideoScan::new(path.clone());
            let outcome = match self.backend.open(&path) {
                Ok(reader) => self.scan_video(reader, producer, report, &mut scan),
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    scan.error = Some(e.to_string());
                    Ok(())
                }
            };
            report.record(scan);
            outcome?;
        }
        Ok(())
    }

    fn scan_video(
        &self,
        mut reader: Box<dyn FrameReader>,
        producer: &BatchProducer,
        report: &mut BatcherReport,
        scan: &mut VideoScan,
    ) -> Result<(), EyeError> {
        let source = reader.source().clone();
        let stride = self.config.sample_stride as u64;
        info!("Scanning {} ({:?} frames)", source.name(), source.frame_count);

        let mut pending: Vec<Frame> = Vec::with_capacity(self.config.batch_size);
        let mut index = 0u64;
        loop {
            if self.shutdown.is_cancelled() {
                return Err(EyeError::Cancelled);
            }

            let image = match reader.read_frame() {
                Ok(Some(image)) => image,
                Ok(None) => break,
                Err(e) => {
                    warn!("Stopping {} after {} frames: {}", source.name(), index, e);
                    scan.error = Some(e.to_string());
                    break;
                }
            };

            index += 1;
            scan.frames_read += 1;
            if index % stride != 0 {
                continue;
            }

            scan.frames_sampled += 1;
            pending.push(Frame::new(index, image));
            if pending.len() == self.config.batch_size {
                self.flush(&source, &mut pending, producer, report, scan)?;
            }
        }

        // Trailing partial batch
        self.flush(&source, &mut pending, producer, report, scan)?;
        Ok(())
    }

    fn flush(
        &self,
        source: &Arc<VideoSource>,
        pending: &mut Vec<Frame>,
        producer: &BatchProducer,
        report: &mut BatcherReport,
        scan: &mut VideoScan,
    ) -> Result<(), EyeError> {
        if pending.is_empty() {
            return Ok(());
        }

        let frames = std::mem::replace(pending, Vec::with_capacity(self.config.batch_size));
        let size = frames.len();
        let batch = FrameBatch::new(report.batches_enqueued, source.clone(), self.config.sample_stride, frames)?;
        producer.enqueue_cancellable(batch, &self.shutdown, self.config.dequeue_timeout())?;

        debug!("Enqueued batch {} ({} frames) from {}", report.batches_enqueued, size, source.name());
        report.batches_enqueued += 1;
        scan.batch_sizes.push(size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{BatchQueue, Dequeued};
    use crate::video::{InMemoryBackend, SyntheticClip};
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup(files: &[&str]) -> (TempDir, PipelineConfig) {
        let dir = TempDir::new().unwrap();
        for name in files {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let mut config = PipelineConfig::default();
        config.input_dir = dir.path().to_path_buf();
        config.dequeue_timeout_ms = 10;
        (dir, config)
    }

    fn drain(consumer: &crate::queue::BatchConsumer) -> Vec<FrameBatch> {
        let mut batches = Vec::new();
        loop {
            match consumer.try_dequeue() {
                Dequeued::Batch(b) => batches.push(b),
                Dequeued::TimedOut => panic!("queue should be completed"),
                Dequeued::Drained => return batches,
            }
        }
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let (_dir, config) = setup(&["b.mov", "a.MP4", "notes.txt", "c.avi", "d.mkv"]);
        let batcher = FrameBatcher::new(Arc::new(config), Arc::new(InMemoryBackend::new()), ShutdownToken::new());
        let names: Vec<String> = batcher
            .discover_videos()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.MP4", "b.mov", "c.avi"]);
    }

    #[test]
    fn test_unreadable_entry_does_not_stop_listing() {
        let (dir, config) = setup(&["b.mp4", "a.mp4"]);
        let batcher = FrameBatcher::new(Arc::new(config), Arc::new(InMemoryBackend::new()), ShutdownToken::new());
        let entries = vec![
            Ok(dir.path().join("b.mp4")),
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "stale handle")),
            Ok(dir.path().join("a.mp4")),
        ];

        let videos = batcher.collect_videos(entries);
        assert_eq!(videos, vec![dir.path().join("a.mp4"), dir.path().join("b.mp4")]);
    }

    #[test]
    fn test_sampling_and_batching() {
        let (_dir, config) = setup(&["a.mp4"]);
        // 130 frames, stride 12 -> frames 12..=120, 10 samples -> batches of 5 + 5
        let backend = InMemoryBackend::new().with_clip("a.mp4", SyntheticClip::new(130, 4, 4));
        let (producer, consumer) = BatchQueue::bounded(16).unwrap();

        let report = FrameBatcher::new(Arc::new(config), Arc::new(backend), ShutdownToken::new())
            .run(producer)
            .unwrap();

        assert_eq!(report.frames_read, 130);
        assert_eq!(report.frames_sampled, 10);
        assert_eq!(report.videos[0].batch_sizes, vec![5, 5]);

        let batches = drain(&consumer);
        let indices: Vec<u64> = batches.iter().flat_map(|b| b.frames().iter().map(|f| f.index)).collect();
        assert_eq!(indices, (1..=10).map(|i| i * 12).collect::<Vec<_>>());
        assert_eq!(batches[0].sequence(), 0);
        assert_eq!(batches[1].sequence(), 1);
    }

    #[test]
    fn test_partial_trailing_batch_per_video() {
        let (_dir, config) = setup(&["a.mp4", "b.mp4"]);
        let backend = InMemoryBackend::new()
            .with_clip("a.mp4", SyntheticClip::new(84, 4, 4)) // 7 samples
            .with_clip("b.mp4", SyntheticClip::new(24, 4, 4)); // 2 samples
        let (producer, consumer) = BatchQueue::bounded(16).unwrap();

        let report = FrameBatcher::new(Arc::new(config), Arc::new(backend), ShutdownToken::new())
            .run(producer)
            .unwrap();

        assert_eq!(report.videos[0].batch_sizes, vec![5, 2]);
        assert_eq!(report.videos[1].batch_sizes, vec![2]);

        let batches = drain(&consumer);
        let sources: Vec<String> = batches.iter().map(|b| b.source().name()).collect();
        assert_eq!(sources, vec!["a.mp4", "a.mp4", "b.mp4"]);
    }

    #[test]
    fn test_failing_source_is_skipped() {
        let (_dir, config) = setup(&["a.mp4", "b.mp4", "c.mp4"]);
        let backend = InMemoryBackend::new()
            .with_clip("a.mp4", SyntheticClip::new(24, 4, 4))
            .with_clip("c.mp4", SyntheticClip::new(24, 4, 4));
        backend.register_unopenable("b.mp4");
        let (producer, consumer) = BatchQueue::bounded(16).unwrap();

        let report = FrameBatcher::new(Arc::new(config), Arc::new(backend), ShutdownToken::new())
            .run(producer)
            .unwrap();

        assert_eq!(report.videos_seen, 3);
        assert_eq!(report.videos_failed, 1);
        assert!(report.videos[1].error.is_some());
        assert_eq!(drain(&consumer).len(), 2);
    }

    #[test]
    fn test_decode_error_flushes_sampled_frames() {
        let (_dir, config) = setup(&["a.mp4"]);
        let backend = InMemoryBackend::new()
            .with_clip("a.mp4", SyntheticClip::new(100, 4, 4).failing_after(40));
        let (producer, consumer) = BatchQueue::bounded(16).unwrap();

        let report = FrameBatcher::new(Arc::new(config), Arc::new(backend), ShutdownToken::new())
            .run(producer)
            .unwrap();

        assert_eq!(report.videos[0].frames_read, 40);
        assert_eq!(report.videos[0].batch_sizes, vec![3]);
        assert!(report.videos[0].error.is_some());
        assert_eq!(drain(&consumer).len(), 1);
    }

    #[test]
    fn test_missing_input_dir_still_completes() {
        let (dir, mut config) = setup(&[]);
        config.input_dir = dir.path().join("nope");
        let (producer, consumer) = BatchQueue::bounded(4).unwrap();

        let result = FrameBatcher::new(Arc::new(config), Arc::new(InMemoryBackend::new()), ShutdownToken::new())
            .run(producer);

        assert!(matches!(result, Err(EyeError::Source(_))));
        assert!(matches!(consumer.dequeue(Duration::from_millis(5)), Dequeued::Drained));
    }

    #[test]
    fn test_cancel_while_blocked_on_full_queue() {
        let (_dir, config) = setup(&["a.mp4"]);
        let backend = InMemoryBackend::new().with_clip("a.mp4", SyntheticClip::new(12 * 50, 2, 2));
        let (producer, consumer) = BatchQueue::bounded(1).unwrap();
        let token = ShutdownToken::new();

        let canceller = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            canceller.cancel();
        });

        let report = FrameBatcher::new(Arc::new(config), Arc::new(backend), token).run(producer).unwrap();
        handle.join().unwrap();

        assert!(report.cancelled);
        assert_eq!(report.batches_enqueued, 1);
        assert_eq!(consumer.len(), 1);
        assert!(consumer.stats().completed);
    }
}
