//! Bounded FIFO of frame batches with a one-shot completion flag
//!
//! The producer half blocks while the queue is full, which caps memory at
//! `capacity` batches regardless of decode speed. The consumer half stops
//! only once the producer has completed *and* every buffered batch has been
//! handed out.

use crate::error::EyeError;
use crate::shutdown::ShutdownToken;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError};
use framesift_core::FrameBatch;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
struct QueueState {
    capacity: usize,
    completed: AtomicBool,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    /// Batches reserved by the producer and not yet taken by the consumer
    occupancy: AtomicUsize,
    peak: AtomicUsize,
}

impl QueueState {
    fn reserve(&self) {
        self.occupancy.fetch_add(1, Ordering::AcqRel);
    }

    fn release(&self) {
        self.occupancy.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Point-in-time view of queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub capacity: usize,
    pub enqueued: u64,
    pub dequeued: u64,
    /// Batches currently buffered
    pub len: usize,
    /// Highest occupancy counted after a successful enqueue. A batch the
    /// consumer has just taken may still be counted once, so this can read
    /// at most `capacity + 1`.
    pub peak: usize,
    pub completed: bool,
}

/// Outcome of a dequeue attempt.
#[derive(Debug)]
pub enum Dequeued {
    Batch(FrameBatch),
    /// Nothing arrived in time; the producer may still be running
    TimedOut,
    /// Producer completed and the queue is empty; nothing will ever arrive
    Drained,
}

pub struct BatchQueue;

impl BatchQueue {
    /// Create a queue holding at most `capacity` batches.
    pub fn bounded(capacity: usize) -> Result<(BatchProducer, BatchConsumer), EyeError> {
        if capacity == 0 {
            return Err(EyeError::Config("queue capacity must be > 0".to_string()));
        }

        let (sender, receiver) = channel::bounded(capacity);
        let state = Arc::new(QueueState {
            capacity,
            completed: AtomicBool::new(false),
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            occupancy: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });

        Ok((
            BatchProducer {
                sender: Some(sender),
                state: state.clone(),
            },
            BatchConsumer {
                receiver,
                monitor: QueueMonitor { state },
            },
        ))
    }
}

/// Sending half. Completing it, explicitly or by drop, raises the completion flag.
pub struct BatchProducer {
    sender: Option<Sender<FrameBatch>>,
    state: Arc<QueueState>,
}

impl BatchProducer {
    /// Enqueue a batch, blocking while the queue is at capacity.
    pub fn enqueue(&self, batch: FrameBatch) -> Result<(), EyeError> {
        let sender = self.sender()?;
        self.state.reserve();
        if sender.send(batch).is_err() {
            self.state.release();
            return Err(EyeError::Queue("consumer disconnected".to_string()));
        }
        self.record_send();
        Ok(())
    }

    /// Enqueue a batch, waking every `poll` to observe `shutdown`.
    ///
    /// Returns [`EyeError::Cancelled`] without enqueuing if shutdown is requested
    /// while the queue is full.
    pub fn enqueue_cancellable(
        &self,
        batch: FrameBatch,
        shutdown: &ShutdownToken,
        poll: Duration,
    ) -> Result<(), EyeError> {
        let sender = self.sender()?;
        let mut pending = batch;
        // The reservation is held across retries and given back on every failure
        self.state.reserve();
        loop {
            if shutdown.is_cancelled() {
                self.state.release();
                return Err(EyeError::Cancelled);
            }
            match sender.send_timeout(pending, poll) {
                Ok(()) => {
                    self.record_send();
                    return Ok(());
                }
                Err(SendTimeoutError::Timeout(batch)) => {
                    debug!("Queue full, waiting to enqueue batch {}", batch.sequence());
                    pending = batch;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    self.state.release();
                    return Err(EyeError::Queue("consumer disconnected".to_string()));
                }
            }
        }
    }

    /// Signal that no further batches will be enqueued.
    pub fn complete(self) {
        drop(self);
    }

    pub fn is_full(&self) -> bool {
        self.sender.as_ref().map(|s| s.is_full()).unwrap_or(false)
    }

    fn sender(&self) -> Result<&Sender<FrameBatch>, EyeError> {
        self.sender
            .as_ref()
            .ok_or_else(|| EyeError::Queue("producer already completed".to_string()))
    }

    fn record_send(&self) {
        self.state.enqueued.fetch_add(1, Ordering::Release);
        let occupancy = self.state.occupancy.load(Ordering::Acquire);
        self.state.peak.fetch_max(occupancy, Ordering::Relaxed);
    }
}

impl Drop for BatchProducer {
    fn drop(&mut self) {
        // Flag first: anyone who sees it set also sees every prior send.
        if !self.state.completed.swap(true, Ordering::AcqRel) {
            debug!(
                "Batch queue completed after {} batches",
                self.state.enqueued.load(Ordering::Relaxed)
            );
        }
        self.sender.take();
    }
}

/// Receiving half.
pub struct BatchConsumer {
    receiver: Receiver<FrameBatch>,
    monitor: QueueMonitor,
}

impl BatchConsumer {
    /// Wait up to `timeout` for the next batch.
    pub fn dequeue(&self, timeout: Duration) -> Dequeued {
        match self.receiver.recv_timeout(timeout) {
            Ok(batch) => self.delivered(batch),
            Err(RecvTimeoutError::Timeout) => {
                if self.is_drained() {
                    Dequeued::Drained
                } else {
                    Dequeued::TimedOut
                }
            }
            // Disconnection is only reported once every sender is gone and the buffer is empty.
            Err(RecvTimeoutError::Disconnected) => Dequeued::Drained,
        }
    }

    /// Take the next batch if one is buffered, without waiting.
    pub fn try_dequeue(&self) -> Dequeued {
        match self.receiver.try_recv() {
            Ok(batch) => self.delivered(batch),
            Err(TryRecvError::Empty) => {
                if self.is_drained() {
                    Dequeued::Drained
                } else {
                    Dequeued::TimedOut
                }
            }
            Err(TryRecvError::Disconnected) => Dequeued::Drained,
        }
    }

    /// True once the producer completed and nothing is left to consume.
    pub fn is_drained(&self) -> bool {
        // Flag before emptiness: once completion is visible no send can race the check.
        self.monitor.is_completed() && self.receiver.is_empty()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Read-only handle for observing the queue from outside the consumer.
    pub fn monitor(&self) -> QueueMonitor {
        self.monitor.clone()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            len: self.receiver.len(),
            ..self.monitor.stats()
        }
    }

    fn delivered(&self, batch: FrameBatch) -> Dequeued {
        self.monitor.state.release();
        self.monitor.state.dequeued.fetch_add(1, Ordering::Release);
        Dequeued::Batch(batch)
    }
}

/// Counter-only observer. Holds no channel endpoint, so it never keeps the
/// queue alive or affects disconnection.
#[derive(Debug, Clone)]
pub struct QueueMonitor {
    state: Arc<QueueState>,
}

impl QueueMonitor {
    pub fn is_completed(&self) -> bool {
        self.state.completed.load(Ordering::Acquire)
    }

    /// Completed and every enqueued batch has been handed to the consumer.
    pub fn is_drained(&self) -> bool {
        if !self.is_completed() {
            return false;
        }
        let enqueued = self.state.enqueued.load(Ordering::Acquire);
        self.state.dequeued.load(Ordering::Acquire) >= enqueued
    }

    pub fn stats(&self) -> QueueStats {
        let enqueued = self.state.enqueued.load(Ordering::Acquire);
        let dequeued = self.state.dequeued.load(Ordering::Acquire);
        QueueStats {
            capacity: self.state.capacity,
            enqueued,
            dequeued,
            len: enqueued.saturating_sub(dequeued) as usize,
            peak: self.state.peak.load(Ordering::Relaxed),
            completed: self.is_completed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framesift_core::{Frame, VideoSource};
    use image::RgbImage;
    use std::path::PathBuf;
    use std::thread;
    use std::time::Instant;

    fn batch(sequence: u64) -> FrameBatch {
        let source = Arc::new(VideoSource {
            path: PathBuf::from("q.mp4"),
            frame_count: None,
            fps: None,
            width: 2,
            height: 2,
        });
        FrameBatch::new(sequence, source, 1, vec![Frame::new(1, RgbImage::new(2, 2))]).unwrap()
    }

    fn expect_batch(result: Dequeued) -> FrameBatch {
        match result {
            Dequeued::Batch(b) => b,
            other => panic!("Expected batch, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(BatchQueue::bounded(0), Err(EyeError::Config(_))));
    }

    #[test]
    fn test_fifo_order() {
        let (producer, consumer) = BatchQueue::bounded(4).unwrap();
        for i in 0..4 {
            producer.enqueue(batch(i)).unwrap();
        }
        for i in 0..4 {
            let b = expect_batch(consumer.dequeue(Duration::from_millis(10)));
            assert_eq!(b.sequence(), i);
        }
    }

    #[test]
    fn test_empty_is_not_drained_before_completion() {
        let (_producer, consumer) = BatchQueue::bounded(2).unwrap();
        assert!(matches!(consumer.dequeue(Duration::from_millis(5)), Dequeued::TimedOut));
        assert!(matches!(consumer.try_dequeue(), Dequeued::TimedOut));
        assert!(!consumer.is_drained());
    }

    #[test]
    fn test_completed_with_items_drains_first() {
        let (producer, consumer) = BatchQueue::bounded(8).unwrap();
        for i in 0..3 {
            producer.enqueue(batch(i)).unwrap();
        }
        producer.complete();

        assert!(consumer.stats().completed);
        assert!(!consumer.is_drained());
        for i in 0..3 {
            assert_eq!(expect_batch(consumer.try_dequeue()).sequence(), i);
        }
        assert!(consumer.is_drained());
        assert!(matches!(consumer.dequeue(Duration::from_millis(5)), Dequeued::Drained));
    }

    #[test]
    fn test_drop_completes_queue() {
        let (producer, consumer) = BatchQueue::bounded(2).unwrap();
        drop(producer);
        assert!(matches!(consumer.try_dequeue(), Dequeued::Drained));
    }

    #[test]
    fn test_enqueue_blocks_at_capacity() {
        let (producer, consumer) = BatchQueue::bounded(1).unwrap();
        producer.enqueue(batch(0)).unwrap();
        assert!(producer.is_full());

        let handle = thread::spawn(move || {
            let start = Instant::now();
            producer.enqueue(batch(1)).unwrap();
            start.elapsed()
        });

        thread::sleep(Duration::from_millis(50));
        assert_eq!(expect_batch(consumer.dequeue(Duration::from_millis(10))).sequence(), 0);
        let waited = handle.join().unwrap();
        assert!(waited >= Duration::from_millis(40));
        assert_eq!(expect_batch(consumer.dequeue(Duration::from_millis(100))).sequence(), 1);
        assert!((1..=2).contains(&consumer.stats().peak));
    }

    #[test]
    fn test_cancellable_enqueue_gives_up() {
        let (producer, _consumer) = BatchQueue::bounded(1).unwrap();
        let token = ShutdownToken::new();
        producer.enqueue_cancellable(batch(0), &token, Duration::from_millis(5)).unwrap();

        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        let result = producer.enqueue_cancellable(batch(1), &token, Duration::from_millis(5));
        handle.join().unwrap();
        assert!(matches!(result, Err(EyeError::Cancelled)));
        assert_eq!(producer.state.enqueued.load(Ordering::Relaxed), 1);
        assert_eq!(producer.state.occupancy.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_enqueue_after_consumer_dropped() {
        let (producer, consumer) = BatchQueue::bounded(1).unwrap();
        let _monitor = consumer.monitor();
        drop(consumer);
        assert!(matches!(producer.enqueue(batch(0)), Err(EyeError::Queue(_))));
        assert_eq!(producer.state.occupancy.load(Ordering::Relaxed), 0);
        assert_eq!(producer.state.peak.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_peak_tracks_occupancy_not_channel_len() {
        let (producer, consumer) = BatchQueue::bounded(4).unwrap();
        for i in 0..3 {
            producer.enqueue(batch(i)).unwrap();
        }
        for _ in 0..3 {
            expect_batch(consumer.try_dequeue());
        }
        producer.enqueue(batch(3)).unwrap();

        let stats = consumer.stats();
        assert_eq!(stats.peak, 3);
        assert_eq!(consumer.monitor.state.occupancy.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_stats() {
        let (producer, consumer) = BatchQueue::bounded(3).unwrap();
        let monitor = consumer.monitor();
        producer.enqueue(batch(0)).unwrap();
        producer.enqueue(batch(1)).unwrap();
        let _ = consumer.try_dequeue();

        let stats = monitor.stats();
        assert_eq!(stats.capacity, 3);
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.dequeued, 1);
        assert_eq!(stats.len, 1);
        assert_eq!(stats.peak, 2);
        assert!(!stats.completed);
    }
}
