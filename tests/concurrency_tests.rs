use framesift_core::{Frame, FrameBatch, VideoSource};
use framesift_eye::{BatchQueue, Dequeued, EyeError, ShutdownToken};
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn source() -> Arc<VideoSource> {
    Arc::new(VideoSource {
        path: PathBuf::from("stress.mp4"),
        frame_count: None,
        fps: None,
        width: 1,
        height: 1,
    })
}

fn batch(source: &Arc<VideoSource>, sequence: u64) -> FrameBatch {
    FrameBatch::new(sequence, source.clone(), 1, vec![Frame::new(sequence + 1, RgbImage::new(1, 1))]).unwrap()
}

/// Consume until drained, returning sequence numbers in arrival order.
fn drain(consumer: &framesift_eye::BatchConsumer, delay: Duration) -> Vec<u64> {
    let mut seen = Vec::new();
    loop {
        match consumer.dequeue(Duration::from_millis(5)) {
            Dequeued::Batch(b) => {
                seen.push(b.sequence());
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
            Dequeued::TimedOut => continue,
            Dequeued::Drained => return seen,
        }
    }
}

#[test]
fn test_capacity_never_exceeded_under_load() {
    for capacity in [1usize, 2, 3, 8] {
        let (producer, consumer) = BatchQueue::bounded(capacity).unwrap();
        let src = source();

        let handle = thread::spawn(move || {
            for seq in 0..200 {
                producer.enqueue(batch(&src, seq)).unwrap();
            }
            producer.complete();
        });

        let seen = drain(&consumer, Duration::from_micros(200));
        handle.join().unwrap();

        let stats = consumer.stats();
        // The producer outpaces the consumer, so the queue must have filled
        assert!(stats.peak >= capacity, "peak {} never reached capacity {}", stats.peak, capacity);
        assert!(stats.peak <= capacity + 1, "peak {} > capacity {}", stats.peak, capacity);
        assert_eq!(stats.enqueued, 200);
        assert_eq!(stats.dequeued, 200);
        assert_eq!(seen, (0..200).collect::<Vec<_>>());
    }
}

#[test]
fn test_items_queued_at_completion_are_drained() {
    // Completion racing with the last enqueue must never drop queued batches
    for round in 0..200u64 {
        let (producer, consumer) = BatchQueue::bounded(8).unwrap();
        let src = source();
        let count = round % 8 + 1;

        let handle = thread::spawn(move || {
            for seq in 0..count {
                producer.enqueue(batch(&src, seq)).unwrap();
            }
            producer.complete();
        });

        let seen = drain(&consumer, Duration::ZERO);
        handle.join().unwrap();
        assert_eq!(seen.len() as u64, count, "round {}", round);
        assert!(consumer.is_drained());
    }
}

#[test]
fn test_drained_only_after_completion() {
    let (producer, consumer) = BatchQueue::bounded(4).unwrap();
    let src = source();
    producer.enqueue(batch(&src, 0)).unwrap();

    assert!(matches!(consumer.dequeue(Duration::from_millis(5)), Dequeued::Batch(_)));
    // Empty but not completed: the consumer must keep waiting
    assert!(matches!(consumer.dequeue(Duration::from_millis(5)), Dequeued::TimedOut));
    assert!(!consumer.is_drained());

    producer.complete();
    assert!(matches!(consumer.dequeue(Duration::from_millis(5)), Dequeued::Drained));
}

#[test]
fn test_producer_panic_still_completes_queue() {
    let (producer, consumer) = BatchQueue::bounded(4).unwrap();
    let src = source();

    let handle = thread::spawn(move || {
        producer.enqueue(batch(&src, 0)).unwrap();
        panic!("producer crashed");
    });
    assert!(handle.join().is_err());

    let seen = drain(&consumer, Duration::ZERO);
    assert_eq!(seen, vec![0]);
    assert!(consumer.stats().completed);
}

#[test]
fn test_cancel_unblocks_full_queue() {
    let (producer, consumer) = BatchQueue::bounded(1).unwrap();
    let token = ShutdownToken::new();
    let src = source();

    producer.enqueue(batch(&src, 0)).unwrap();

    let blocked_token = token.clone();
    let handle = thread::spawn(move || {
        producer.enqueue_cancellable(batch(&src, 1), &blocked_token, Duration::from_millis(5))
    });

    thread::sleep(Duration::from_millis(30));
    token.cancel();

    let result = handle.join().unwrap();
    assert!(matches!(result, Err(EyeError::Cancelled)));
    assert_eq!(consumer.len(), 1);
    assert!(consumer.stats().completed);
}

#[test]
fn test_many_round_trips_with_slow_consumer() {
    let (producer, consumer) = BatchQueue::bounded(2).unwrap();
    let monitor = consumer.monitor();
    let src = source();

    let handle = thread::spawn(move || {
        for seq in 0..50 {
            producer.enqueue(batch(&src, seq)).unwrap();
        }
    });

    let seen = drain(&consumer, Duration::from_millis(1));
    handle.join().unwrap();

    assert_eq!(seen.len(), 50);
    assert!(monitor.is_drained());
    let peak = monitor.stats().peak;
    assert!((2..=3).contains(&peak), "peak {}", peak);
}

#[test]
fn test_cancelled_enqueue_gives_back_its_slot() {
    let (producer, consumer) = BatchQueue::bounded(1).unwrap();
    let token = ShutdownToken::new();
    let src = source();
    producer.enqueue(batch(&src, 0)).unwrap();

    token.cancel();
    let result = producer.enqueue_cancellable(batch(&src, 1), &token, Duration::from_millis(5));
    assert!(matches!(result, Err(EyeError::Cancelled)));

    assert!(matches!(consumer.try_dequeue(), Dequeued::Batch(_)));
    producer.enqueue(batch(&src, 2)).unwrap();
    // A leaked reservation from the cancelled send would push this to 2
    assert_eq!(consumer.stats().peak, 1);
}
