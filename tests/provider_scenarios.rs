//! End-to-end behavior of the frame provider against the mock backend.

use frame_provider::capture::{
    BufferId, BufferStrategy, CaptureBackend, FrameHandle, FramePacing, MockBackend,
    MockController, PixelFormat, Resolution, StreamSettings,
};
use frame_provider::config::{ProviderConfig, MAX_QUEUE_DEPTH};
use frame_provider::provider::{FrameProvider, ProviderError, ProviderState, POOL_SIZE};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn config(queue_depth: usize) -> ProviderConfig {
    ProviderConfig {
        width: 64,
        height: 32,
        queue_depth,
        format: PixelFormat::Rgb,
        fetch_timeout_ms: 10,
    }
}

fn manual(queue_depth: usize) -> (FrameProvider<MockBackend>, MockController) {
    let backend = MockBackend::manual(vec![Resolution::new(64, 32)]);
    let ctl = backend.controller();
    let provider = FrameProvider::new(backend, &config(queue_depth)).unwrap();
    provider.start().unwrap();
    (provider, ctl)
}

fn free_running(queue_depth: usize) -> (FrameProvider<MockBackend>, MockController) {
    let backend = MockBackend::new(
        vec![Resolution::new(64, 32)],
        FramePacing::Interval(Duration::from_millis(1)),
    );
    let ctl = backend.controller();
    let provider = FrameProvider::new(backend, &config(queue_depth)).unwrap();
    provider.start().unwrap();
    (provider, ctl)
}

fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn test_oldest_frame_recycled_past_watermark() {
    let (provider, ctl) = manual(2);

    ctl.trigger(3);
    assert!(ctl.wait_for_recycles(1, WAIT));

    let stats = provider.stats();
    assert_eq!(stats.frames_fetched, 3);
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.recycled_delivered, 1);
    assert_eq!(ctl.recycled(), vec![BufferId(0)]);

    // The newest of {F2, F3} is handed out.
    let frame = provider.latest_frame().unwrap();
    assert_eq!(frame.id(), BufferId(2));
    assert_eq!(frame.metadata().sequence, 3);
    provider.return_frame(frame).unwrap();
}

#[test]
fn test_blocked_consumer_woken_by_delivery() {
    let (provider, ctl) = manual(2);
    let provider = Arc::new(provider);

    let consumer = {
        let provider = Arc::clone(&provider);
        thread::spawn(move || provider.latest_frame())
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!consumer.is_finished());

    ctl.trigger(1);
    let frame = consumer.join().unwrap().unwrap();
    assert_eq!(frame.id(), BufferId(0));
    assert_eq!(frame.metadata().sequence, 1);
    assert_eq!(provider.stats().delivered, 0);

    provider.return_frame(frame).unwrap();
}

#[test]
fn test_returned_frame_recycled_before_delivered() {
    let (provider, ctl) = manual(1);

    ctl.trigger(1);
    let f1 = provider.latest_frame_timeout(WAIT).unwrap();
    assert_eq!(f1.id(), BufferId(0));

    ctl.trigger(1);
    assert!(eventually(|| provider.stats().frames_fetched == 2));
    assert!(ctl.recycled().is_empty());

    provider.return_frame(f1).unwrap();
    ctl.trigger(1);
    assert!(ctl.wait_for_recycles(1, WAIT));

    let stats = provider.stats();
    assert_eq!(ctl.recycled(), vec![BufferId(0)]);
    assert_eq!(stats.recycled_processed, 1);
    assert_eq!(stats.recycled_delivered, 0);
    assert_eq!(stats.processed, 0);
    // Above the watermark of one until the next fetch trims it.
    assert_eq!(stats.delivered, 2);
}

#[test]
fn test_empty_resolution_list_uses_requested_size() {
    let backend = MockBackend::manual(Vec::new());
    let config = ProviderConfig {
        width: 300,
        height: 200,
        ..config(2)
    };
    let provider = FrameProvider::new(backend, &config).unwrap();
    assert_eq!(provider.resolution(), Resolution::new(300, 200));
}

#[test]
fn test_failed_resolution_query_uses_requested_size() {
    let backend = MockBackend::manual(vec![Resolution::new(1920, 1080)]);
    backend.controller().fail_resolution_query();
    let provider = FrameProvider::new(backend, &config(2)).unwrap();
    assert_eq!(provider.resolution(), Resolution::new(64, 32));
}

#[test]
fn test_negotiates_smallest_covering_resolution() {
    let backend = MockBackend::manual(vec![
        Resolution::new(1920, 1080),
        Resolution::new(640, 360),
        Resolution::new(1280, 720),
    ]);
    let provider = FrameProvider::new(backend, &config(2)).unwrap();
    assert_eq!(provider.resolution(), Resolution::new(640, 360));

    provider.start().unwrap();
    let frame = provider.latest_frame_timeout(Duration::from_millis(50));
    // Manual pacing without a trigger: nothing arrives.
    assert!(matches!(frame, Err(ProviderError::Timeout(_))));
}

#[test]
fn test_frames_handed_out_in_capture_order() {
    let (provider, _ctl) = free_running(2);

    let mut last = 0;
    for _ in 0..50 {
        let frame = provider.latest_frame_timeout(WAIT).unwrap();
        let sequence = frame.metadata().sequence;
        assert!(sequence > last, "{} after {}", sequence, last);
        last = sequence;
        provider.return_frame(frame).unwrap();
    }

    // Fifty frames out of a pool of eight means buffers were recycled.
    let stats = provider.stats();
    assert!(stats.frames_fetched >= 50);
    assert!(stats.recycled_processed + stats.recycled_delivered > 0);
}

#[test]
fn test_slow_consumer_at_deepest_queue_keeps_receiving() {
    let (provider, _ctl) = free_running(MAX_QUEUE_DEPTH);

    let mut last = 0;
    for _ in 0..30 {
        let frame = provider.latest_frame_timeout(WAIT).unwrap();
        let sequence = frame.metadata().sequence;
        assert!(sequence > last);
        last = sequence;

        // Hold the frame while newer ones arrive behind it.
        let fetched = provider.stats().frames_fetched;
        assert!(eventually(|| provider.stats().frames_fetched >= fetched + 2));
        thread::sleep(Duration::from_millis(5));
        provider.return_frame(frame).unwrap();
    }

    let stats = provider.stats();
    assert!(stats.delivered <= MAX_QUEUE_DEPTH + 1);
    assert_eq!(stats.recycle_failures, 0);
}

#[test]
fn test_buffers_conserved_across_shutdown() {
    let (provider, ctl) = free_running(3);

    let mut held = Vec::new();
    for i in 0..20 {
        let frame = provider.latest_frame_timeout(WAIT).unwrap();
        if i % 7 == 0 {
            held.push(frame);
        } else {
            provider.return_frame(frame).unwrap();
        }
    }
    provider.stop().unwrap();

    let stats = provider.stats();
    let accounted =
        stats.delivered + stats.processed + held.len() + ctl.queued().len() + ctl.lost().len();
    assert_eq!(accounted, POOL_SIZE);

    // Returning after stop is still accepted.
    for frame in held {
        provider.return_frame(frame).unwrap();
    }
    assert_eq!(provider.stats().processed, stats.processed + 3);
}

#[test]
fn test_failed_recycles_are_counted_and_survived() {
    let (provider, ctl) = manual(1);
    ctl.fail_next_enqueues(2);

    ctl.trigger(4);
    assert!(eventually(|| provider.stats().frames_fetched == 4));
    assert!(eventually(|| provider.stats().recycle_failures == 2));

    let stats = provider.stats();
    assert_eq!(ctl.lost().len(), 2);
    assert_eq!(stats.recycled_delivered, 1);

    let frame = provider.latest_frame_timeout(WAIT).unwrap();
    assert_eq!(frame.metadata().sequence, 4);
    provider.return_frame(frame).unwrap();
}

#[test]
fn test_stop_wakes_blocked_consumer() {
    let (provider, _ctl) = manual(2);
    let provider = Arc::new(provider);

    let consumer = {
        let provider = Arc::clone(&provider);
        thread::spawn(move || provider.latest_frame())
    };
    thread::sleep(Duration::from_millis(30));

    let started = Instant::now();
    provider.stop().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    let result = consumer.join().unwrap();
    assert!(matches!(
        result,
        Err(ProviderError::InvalidState {
            state: ProviderState::Stopped,
            ..
        })
    ));
}

#[test]
fn test_foreign_buffer_rejected() {
    let (provider, _ctl) = manual(2);

    let mut other = MockBackend::manual(Vec::new());
    other
        .open_stream(&StreamSettings {
            resolution: Resolution::new(64, 32),
            format: PixelFormat::Rgb,
            strategy: BufferStrategy::Explicit,
        })
        .unwrap();
    let stranger = (0..=POOL_SIZE)
        .map(|_| other.allocate_buffer().unwrap())
        .last()
        .unwrap();
    assert_eq!(stranger.id(), BufferId(POOL_SIZE as u32));

    assert!(matches!(
        provider.return_frame(stranger),
        Err(ProviderError::ForeignBuffer(BufferId(8)))
    ));
    assert_eq!(provider.stats().frames_returned, 0);
}

#[test]
fn test_drop_releases_everything() {
    let (provider, ctl) = free_running(2);
    let frame = provider.latest_frame_timeout(WAIT).unwrap();
    provider.return_frame(frame).unwrap();

    drop(provider);
    assert!(ctl.is_released());
    assert!(ctl.queued().is_empty());
    assert!(!ctl.is_started());
}
