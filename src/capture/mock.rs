//! Software capture backend.
//!
//! `MockBackend` behaves like a vendor capture service with an explicit
//! buffer strategy: buffers must be enqueued before they can be filled and
//! are handed out oldest-enqueued first. Frames are produced either at a
//! fixed rate or on demand through a [`MockController`], which also lets
//! tests inject failures and observe every buffer movement.

use super::{
    BufferId, CaptureBackend, CaptureError, FrameHandle, FrameMetadata, Resolution,
    StreamSettings,
};
use crate::config::MockConfig;
use chrono::Utc;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// When the mock backend considers the next frame captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePacing {
    /// One frame per interval, like a free-running sensor.
    Interval(Duration),
    /// One frame per [`MockController::trigger`] credit.
    Manual,
}

/// Buffer handle produced by [`MockBackend`].
#[derive(Debug)]
pub struct MockBuffer {
    id: BufferId,
    data: Vec<u8>,
    meta: FrameMetadata,
}

impl FrameHandle for MockBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn metadata(&self) -> &FrameMetadata {
        &self.meta
    }
}

#[derive(Debug, Default)]
struct Faults {
    resolution_query: bool,
    open: bool,
    allocation_at: Option<u32>,
    fetches: u32,
    enqueues: u32,
}

#[derive(Debug, Default)]
struct MockState {
    settings: Option<StreamSettings>,
    started: bool,
    released: bool,
    allocated: u32,
    queued: VecDeque<MockBuffer>,
    credits: u64,
    next_due: Option<Instant>,
    sequence: u64,
    faults: Faults,
    primed: Vec<BufferId>,
    recycled: Vec<BufferId>,
    fetched: Vec<BufferId>,
    lost: Vec<BufferId>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MockState>,
    changed: Condvar,
}

/// In-process capture backend for demos and tests.
#[derive(Debug)]
pub struct MockBackend {
    shared: Arc<Shared>,
    resolutions: Vec<Resolution>,
    pacing: FramePacing,
}

impl MockBackend {
    pub fn new(resolutions: Vec<Resolution>, pacing: FramePacing) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            resolutions,
            pacing,
        }
    }

    /// Free-running backend at the configured frame rate.
    pub fn from_config(config: &MockConfig) -> Self {
        let interval = Duration::from_secs(1) / config.fps.max(1);
        Self::new(config.resolutions.clone(), FramePacing::Interval(interval))
    }

    /// Backend that only produces frames when triggered.
    pub fn manual(resolutions: Vec<Resolution>) -> Self {
        Self::new(resolutions, FramePacing::Manual)
    }

    /// Returns a handle for driving and observing this backend.
    pub fn controller(&self) -> MockController {
        MockController {
            shared: Arc::clone(&self.shared),
        }
    }

    fn fill(state: &mut MockState, buffer: &mut MockBuffer) {
        let Some(settings) = state.settings.as_ref() else {
            return;
        };
        state.sequence += 1;
        let sequence = state.sequence;

        buffer.meta = FrameMetadata {
            width: settings.resolution.width,
            height: settings.resolution.height,
            pitch: settings.resolution.width,
            format: settings.format,
            sequence,
            captured_at: Utc::now(),
        };

        // Deterministic gradient shifted by the sequence number.
        let size = buffer.meta.frame_size();
        buffer.data.resize(size, 0);
        for (i, byte) in buffer.data.iter_mut().enumerate() {
            *byte = (i as u64).wrapping_add(sequence) as u8;
        }
    }
}

impl CaptureBackend for MockBackend {
    type Buffer = MockBuffer;

    fn list_supported_resolutions(&mut self) -> Result<Vec<Resolution>, CaptureError> {
        if self.shared.state.lock().faults.resolution_query {
            return Err(CaptureError::ResolutionQuery("injected query failure".into()));
        }
        Ok(self.resolutions.clone())
    }

    fn open_stream(&mut self, settings: &StreamSettings) -> Result<(), CaptureError> {
        let mut state = self.shared.state.lock();
        if state.faults.open {
            return Err(CaptureError::OpenFailed("injected open failure".into()));
        }
        tracing::info!(
            resolution = %settings.resolution,
            format = %settings.format,
            strategy = ?settings.strategy,
            "MockBackend stream opened"
        );
        state.settings = Some(settings.clone());
        Ok(())
    }

    fn allocate_buffer(&mut self) -> Result<MockBuffer, CaptureError> {
        let mut state = self.shared.state.lock();
        let settings = state.settings.as_ref().ok_or(CaptureError::NotOpen)?;
        if state.faults.allocation_at == Some(state.allocated) {
            return Err(CaptureError::AllocationFailed(format!(
                "injected failure at buffer {}",
                state.allocated
            )));
        }

        let (width, height, format) = (
            settings.resolution.width,
            settings.resolution.height,
            settings.format,
        );
        let buffer = MockBuffer {
            id: BufferId(state.allocated),
            data: vec![0u8; format.frame_size(width, height)],
            meta: FrameMetadata::empty(width, height, format),
        };
        state.allocated += 1;
        Ok(buffer)
    }

    fn enqueue_buffer(&mut self, buffer: MockBuffer) -> Result<(), CaptureError> {
        let mut state = self.shared.state.lock();
        let id = buffer.id;
        if state.settings.is_none() {
            state.lost.push(id);
            return Err(CaptureError::NotOpen);
        }
        if state.faults.enqueues > 0 {
            state.faults.enqueues -= 1;
            state.lost.push(id);
            self.shared.changed.notify_all();
            return Err(CaptureError::EnqueueFailed {
                id,
                reason: "injected enqueue failure".into(),
            });
        }

        if state.started {
            state.recycled.push(id);
        } else {
            state.primed.push(id);
        }
        state.queued.push_back(buffer);
        self.shared.changed.notify_all();
        Ok(())
    }

    fn start_stream(&mut self) -> Result<(), CaptureError> {
        let mut state = self.shared.state.lock();
        if state.settings.is_none() {
            return Err(CaptureError::StartFailed("stream not open".into()));
        }
        state.started = true;
        state.next_due = Some(Instant::now());
        Ok(())
    }

    fn next_filled_buffer(&mut self, timeout: Duration) -> Result<MockBuffer, CaptureError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        if !state.started {
            return Err(CaptureError::NotOpen);
        }
        if state.faults.fetches > 0 {
            state.faults.fetches -= 1;
            return Err(CaptureError::FetchFailed("injected fetch failure".into()));
        }

        loop {
            let now = Instant::now();
            let due = match self.pacing {
                FramePacing::Manual => state.credits > 0,
                FramePacing::Interval(_) => state.next_due.map_or(true, |due| now >= due),
            };

            if due {
                if let Some(mut buffer) = state.queued.pop_front() {
                    match self.pacing {
                        FramePacing::Manual => state.credits -= 1,
                        FramePacing::Interval(interval) => state.next_due = Some(now + interval),
                    }
                    Self::fill(&mut state, &mut buffer);
                    state.fetched.push(buffer.id);
                    self.shared.changed.notify_all();
                    return Ok(buffer);
                }
            }

            if now >= deadline {
                return Err(CaptureError::Timeout(timeout));
            }

            let wake = match (self.pacing, state.next_due) {
                (FramePacing::Interval(_), Some(due)) if due > now => due.min(deadline),
                _ => deadline,
            };
            self.shared.changed.wait_until(&mut state, wake);
        }
    }

    fn release_buffer_references(&mut self) {
        let mut state = self.shared.state.lock();
        let dropped = state.queued.len();
        state.queued.clear();
        state.started = false;
        state.released = true;
        self.shared.changed.notify_all();
        tracing::debug!(dropped, "MockBackend released buffer references");
    }
}

/// Observation and fault-injection handle for a [`MockBackend`].
#[derive(Debug, Clone)]
pub struct MockController {
    shared: Arc<Shared>,
}

impl MockController {
    /// Allows `frames` more frames to be captured in manual pacing.
    pub fn trigger(&self, frames: u64) {
        self.shared.state.lock().credits += frames;
        self.shared.changed.notify_all();
    }

    /// Makes the next resolution query fail.
    pub fn fail_resolution_query(&self) {
        self.shared.state.lock().faults.resolution_query = true;
    }

    /// Makes opening the stream fail.
    pub fn fail_open(&self) {
        self.shared.state.lock().faults.open = true;
    }

    /// Makes allocation of the buffer with this pool index fail.
    pub fn fail_allocation_at(&self, index: u32) {
        self.shared.state.lock().faults.allocation_at = Some(index);
    }

    /// Makes the next `count` fetch calls fail.
    pub fn fail_next_fetches(&self, count: u32) {
        self.shared.state.lock().faults.fetches += count;
    }

    /// Makes the next `count` enqueue calls fail.
    pub fn fail_next_enqueues(&self, count: u32) {
        self.shared.state.lock().faults.enqueues += count;
    }

    /// Buffers currently waiting inside the backend to be filled.
    pub fn queued(&self) -> Vec<BufferId> {
        self.shared.state.lock().queued.iter().map(|b| b.id).collect()
    }

    /// Buffers enqueued before the stream started, in order.
    pub fn primed(&self) -> Vec<BufferId> {
        self.shared.state.lock().primed.clone()
    }

    /// Buffers enqueued after the stream started, in order.
    pub fn recycled(&self) -> Vec<BufferId> {
        self.shared.state.lock().recycled.clone()
    }

    /// Buffers handed out filled, in order.
    pub fn fetched(&self) -> Vec<BufferId> {
        self.shared.state.lock().fetched.clone()
    }

    /// Buffers dropped by failed enqueues.
    pub fn lost(&self) -> Vec<BufferId> {
        self.shared.state.lock().lost.clone()
    }

    /// Number of buffers allocated on the stream.
    pub fn allocated(&self) -> u32 {
        self.shared.state.lock().allocated
    }

    pub fn is_started(&self) -> bool {
        self.shared.state.lock().started
    }

    /// True once buffer references have been released.
    pub fn is_released(&self) -> bool {
        self.shared.state.lock().released
    }

    /// Blocks until at least `count` recycles were recorded.
    pub fn wait_for_recycles(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.recycled.len() >= count)
    }

    /// Blocks until at least `count` buffers were handed out.
    pub fn wait_for_fetches(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.fetched.len() >= count)
    }

    fn wait_until(&self, timeout: Duration, mut done: impl FnMut(&MockState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !done(&*state) {
            if self
                .shared
                .changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return done(&*state);
            }
        }
        true
    }
}
