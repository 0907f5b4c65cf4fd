//! The frame provider: a background fetch loop feeding the freshest frame
//! to a consumer.
//!
//! Two threads meet here. The fetch thread, owned by the provider, blocks on
//! the backend for filled buffers and pushes them into the delivered queue.
//! The consumer thread takes the newest delivered frame and later returns
//! it. Both synchronize on a single mutex; a condition variable wakes the
//! consumer when a frame is delivered.

use super::queues::{FrameQueues, RecycleSource};
use crate::capture::{
    choose_stream_resolution, BufferId, BufferStrategy, CaptureBackend, CaptureError,
    FrameHandle, PixelFormat, Resolution, StreamSettings,
};
use crate::config::{ConfigError, ProviderConfig};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Number of buffers allocated on every stream.
pub const POOL_SIZE: usize = 8;

/// Pause after a failed fetch before asking the backend again.
const FETCH_RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Lifecycle of a [`FrameProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    /// Stream set up and primed, fetch thread not running.
    Constructed,
    /// Fetch thread running; consumer calls allowed.
    Streaming,
    /// Fetch thread stopped. Checked-out frames may still be returned.
    Stopped,
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderState::Constructed => "constructed",
            ProviderState::Streaming => "streaming",
            ProviderState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Errors reported by a [`FrameProvider`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid provider configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("capture stream setup failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("failed to spawn fetch thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
    #[error("fetch thread panicked")]
    ThreadPanicked,
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ProviderState,
    },
    #[error("no new frame within {0:?}")]
    Timeout(Duration),
    #[error("{0} does not belong to this provider")]
    ForeignBuffer(BufferId),
}

/// Snapshot of queue lengths and lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderStats {
    /// Frames waiting in the delivered queue.
    pub delivered: usize,
    /// Frames waiting in the processed queue.
    pub processed: usize,
    /// Frames received from the backend.
    pub frames_fetched: u64,
    /// Frames handed to the consumer.
    pub frames_taken: u64,
    /// Frames the consumer handed back.
    pub frames_returned: u64,
    /// Consumer-released buffers given back to the backend.
    pub recycled_processed: u64,
    /// Unconsumed buffers given back to keep the watermark.
    pub recycled_delivered: u64,
    /// Backend fetch calls that failed.
    pub fetch_failures: u64,
    /// Backend fetch calls that timed out.
    pub fetch_timeouts: u64,
    /// Recycles the backend refused.
    pub recycle_failures: u64,
}

struct Inner<T> {
    state: ProviderState,
    queues: FrameQueues<T>,
    stats: ProviderStats,
}

impl<T> Inner<T> {
    fn ensure(&self, allowed: &[ProviderState], operation: &'static str) -> Result<(), ProviderError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ProviderError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn snapshot(&self) -> ProviderStats {
        ProviderStats {
            delivered: self.queues.delivered_len(),
            processed: self.queues.processed_len(),
            ..self.stats.clone()
        }
    }
}

// Lock order: `inner` before `backend`.
struct Shared<B: CaptureBackend> {
    inner: Mutex<Inner<B::Buffer>>,
    frame_delivered: Condvar,
    backend: Mutex<B>,
    fetch_timeout: Duration,
}

/// Keeps the most recent frames of one capture stream available to a
/// consumer.
///
/// The provider is `Sync`: share it behind an [`Arc`] to call
/// [`latest_frame`](Self::latest_frame) from the consumer thread and
/// [`stop`](Self::stop) from elsewhere.
pub struct FrameProvider<B: CaptureBackend> {
    shared: Arc<Shared<B>>,
    fetcher: Mutex<Option<JoinHandle<()>>>,
    pool: BTreeSet<BufferId>,
    resolution: Resolution,
    format: PixelFormat,
}

impl<B: CaptureBackend> FrameProvider<B> {
    /// Sets up a primed capture stream.
    ///
    /// Negotiates the resolution, opens the stream with explicit buffer
    /// management, allocates and enqueues [`POOL_SIZE`] buffers and starts
    /// the backend. On failure every buffer reference taken so far is
    /// released before the error is returned.
    pub fn new(mut backend: B, config: &ProviderConfig) -> Result<Self, ProviderError> {
        config.validate()?;

        let resolution = choose_stream_resolution(&mut backend, config.requested_resolution());
        let settings = StreamSettings {
            resolution,
            format: config.format,
            strategy: BufferStrategy::Explicit,
        };

        let pool = match prime_stream(&mut backend, &settings) {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!(error = %e, %resolution, "Could not create capture stream");
                backend.release_buffer_references();
                return Err(e.into());
            }
        };

        tracing::info!(
            %resolution,
            format = %config.format,
            queue_depth = config.queue_depth,
            buffers = pool.len(),
            "Frame provider created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: ProviderState::Constructed,
                    queues: FrameQueues::new(config.queue_depth),
                    stats: ProviderStats::default(),
                }),
                frame_delivered: Condvar::new(),
                backend: Mutex::new(backend),
                fetch_timeout: config.fetch_timeout(),
            }),
            fetcher: Mutex::new(None),
            pool,
            resolution,
            format: config.format,
        })
    }

    /// Spawns the fetch thread.
    pub fn start(&self) -> Result<(), ProviderError> {
        let mut fetcher = self.fetcher.lock();
        {
            let mut inner = self.shared.inner.lock();
            inner.ensure(&[ProviderState::Constructed], "start")?;
            inner.state = ProviderState::Streaming;
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("frame-fetch".into())
            .spawn(move || fetch_loop(shared));

        match spawned {
            Ok(handle) => {
                *fetcher = Some(handle);
                tracing::info!(resolution = %self.resolution, "Frame fetching started");
                Ok(())
            }
            Err(e) => {
                self.shared.inner.lock().state = ProviderState::Constructed;
                tracing::error!(error = %e, "Failed to start fetch thread");
                Err(ProviderError::ThreadSpawn(e))
            }
        }
    }

    /// Stops the fetch thread and waits for it to exit.
    ///
    /// Consumers blocked in [`latest_frame`](Self::latest_frame) wake up
    /// with [`ProviderError::InvalidState`]. The wait is bounded by the
    /// configured fetch timeout plus the backend's own responsiveness.
    /// Calling `stop` again is a no-op.
    pub fn stop(&self) -> Result<(), ProviderError> {
        let mut fetcher = self.fetcher.lock();
        {
            let mut inner = self.shared.inner.lock();
            if inner.state == ProviderState::Stopped && fetcher.is_none() {
                return Ok(());
            }
            inner.state = ProviderState::Stopped;
        }
        self.shared.frame_delivered.notify_all();

        if let Some(handle) = fetcher.take() {
            handle.join().map_err(|_| ProviderError::ThreadPanicked)?;
            tracing::info!(stats = ?self.stats(), "Frame fetching stopped");
        }
        Ok(())
    }

    /// Blocks until a frame newer than the last one taken is delivered and
    /// returns it.
    ///
    /// Only the newest frame is ever handed out. Older undelivered frames
    /// are left for the fetch loop to recycle.
    pub fn latest_frame(&self) -> Result<B::Buffer, ProviderError> {
        self.take_latest(None)
    }

    /// Like [`latest_frame`](Self::latest_frame) but gives up after
    /// `timeout`.
    pub fn latest_frame_timeout(&self, timeout: Duration) -> Result<B::Buffer, ProviderError> {
        self.take_latest(Some((Instant::now() + timeout, timeout)))
    }

    fn take_latest(&self, deadline: Option<(Instant, Duration)>) -> Result<B::Buffer, ProviderError> {
        let mut inner = self.shared.inner.lock();
        loop {
            inner.ensure(&[ProviderState::Streaming], "get latest frame")?;

            if let Some(frame) = inner.queues.take_latest() {
                inner.stats.frames_taken += 1;
                tracing::trace!(id = %frame.id(), sequence = frame.metadata().sequence, "Frame checked out");
                return Ok(frame);
            }

            match deadline {
                None => self.shared.frame_delivered.wait(&mut inner),
                Some((at, timeout)) => {
                    if self
                        .shared
                        .frame_delivered
                        .wait_until(&mut inner, at)
                        .timed_out()
                        && !inner.queues.has_fresh()
                    {
                        inner.ensure(&[ProviderState::Streaming], "get latest frame")?;
                        return Err(ProviderError::Timeout(timeout));
                    }
                }
            }
        }
    }

    /// Hands a checked-out frame back for recycling.
    ///
    /// Allowed while streaming and after [`stop`](Self::stop).
    pub fn return_frame(&self, frame: B::Buffer) -> Result<(), ProviderError> {
        let id = frame.id();
        if !self.pool.contains(&id) {
            tracing::warn!(%id, "Rejected frame from a different pool");
            return Err(ProviderError::ForeignBuffer(id));
        }

        let mut inner = self.shared.inner.lock();
        inner.ensure(
            &[ProviderState::Streaming, ProviderState::Stopped],
            "return frame",
        )?;
        inner.queues.push_processed(frame);
        inner.stats.frames_returned += 1;
        Ok(())
    }

    pub fn state(&self) -> ProviderState {
        self.shared.inner.lock().state
    }

    /// Current queue lengths and counters.
    pub fn stats(&self) -> ProviderStats {
        self.shared.inner.lock().snapshot()
    }

    /// Negotiated stream resolution.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Ids of every buffer allocated for this stream.
    pub fn pool(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.pool.iter().copied()
    }
}

impl<B: CaptureBackend> Drop for FrameProvider<B> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "Fetch thread did not stop cleanly");
        }

        let dropped = self.shared.inner.lock().queues.drain().count();
        self.shared.backend.lock().release_buffer_references();
        tracing::info!(dropped, "Frame provider destroyed");
    }
}

fn prime_stream<B: CaptureBackend>(
    backend: &mut B,
    settings: &StreamSettings,
) -> Result<BTreeSet<BufferId>, CaptureError> {
    backend.open_stream(settings)?;

    let mut pool = BTreeSet::new();
    for _ in 0..POOL_SIZE {
        let buffer = backend.allocate_buffer()?;
        pool.insert(buffer.id());
        backend.enqueue_buffer(buffer)?;
    }

    backend.start_stream()?;
    Ok(pool)
}

fn fetch_loop<B: CaptureBackend>(shared: Arc<Shared<B>>) {
    tracing::debug!("Fetch loop running");

    while shared.inner.lock().state == ProviderState::Streaming {
        let fetched = shared.backend.lock().next_filled_buffer(shared.fetch_timeout);

        let buffer = match fetched {
            Ok(buffer) => buffer,
            Err(CaptureError::Timeout(_)) => {
                shared.inner.lock().stats.fetch_timeouts += 1;
                tracing::trace!("No frame from backend yet");
                continue;
            }
            Err(e) => {
                shared.inner.lock().stats.fetch_failures += 1;
                tracing::warn!(error = %e, "Failed fetching frame from backend");
                thread::sleep(FETCH_RETRY_BACKOFF);
                continue;
            }
        };

        let mut inner = shared.inner.lock();

        if inner.state != ProviderState::Streaming {
            // Stopped while we were waiting: nothing more gets delivered.
            if let Err(e) = shared.backend.lock().enqueue_buffer(buffer) {
                tracing::warn!(error = %e, "Failed returning late frame to backend");
            }
            break;
        }

        inner.stats.frames_fetched += 1;
        tracing::trace!(
            id = %buffer.id(),
            sequence = buffer.metadata().sequence,
            "Frame delivered"
        );

        if let Some((old, source)) = inner.queues.deliver(buffer) {
            let id = old.id();
            match shared.backend.lock().enqueue_buffer(old) {
                Ok(()) => match source {
                    RecycleSource::Processed => inner.stats.recycled_processed += 1,
                    RecycleSource::Delivered => inner.stats.recycled_delivered += 1,
                },
                Err(e) => {
                    inner.stats.recycle_failures += 1;
                    tracing::warn!(%id, error = %e, "Failed enqueueing buffer to backend");
                }
            }
        }

        shared.frame_delivered.notify_one();
    }

    tracing::debug!("Fetch loop exited");
}
