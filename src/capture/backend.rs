//! Capture backend abstraction.
//!
//! The backend owns a pool of reusable frame buffers. It fills buffers that
//! were enqueued to it and hands them back, filled, on request. The frame
//! provider only moves buffer handles around; it never allocates or frees
//! the memory behind them.

use super::{BufferId, FrameMetadata, PixelFormat, Resolution};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a capture backend.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to query supported resolutions: {0}")]
    ResolutionQuery(String),
    #[error("failed to open stream: {0}")]
    OpenFailed(String),
    #[error("failed to start stream: {0}")]
    StartFailed(String),
    #[error("failed to allocate buffer: {0}")]
    AllocationFailed(String),
    #[error("failed to enqueue {id}: {reason}")]
    EnqueueFailed { id: BufferId, reason: String },
    #[error("failed to fetch frame: {0}")]
    FetchFailed(String),
    #[error("no frame within {0:?}")]
    Timeout(Duration),
    #[error("stream not open")]
    NotOpen,
}

/// How buffer recycling is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferStrategy {
    /// The client decides when buffers go back to the backend.
    Explicit,
}

/// Settings used to open a capture stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Negotiated native resolution.
    pub resolution: Resolution,
    /// Output pixel layout.
    pub format: PixelFormat,
    /// Buffer management strategy.
    pub strategy: BufferStrategy,
}

/// A handle to one backend-owned frame buffer.
///
/// Handles are move-only: whoever holds the value holds the buffer.
pub trait FrameHandle: Send + 'static {
    /// Stable pool identifier of this buffer.
    fn id(&self) -> BufferId;

    /// Raw pixel data of the last frame written into this buffer.
    fn data(&self) -> &[u8];

    /// Metadata of the last frame written into this buffer.
    fn metadata(&self) -> &FrameMetadata;
}

/// Trait for capture backend implementations.
///
/// This abstraction allows swapping between a vendor capture service and
/// the software [`MockBackend`](super::MockBackend) used for testing.
pub trait CaptureBackend: Send + 'static {
    /// Buffer handle type produced by this backend.
    type Buffer: FrameHandle;

    /// Lists the native resolutions the capture channel supports.
    fn list_supported_resolutions(&mut self) -> Result<Vec<Resolution>, CaptureError>;

    /// Opens and configures a stream.
    fn open_stream(&mut self, settings: &StreamSettings) -> Result<(), CaptureError>;

    /// Allocates one buffer on the open stream.
    fn allocate_buffer(&mut self) -> Result<Self::Buffer, CaptureError>;

    /// Hands a buffer to the backend to be filled.
    ///
    /// The handle is consumed even on failure; a failed enqueue takes the
    /// buffer out of circulation until the backend reclaims it.
    fn enqueue_buffer(&mut self, buffer: Self::Buffer) -> Result<(), CaptureError>;

    /// Starts frame production.
    fn start_stream(&mut self) -> Result<(), CaptureError>;

    /// Waits up to `timeout` for the next filled buffer.
    ///
    /// Returns [`CaptureError::Timeout`] when nothing arrived in time.
    fn next_filled_buffer(&mut self, timeout: Duration) -> Result<Self::Buffer, CaptureError>;

    /// Drops every buffer reference taken on the stream.
    fn release_buffer_references(&mut self);
}
