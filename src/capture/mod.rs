//! Capture backend contract and frame handling.
//!
//! This module describes the external capture service the frame provider
//! is built on: how streams are opened, how buffers circulate, and what
//! metadata a filled buffer carries. A software [`MockBackend`] implements
//! the contract for demos and tests.

mod backend;
mod frame;
mod mock;
mod resolution;

pub use backend::{BufferStrategy, CaptureBackend, CaptureError, FrameHandle, StreamSettings};
pub use frame::{BufferId, FrameMetadata, PixelFormat};
pub use mock::{FramePacing, MockBackend, MockBuffer, MockController};
pub use resolution::{best_fit, choose_stream_resolution, Resolution};
