//! Producer/consumer frame buffering.
//!
//! A [`FrameProvider`] owns a pool of [`POOL_SIZE`] capture buffers. A
//! background thread keeps the newest `queue_depth` frames available while
//! recycling everything else back to the backend, so a slow consumer always
//! sees the most recent image without starving the sensor.

mod frame_provider;
mod queues;

pub use frame_provider::{FrameProvider, ProviderError, ProviderState, ProviderStats, POOL_SIZE};
pub use queues::{FrameQueues, RecycleSource};
