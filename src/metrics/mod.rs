//! Prometheus metrics exporter for frame provider monitoring.
//!
//! Exposes provider queue state and frame flow in Prometheus format. The
//! HTTP endpoint is available with the `metrics` feature.
//!
//! # Metrics Exposed
//!
//! ## Queue Metrics
//! - `frame_provider_streaming` - Fetch loop running (1) or not (0)
//! - `frame_provider_delivered_queue_length` - Frames waiting for the consumer
//! - `frame_provider_processed_queue_length` - Returned frames awaiting recycling
//!
//! ## Frame Flow Metrics
//! - `frame_provider_frames_fetched_total` - Buffers received from the backend
//! - `frame_provider_frames_taken_total` - Frames handed to the consumer
//! - `frame_provider_frames_returned_total` - Frames returned by the consumer
//! - `frame_provider_recycled_total{source}` - Buffers given back to the backend
//! - `frame_provider_frame_age_seconds` - Capture-to-consume latency
//!
//! ## Failure Metrics
//! - `frame_provider_fetch_failures_total`
//! - `frame_provider_fetch_timeouts_total`
//! - `frame_provider_recycle_failures_total`
//!
//! # Example
//!
//! ```no_run
//! use frame_provider::metrics::{MetricsRegistry, MetricsSnapshot};
//! use frame_provider::provider::{ProviderState, ProviderStats};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let stats = ProviderStats {
//!     frames_fetched: 120,
//!     frames_taken: 30,
//!     ..Default::default()
//! };
//! registry.update(&MetricsSnapshot::from_stats(&stats, ProviderState::Streaming));
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
