//! Frame Provider Library
//!
//! A bounded video buffer manager sitting between a camera capture service
//! and a slow consumer such as an inference engine. A background thread
//! fetches filled buffers continuously; the consumer always receives the
//! freshest frame, and buffers are recycled so the sensor never starves.
//!
//! # Architecture
//!
//! ```text
//! capture backend ──fetch──▶ delivered ──latest_frame──▶ consumer
//!        ▲                       │                          │
//!        └────── recycle ◀───────┴──── processed ◀──return──┘
//! ```
//!
//! # Design Principles
//!
//! - **Freshness over completeness**: stale frames are recycled, never queued
//! - **Bounded memory**: a fixed pool of buffers circulates forever
//! - **Single lock**: all queue state lives behind one mutex
//!
//! # Example
//!
//! ```no_run
//! use frame_provider::{
//!     capture::{FrameHandle, MockBackend},
//!     config::{MockConfig, ProviderConfig},
//!     provider::FrameProvider,
//! };
//!
//! let backend = MockBackend::from_config(&MockConfig::default());
//! let provider = FrameProvider::new(backend, &ProviderConfig::default()).unwrap();
//! provider.start().unwrap();
//!
//! for _ in 0..10 {
//!     let frame = provider.latest_frame().unwrap();
//!     println!("frame {} ({} bytes)", frame.metadata().sequence, frame.data().len());
//!     provider.return_frame(frame).unwrap();
//! }
//!
//! provider.stop().unwrap();
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod config;
pub mod mapping;
pub mod metrics;
pub mod provider;

// Re-export commonly used types at crate root
pub use capture::{CaptureBackend, FrameHandle, FrameMetadata, MockBackend, PixelFormat, Resolution};
pub use config::{ConfigError, FileConfig, ProviderConfig};
pub use mapping::{BufferMap, TensorDescriptor};
pub use provider::{FrameProvider, ProviderError, ProviderState, ProviderStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
