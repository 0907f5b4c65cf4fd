//! Mapping captured buffers to inference inputs.
//!
//! [`TensorDescriptor`] describes how a frame's bytes are laid out and
//! [`BufferMap`] caches one derived value per circulating buffer.

mod buffer_map;
mod tensor;

pub use buffer_map::BufferMap;
pub use tensor::{TensorDataType, TensorDescriptor, TensorError, TensorLayout};
