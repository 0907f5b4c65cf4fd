//! Frame metadata carried by every capture buffer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a buffer inside a backend's pool.
///
/// Ids are assigned by the backend at allocation time and never change
/// while the buffer circulates, so they can key per-buffer resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

/// Pixel layouts a capture stream can be configured for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Semi-planar YUV 4:2:0 (luma plane followed by interleaved chroma).
    #[default]
    Nv12,
    /// Interleaved 8-bit RGB.
    Rgb,
    /// Planar 8-bit RGB (three full-size planes).
    PlanarRgb,
}

impl PixelFormat {
    /// Number of bytes needed for one frame of the given dimensions.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        let pixels = (width as usize) * (height as usize);
        match self {
            PixelFormat::Nv12 => pixels * 3 / 2,
            PixelFormat::Rgb | PixelFormat::PlanarRgb => pixels * 3,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Rgb => "rgb",
            PixelFormat::PlanarRgb => "planar-rgb",
        };
        f.write_str(name)
    }
}

/// Per-frame metadata filled in by the backend when a buffer is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Row pitch in pixels (>= width).
    pub pitch: u32,
    /// Pixel layout of the data.
    pub format: PixelFormat,
    /// Capture sequence number, monotonic per stream.
    pub sequence: u64,
    /// Wall-clock capture time.
    pub captured_at: DateTime<Utc>,
}

impl FrameMetadata {
    /// Metadata of a buffer that has not been filled yet.
    pub fn empty(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            pitch: width,
            format,
            sequence: 0,
            captured_at: DateTime::<Utc>::default(),
        }
    }

    /// Expected payload size for these dimensions and format.
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.format.frame_size(self.pitch, self.height)
    }
}
