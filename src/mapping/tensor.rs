//! Tensor descriptions of captured frames.
//!
//! An inference runtime consuming frames in place needs to know how the
//! bytes are laid out. Pitches are byte strides, outermost dimension first;
//! `pitches[0]` is the size of the whole tensor.

use crate::capture::{FrameMetadata, PixelFormat};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TensorDataType {
    Uint8,
}

/// Memory layout of a frame tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TensorLayout {
    /// Luma plane followed by interleaved half-resolution chroma.
    Yuv420Sp,
    /// Interleaved channels.
    Nhwc,
    /// One plane per channel.
    Nchw,
}

impl fmt::Display for TensorLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TensorLayout::Yuv420Sp => "420SP",
            TensorLayout::Nhwc => "NHWC",
            TensorLayout::Nchw => "NCHW",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TensorError {
    #[error("frame geometry {width}x{height} pitch {pitch} cannot describe a tensor")]
    InvalidGeometry { width: u32, height: u32, pitch: u32 },
    #[error("frame holds {actual} bytes, tensor needs {required}")]
    ShortBuffer { required: usize, actual: usize },
}

/// Data type, layout, dimensions and pitches of one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorDescriptor {
    pub data_type: TensorDataType,
    pub layout: TensorLayout,
    pub dims: Vec<usize>,
    pub pitches: Vec<usize>,
}

impl TensorDescriptor {
    /// Describes a frame from its metadata.
    pub fn from_metadata(meta: &FrameMetadata) -> Result<Self, TensorError> {
        if meta.width == 0 || meta.height == 0 || meta.pitch < meta.width {
            return Err(TensorError::InvalidGeometry {
                width: meta.width,
                height: meta.height,
                pitch: meta.pitch,
            });
        }

        let (w, h, pitch) = (
            meta.width as usize,
            meta.height as usize,
            meta.pitch as usize,
        );

        let descriptor = match meta.format {
            PixelFormat::Nv12 => {
                let row = pitch;
                let plane = h * row;
                Self {
                    data_type: TensorDataType::Uint8,
                    layout: TensorLayout::Yuv420Sp,
                    dims: vec![3, h, w],
                    pitches: vec![3 * plane / 2, plane, row],
                }
            }
            PixelFormat::Rgb => {
                let pixel = 3;
                let row = pitch * pixel;
                let image = h * row;
                Self {
                    data_type: TensorDataType::Uint8,
                    layout: TensorLayout::Nhwc,
                    dims: vec![1, h, w, 3],
                    pitches: vec![image, image, row, pixel],
                }
            }
            PixelFormat::PlanarRgb => {
                let row = pitch;
                let plane = h * row;
                let image = 3 * plane;
                Self {
                    data_type: TensorDataType::Uint8,
                    layout: TensorLayout::Nchw,
                    dims: vec![1, 3, h, w],
                    pitches: vec![image, image, plane, row],
                }
            }
        };
        Ok(descriptor)
    }

    /// Total bytes spanned by the tensor.
    pub fn byte_size(&self) -> usize {
        self.pitches.first().copied().unwrap_or(0)
    }

    /// Checks that `data` is large enough to back this tensor.
    pub fn check_buffer(&self, data: &[u8]) -> Result<(), TensorError> {
        let required = self.byte_size();
        if data.len() < required {
            return Err(TensorError::ShortBuffer {
                required,
                actual: data.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(width: u32, height: u32, pitch: u32, format: PixelFormat) -> FrameMetadata {
        FrameMetadata {
            pitch,
            ..FrameMetadata::empty(width, height, format)
        }
    }

    #[test]
    fn test_nv12_descriptor() {
        let t = TensorDescriptor::from_metadata(&meta(480, 270, 512, PixelFormat::Nv12)).unwrap();
        assert_eq!(t.layout, TensorLayout::Yuv420Sp);
        assert_eq!(t.dims, vec![3, 270, 480]);
        assert_eq!(t.pitches, vec![3 * 270 * 512 / 2, 270 * 512, 512]);
    }

    #[test]
    fn test_rgb_descriptor() {
        let t = TensorDescriptor::from_metadata(&meta(320, 240, 320, PixelFormat::Rgb)).unwrap();
        assert_eq!(t.layout, TensorLayout::Nhwc);
        assert_eq!(t.dims, vec![1, 240, 320, 3]);
        assert_eq!(t.pitches, vec![240 * 960, 240 * 960, 960, 3]);
        assert_eq!(t.byte_size(), 320 * 240 * 3);
    }

    #[test]
    fn test_planar_descriptor() {
        let t =
            TensorDescriptor::from_metadata(&meta(64, 48, 64, PixelFormat::PlanarRgb)).unwrap();
        assert_eq!(t.layout, TensorLayout::Nchw);
        assert_eq!(t.dims, vec![1, 3, 48, 64]);
        assert_eq!(t.pitches, vec![3 * 48 * 64, 3 * 48 * 64, 48 * 64, 64]);
    }

    #[test]
    fn test_size_matches_pixel_format() {
        for format in [PixelFormat::Nv12, PixelFormat::Rgb, PixelFormat::PlanarRgb] {
            let m = meta(32, 16, 32, format);
            let t = TensorDescriptor::from_metadata(&m).unwrap();
            assert_eq!(t.byte_size(), m.frame_size(), "{format}");
        }
    }

    #[test]
    fn test_invalid_geometry() {
        assert!(TensorDescriptor::from_metadata(&meta(0, 10, 10, PixelFormat::Rgb)).is_err());
        assert!(TensorDescriptor::from_metadata(&meta(10, 10, 8, PixelFormat::Rgb)).is_err());
    }

    #[test]
    fn test_short_buffer_detected() {
        let t = TensorDescriptor::from_metadata(&meta(4, 4, 4, PixelFormat::Rgb)).unwrap();
        assert!(t.check_buffer(&[0u8; 48]).is_ok());
        assert_eq!(
            t.check_buffer(&[0u8; 10]),
            Err(TensorError::ShortBuffer {
                required: 48,
                actual: 10
            })
        );
    }
}
