//! Provider and demo configuration.
//!
//! Configuration is plain data with serde support so it can be loaded from
//! a TOML file. Every section has defaults, so an empty file is valid.

use crate::capture::{PixelFormat, Resolution};
use crate::provider::POOL_SIZE;

/// Deepest delivered queue that keeps the backend supplied.
///
/// Stale delivered frames, one checked-out frame and one buffer being
/// filled must fit in the pool at the same time. A consumer holding more
/// than one frame at once needs a correspondingly smaller depth.
pub const MAX_QUEUE_DEPTH: usize = POOL_SIZE - 2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for one frame provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Requested frame width in pixels.
    pub width: u32,
    /// Requested frame height in pixels.
    pub height: u32,
    /// Number of recent frames kept available to the consumer.
    pub queue_depth: usize,
    /// Output pixel layout.
    pub format: PixelFormat,
    /// Upper bound on one backend fetch, which also bounds shutdown latency.
    pub fetch_timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            width: 480,
            height: 270,
            queue_depth: 2,
            format: PixelFormat::Nv12,
            fetch_timeout_ms: 200,
        }
    }
}

impl ProviderConfig {
    /// Creates a configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Requested resolution.
    pub fn requested_resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.queue_depth == 0 || self.queue_depth > MAX_QUEUE_DEPTH {
            return Err(ConfigError::InvalidQueueDepth);
        }
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::InvalidFetchTimeout);
        }
        Ok(())
    }
}

/// Configuration of the software capture backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Simulated capture rate.
    pub fps: u32,
    /// Native resolutions the mock channel reports.
    pub resolutions: Vec<Resolution>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            resolutions: vec![
                Resolution::new(1920, 1080),
                Resolution::new(1280, 720),
                Resolution::new(640, 360),
                Resolution::new(480, 270),
            ],
        }
    }
}

impl MockConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 || self.fps > 240 {
            return Err(ConfigError::InvalidFrameRate);
        }
        Ok(())
    }
}

/// Output configuration for the demo binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Number of frames to process (0 runs until interrupted).
    pub frame_count: u64,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            frame_count: 100,
            metrics_port: 9090,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    #[error("queue depth must be between 1 and {}", MAX_QUEUE_DEPTH)]
    InvalidQueueDepth,
    #[error("fetch timeout must be non-zero")]
    InvalidFetchTimeout,
    #[error("invalid frame rate (must be 1-240 fps)")]
    InvalidFrameRate,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub mock: MockConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.provider.validate()?;
        config.mock.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(ProviderConfig::default().validate().is_ok());
        assert!(MockConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let mut config = ProviderConfig::default();
        config.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_zero_queue_depth_invalid() {
        let config = ProviderConfig {
            queue_depth: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidQueueDepth)
        ));
    }

    #[test]
    fn test_queue_depth_leaves_room_for_checked_out_frame() {
        for depth in [POOL_SIZE, POOL_SIZE - 1] {
            let config = ProviderConfig {
                queue_depth: depth,
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidQueueDepth)),
                "depth {} accepted",
                depth
            );
        }

        let config = ProviderConfig {
            queue_depth: MAX_QUEUE_DEPTH,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = FileConfig::from_toml("").unwrap();
        assert_eq!(config.provider.queue_depth, 2);
        assert_eq!(config.mock.fps, 30);
    }

    #[test]
    fn test_partial_sections() {
        let text = r#"
            [provider]
            width = 640
            height = 480
            format = "rgb"

            [mock]
            fps = 15
            resolutions = [{ width = 800, height = 600 }]
        "#;
        let config = FileConfig::from_toml(text).unwrap();
        assert_eq!(config.provider.requested_resolution(), Resolution::new(640, 480));
        assert_eq!(config.provider.format, PixelFormat::Rgb);
        assert_eq!(config.provider.queue_depth, 2);
        assert_eq!(config.mock.resolutions, vec![Resolution::new(800, 600)]);
    }

    #[test]
    fn test_invalid_values_rejected_on_load() {
        let err = FileConfig::from_toml("[mock]\nfps = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFrameRate));

        let err = FileConfig::from_toml("[provider]\nwidth = \"wide\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
