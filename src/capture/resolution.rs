//! Stream resolution negotiation.

use super::CaptureBackend;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel count, widened so large sensors cannot overflow.
    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// True if a frame of this size can hold `requested` entirely.
    #[inline]
    pub fn covers(&self, requested: Resolution) -> bool {
        self.width >= requested.width && self.height >= requested.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Picks the smallest native resolution that covers `requested`.
///
/// Ties on area go to the first candidate in list order.
pub fn best_fit(candidates: &[Resolution], requested: Resolution) -> Option<Resolution> {
    candidates
        .iter()
        .copied()
        .filter(|res| res.covers(requested))
        .fold(None, |best: Option<Resolution>, res| match best {
            Some(b) if b.area() <= res.area() => Some(b),
            _ => Some(res),
        })
}

/// Queries the backend and selects the stream resolution for `requested`.
///
/// If the backend cannot report a usable resolution list, the requested
/// size is used verbatim. That path is degraded but not fatal.
pub fn choose_stream_resolution<B: CaptureBackend>(
    backend: &mut B,
    requested: Resolution,
) -> Resolution {
    let candidates = match backend.list_supported_resolutions() {
        Ok(list) => list,
        Err(e) => {
            tracing::warn!(error = %e, "Resolution query failed");
            Vec::new()
        }
    };

    match best_fit(&candidates, requested) {
        Some(chosen) => {
            tracing::info!(%requested, %chosen, "Selected stream resolution from channel info");
            chosen
        }
        None => {
            tracing::warn!(
                %requested,
                candidates = candidates.len(),
                "No usable resolution info, falling back to requested size"
            );
            requested
        }
    }
}
