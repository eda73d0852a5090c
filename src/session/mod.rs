//! Camera sessions
//!
//! A session bundles one capture loop, its latest-frame slot, lifecycle state,
//! and the last-access clock the idle reaper looks at.

pub mod camera;
pub mod slot;
pub mod state;

use std::time::Duration;

use crate::codec::DEFAULT_JPEG_QUALITY;

pub use camera::{CameraSession, StreamStatus, ViewerGuard};
pub use slot::{Frame, FrameSlot, LatestFrame};
pub use state::{CaptureState, SessionCounters};

/// Identifier naming a video source (URL, path, or device index)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<String> for SourceId {
    fn from(source: String) -> Self {
        Self(source)
    }
}

/// Per-session capture options
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Consecutive read failures before the session is marked failed
    pub max_consecutive_failures: u32,

    /// Pause before reopening after a failed read (also used after faults)
    pub reconnect_backoff: Duration,

    /// Optional cap on reconnects over the session's lifetime (None = unlimited)
    pub max_total_reconnects: Option<u32>,

    /// JPEG quality for encoded frames
    pub jpeg_quality: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            reconnect_backoff: Duration::from_secs(1),
            max_total_reconnects: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl SessionConfig {
    /// Set the consecutive-failure limit (at least 1)
    pub fn max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max.max(1);
        self
    }

    /// Set the reconnect backoff
    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    /// Cap reconnects over the session's lifetime
    pub fn max_total_reconnects(mut self, max: u32) -> Self {
        self.max_total_reconnects = Some(max);
        self
    }

    /// Set the JPEG quality (clamped to 1..=100)
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }
}
