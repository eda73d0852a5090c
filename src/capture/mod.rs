//! Source capture
//!
//! This module provides:
//! - Classification of source identifiers into transport kinds
//! - The `SourceOpener` / `CaptureHandle` backend seam
//! - The per-session capture loop (`worker`)
//! - An OpenCV backend (feature: `opencv`)
//!
//! Without a compiled backend every real source reports as unavailable; the
//! synthetic test pattern keeps working.

#[cfg(feature = "opencv")]
pub mod opencv;
#[cfg(test)]
pub(crate) mod testing;
pub(crate) mod worker;

use std::ffi::OsStr;
use std::sync::Arc;

use image::RgbImage;

/// Environment variable OpenCV's FFmpeg backend reads capture options from
pub const FFMPEG_OPTIONS_VAR: &str = "OPENCV_FFMPEG_CAPTURE_OPTIONS";

/// FFmpeg options applied when the operator sets none: RTSP over TCP
pub const DEFAULT_FFMPEG_OPTIONS: &str = "rtsp_transport;tcp";

/// FFmpeg capture options to install, given the current value of
/// [`FFMPEG_OPTIONS_VAR`]. `None` keeps an operator-provided value.
///
/// The options are process-wide, so the binary applies them before its
/// runtime starts any threads.
pub fn ffmpeg_options_override(current: Option<&OsStr>) -> Option<&'static str> {
    match current {
        Some(value) if !value.is_empty() => None,
        _ => Some(DEFAULT_FFMPEG_OPTIONS),
    }
}

/// Transport inferred from a source identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Local capture device by index (`"0"`, `"1"`, ...)
    Device(i32),
    /// RTSP or RTMP stream, opened with TCP transport and a connect timeout
    Network,
    /// HTTP(S) stream or remote file
    Http,
    /// Anything else is treated as a local file path
    File,
}

impl SourceKind {
    /// Classify a source identifier.
    pub fn classify(source: &str) -> Self {
        if !source.is_empty() && source.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = source.parse::<i32>() {
                return SourceKind::Device(index);
            }
        }

        if source.starts_with("rtsp://") || source.starts_with("rtmp://") {
            SourceKind::Network
        } else if source.starts_with("http://") || source.starts_with("https://") {
            SourceKind::Http
        } else {
            SourceKind::File
        }
    }

    /// Short label used in logs and status output
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Device(_) => "device",
            SourceKind::Network => "network",
            SourceKind::Http => "http",
            SourceKind::File => "file",
        }
    }
}

/// Errors raised by capture backends
#[derive(Debug, Clone, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to open video source {source_id:?}: {reason}")]
    Open { source_id: String, reason: String },
    #[error("capture backend fault: {0}")]
    Backend(String),
}

/// An open connection to a video source.
///
/// Owned by exactly one capture loop. Dropping the handle releases the
/// underlying resource.
pub trait CaptureHandle: Send + 'static {
    /// Read one decoded frame.
    ///
    /// `Ok(None)` means the source produced no frame (stall, end of stream,
    /// dropped connection) and counts towards the reconnect policy. `Err` is
    /// an unexpected backend fault; the loop logs it and keeps going.
    fn read(&mut self) -> Result<Option<RgbImage>, CaptureError>;
}

/// Opens capture handles for source identifiers.
pub trait SourceOpener: Send + Sync + 'static {
    /// Open `source` using the transport chosen by `kind`.
    ///
    /// This may block (network connect, device negotiation); callers run it on
    /// the blocking pool.
    fn open(&self, source: &str, kind: &SourceKind)
        -> Result<Box<dyn CaptureHandle>, CaptureError>;
}

/// Opener used when no capture backend is compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableOpener;

impl SourceOpener for UnavailableOpener {
    fn open(
        &self,
        source: &str,
        _kind: &SourceKind,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        Err(CaptureError::Open {
            source_id: source.to_string(),
            reason: "no capture backend compiled in (enable the `opencv` feature)".into(),
        })
    }
}

/// The opener for the backends enabled at build time.
pub fn default_opener() -> Arc<dyn SourceOpener> {
    #[cfg(feature = "opencv")]
    {
        Arc::new(opencv::OpenCvOpener::default())
    }
    #[cfg(not(feature = "opencv"))]
    {
        Arc::new(UnavailableOpener)
    }
}
