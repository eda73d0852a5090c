//! OpenCV-backed capture handles.

use std::time::Duration;

use image::RgbImage;
use opencv::{
    core::{Mat, Vector},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};

use super::{CaptureError, CaptureHandle, SourceKind, SourceOpener};

/// Opens sources through `cv::VideoCapture`.
///
/// RTSP transport comes from [`FFMPEG_OPTIONS_VAR`](super::FFMPEG_OPTIONS_VAR),
/// which the binary sets to TCP at startup.
#[derive(Debug, Clone)]
pub struct OpenCvOpener {
    /// Connect timeout for network streams
    pub open_timeout: Duration,
    /// Read timeout for network streams
    pub read_timeout: Duration,
}

impl Default for OpenCvOpener {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
        }
    }
}

impl OpenCvOpener {
    pub fn new(open_timeout: Duration) -> Self {
        Self {
            open_timeout,
            ..Default::default()
        }
    }
}

impl SourceOpener for OpenCvOpener {
    fn open(
        &self,
        source: &str,
        kind: &SourceKind,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let open_err = |reason: String| CaptureError::Open {
            source_id: source.to_string(),
            reason,
        };

        let mut cap = match kind {
            SourceKind::Device(index) => VideoCapture::new(*index, videoio::CAP_ANY),
            SourceKind::Network => {
                let params = Vector::<i32>::from_slice(&[
                    videoio::CAP_PROP_OPEN_TIMEOUT_MSEC,
                    self.open_timeout.as_millis() as i32,
                    videoio::CAP_PROP_READ_TIMEOUT_MSEC,
                    self.read_timeout.as_millis() as i32,
                ]);
                VideoCapture::from_file_with_params(source, videoio::CAP_FFMPEG, &params)
            }
            SourceKind::Http | SourceKind::File => {
                VideoCapture::from_file(source, videoio::CAP_ANY)
            }
        }
        .map_err(|e| open_err(e.to_string()))?;

        if !cap.is_opened().map_err(|e| open_err(e.to_string()))? {
            return Err(open_err("capture did not open".into()));
        }

        // Keep at most one decoded frame queued so viewers see the live edge.
        if let Err(err) = cap.set(videoio::CAP_PROP_BUFFERSIZE, 1.0) {
            tracing::debug!(source = %source, error = %err, "Backend ignored buffer size hint");
        }

        Ok(Box::new(OpenCvHandle {
            cap,
            bgr: Mat::default(),
            rgb: Mat::default(),
        }))
    }
}

struct OpenCvHandle {
    cap: VideoCapture,
    bgr: Mat,
    rgb: Mat,
}

impl CaptureHandle for OpenCvHandle {
    fn read(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        let backend = |e: opencv::Error| CaptureError::Backend(e.to_string());

        if !self.cap.read(&mut self.bgr).map_err(backend)? {
            return Ok(None);
        }
        if self.bgr.cols() <= 0 || self.bgr.rows() <= 0 {
            return Ok(None);
        }

        imgproc::cvt_color(&self.bgr, &mut self.rgb, imgproc::COLOR_BGR2RGB, 0).map_err(backend)?;

        let width = self.rgb.cols() as u32;
        let height = self.rgb.rows() as u32;
        let data = self.rgb.data_bytes().map_err(backend)?.to_vec();

        RgbImage::from_raw(width, height, data)
            .map(Some)
            .ok_or_else(|| CaptureError::Backend("frame buffer size mismatch".into()))
    }
}

impl Drop for OpenCvHandle {
    fn drop(&mut self) {
        let _ = self.cap.release();
    }
}
