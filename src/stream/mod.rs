//! Multipart MJPEG producer
//!
//! Turns anything implementing [`LatestFrame`] into an endless
//! `multipart/x-mixed-replace` body. Each viewer gets its own stream; viewers
//! never share pacing or buffering.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use bytes::{BufMut, Bytes, BytesMut};
use futures::Stream;

use crate::session::{LatestFrame, ViewerGuard};

/// Part boundary
pub const BOUNDARY: &str = "frame";

/// Response content type for every stream endpoint
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

/// Viewer pacing
#[derive(Debug, Clone, Copy)]
pub struct StreamPacing {
    /// Delay after each emitted part (~30 fps by default)
    pub frame_interval: Duration,

    /// Delay before polling again when no frame exists yet
    pub idle_poll: Duration,
}

impl Default for StreamPacing {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            idle_poll: Duration::from_millis(100),
        }
    }
}

impl StreamPacing {
    /// Set the per-frame delay
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Set the empty-slot poll delay
    pub fn idle_poll(mut self, interval: Duration) -> Self {
        self.idle_poll = interval;
        self
    }
}

/// Frame one JPEG as a multipart part.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(PART_HEADER.len() + jpeg.len() + 2);
    part.put_slice(PART_HEADER);
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Endless multipart stream of the latest frame from `reader`.
///
/// The stream only ends when the transport drops it. `guard`, if given, is
/// held for the stream's lifetime so the session counts this viewer.
pub fn multipart_stream<R>(
    reader: Arc<R>,
    pacing: StreamPacing,
    guard: Option<ViewerGuard>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static
where
    R: LatestFrame + ?Sized + 'static,
{
    stream! {
        let _guard = guard;

        loop {
            match reader.get_frame() {
                Some(frame) => {
                    yield Ok::<Bytes, Infallible>(multipart_part(&frame.jpeg));
                    tokio::time::sleep(pacing.frame_interval).await;
                }
                None => tokio::time::sleep(pacing.idle_poll).await,
            }
        }
    }
}
