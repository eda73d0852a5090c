//! Per-session capture loop
//!
//! Runs as a tokio task. Reads happen on the blocking pool: the handle is moved
//! into the blocking closure and handed back with the result, so only this
//! task ever touches it.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::codec::encode_jpeg;
use crate::error::Error;
use crate::session::CameraSession;

use super::{CaptureError, CaptureHandle};

/// Result of one blocking read + encode
enum ReadOutcome {
    Frame(Bytes),
    EncodeFailed(Error),
    NoFrame,
    Fault(CaptureError),
}

/// Drive a session's capture handle until cancelled or exhausted.
pub(crate) async fn run_capture(
    session: Arc<CameraSession>,
    handle: Box<dyn CaptureHandle>,
    cancel: CancellationToken,
) {
    let config = session.config().clone();
    let source = session.id().clone();
    let mut handle = Some(handle);
    let mut failures: u32 = 0;

    tracing::debug!(source = %source, "Capture loop started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let outcome = match handle.take() {
            Some(current) => {
                let (returned, outcome) = read_frame(current, config.jpeg_quality).await;
                handle = returned;
                outcome
            }
            // A previous reopen failed; treat as another missed read
            None => ReadOutcome::NoFrame,
        };

        // Stop observed after an in-flight read: exit without writing.
        if cancel.is_cancelled() {
            break;
        }

        match outcome {
            ReadOutcome::Frame(jpeg) => {
                failures = 0;
                let sequence = session.publish_frame(jpeg);
                tracing::trace!(source = %source, frame = sequence, "Frame captured");
            }
            ReadOutcome::EncodeFailed(err) => {
                session.record_encode_failure();
                tracing::debug!(source = %source, error = %err, "Skipping frame");
            }
            ReadOutcome::Fault(err) => {
                tracing::error!(source = %source, error = %err, "Error capturing frame");
                if !sleep_or_cancel(&cancel, config.reconnect_backoff).await {
                    break;
                }
            }
            ReadOutcome::NoFrame => {
                failures = session.record_read_failure();
                let max = config.max_consecutive_failures;

                if failures >= max {
                    tracing::warn!(source = %source, attempts = failures, "Max reconnect attempts reached");
                    drop(handle.take());
                    session.fail(&Error::ReconnectExhausted {
                        source_id: source.clone(),
                        attempts: failures,
                    });
                    break;
                }

                if let Some(cap) = config.max_total_reconnects {
                    if session.counters().reconnects >= cap {
                        tracing::warn!(source = %source, reconnects = cap, "Reconnect budget spent");
                        drop(handle.take());
                        session.fail(&Error::ReconnectExhausted {
                            source_id: source.clone(),
                            attempts: failures,
                        });
                        break;
                    }
                }

                tracing::warn!(
                    source = %source,
                    attempt = failures,
                    max_attempts = max,
                    "Frame capture failed, attempting to reconnect"
                );
                session.mark_reconnecting();

                // Release before the backoff so the source sees the disconnect.
                drop(handle.take());

                if !sleep_or_cancel(&cancel, config.reconnect_backoff).await {
                    break;
                }

                let reconnects = session.record_reconnect();
                match session.open_handle().await {
                    Ok(reopened) => {
                        tracing::info!(source = %source, reconnects = reconnects, "Capture handle reopened");
                        handle = Some(reopened);
                    }
                    Err(err) => {
                        tracing::warn!(source = %source, error = %err, "Reopen failed");
                    }
                }
            }
        }
    }

    drop(handle);
    tracing::debug!(source = %source, failures = failures, "Capture loop exited");
}

/// Read and encode one frame on the blocking pool.
async fn read_frame(
    mut handle: Box<dyn CaptureHandle>,
    quality: u8,
) -> (Option<Box<dyn CaptureHandle>>, ReadOutcome) {
    let joined = tokio::task::spawn_blocking(move || {
        let outcome = match handle.read() {
            Ok(Some(image)) => match encode_jpeg(&image, quality) {
                Ok(jpeg) => ReadOutcome::Frame(jpeg),
                Err(err) => ReadOutcome::EncodeFailed(err),
            },
            Ok(None) => ReadOutcome::NoFrame,
            Err(err) => ReadOutcome::Fault(err),
        };
        (handle, outcome)
    })
    .await;

    match joined {
        Ok((handle, outcome)) => (Some(handle), outcome),
        // The backend panicked; the handle went down with it.
        Err(err) => (None, ReadOutcome::Fault(CaptureError::Backend(err.to_string()))),
    }
}

/// Sleep for `duration`; returns false if cancelled first.
async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
