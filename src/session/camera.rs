//! Camera session
//!
//! Owns the lifecycle of one source: opening the capture handle, supervising
//! the capture task, and exposing the latest frame to viewers.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capture::{worker, CaptureError, CaptureHandle, SourceKind, SourceOpener};
use crate::error::{Error, Result};

use super::slot::{Frame, FrameSlot, LatestFrame};
use super::state::{CaptureState, Lifecycle, SessionCounters};
use super::{SessionConfig, SourceId};

/// Supervised capture task
struct Worker {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// One video source and everything attached to it
pub struct CameraSession {
    id: SourceId,
    kind: SourceKind,
    config: SessionConfig,
    opener: Arc<dyn SourceOpener>,

    /// Latest encoded frame
    slot: FrameSlot,

    lifecycle: Mutex<Lifecycle>,

    /// Serialises concurrent `start` calls
    start_lock: tokio::sync::Mutex<()>,

    worker: Mutex<Option<Worker>>,

    created_at: Instant,
    created_wall: SystemTime,

    /// Nanoseconds between `created_at` and the last access
    last_access_ns: AtomicU64,

    viewers: AtomicU32,
    consecutive_failures: AtomicU32,
    reconnects: AtomicU32,
    frames_captured: AtomicU64,
    encode_failures: AtomicU64,
}

/// Snapshot of a session for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatus {
    pub url: String,
    pub is_running: bool,
    /// Unix timestamp (seconds) of the last frame or viewer access
    pub last_access: f64,
    pub state: CaptureState,
    pub viewers: u32,
    pub frames: u64,
    pub reconnects: u32,
    pub error: Option<String>,
}

impl CameraSession {
    /// Create an unstarted session
    pub fn new(id: SourceId, opener: Arc<dyn SourceOpener>, config: SessionConfig) -> Self {
        let kind = SourceKind::classify(id.as_str());
        Self {
            id,
            kind,
            config,
            opener,
            slot: FrameSlot::new(),
            lifecycle: Mutex::new(Lifecycle::new()),
            start_lock: tokio::sync::Mutex::new(()),
            worker: Mutex::new(None),
            created_at: Instant::now(),
            created_wall: SystemTime::now(),
            last_access_ns: AtomicU64::new(0),
            viewers: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
            reconnects: AtomicU32::new(0),
            frames_captured: AtomicU64::new(0),
            encode_failures: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &SourceId {
        &self.id
    }

    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        self.lifecycle().state
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Message recorded by the last terminal failure
    pub fn error_message(&self) -> Option<String> {
        self.lifecycle().error.clone()
    }

    pub fn viewer_count(&self) -> u32 {
        self.viewers.load(Ordering::Relaxed)
    }

    pub fn counters(&self) -> SessionCounters {
        SessionCounters {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }

    /// Open the capture handle and spawn the capture task.
    ///
    /// Returns immediately if the loop is already running. A failed or stopped
    /// session re-attempts the open. A retired session refuses to start.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let _start = self.start_lock.lock().await;

        {
            let mut life = self.lifecycle();
            if life.retired {
                return Err(self.unavailable("session was removed"));
            }
            if !life.begin_start() {
                return Ok(());
            }
        }

        tracing::debug!(source = %self.id, kind = self.kind.label(), "Opening capture handle");

        let handle = match self.open_handle().await {
            Ok(handle) => handle,
            Err(err) => {
                let message = format!("Failed to open stream: {}", self.id);
                self.lifecycle().fail(message);
                tracing::warn!(source = %self.id, error = %err, "Capture open failed");
                return Err(self.unavailable(err.to_string()));
            }
        };

        // The worker slot stays locked until the task is registered, so a
        // concurrent stop either prevents the spawn or cancels the new task.
        let spawned = {
            let mut supervisor = self.worker_slot();
            if self.lifecycle().complete_start() {
                self.consecutive_failures.store(0, Ordering::Relaxed);

                let cancel = CancellationToken::new();
                let task = tokio::spawn(worker::run_capture(
                    Arc::clone(self),
                    handle,
                    cancel.clone(),
                ));
                if let Some(previous) = supervisor.replace(Worker { cancel, task }) {
                    // A loop that already exited on its own; make sure it is gone.
                    previous.cancel.cancel();
                }
                Ok(())
            } else {
                Err(handle)
            }
        };

        if let Err(handle) = spawned {
            // stop() landed while the handle was opening
            drop(handle);
            return Err(self.unavailable("stopped while starting"));
        }

        tracing::info!(source = %self.id, kind = self.kind.label(), "Started stream");
        Ok(())
    }

    /// Signal the capture task to exit. Idempotent.
    ///
    /// The task releases the capture handle before its next read; use
    /// [`shutdown`](Self::shutdown) to wait for that.
    pub fn stop(&self) {
        if self.halt(false) {
            tracing::info!(source = %self.id, "Stopped stream");
        }
    }

    /// Stop for good: later `start` calls fail instead of reopening.
    ///
    /// Called by the registry when it removes the session, so a caller still
    /// holding the `Arc` cannot revive a capture loop nothing supervises.
    pub fn retire(&self) {
        if self.halt(true) {
            tracing::info!(source = %self.id, "Stopped stream");
        }
    }

    pub fn is_retired(&self) -> bool {
        self.lifecycle().retired
    }

    fn halt(&self, retire: bool) -> bool {
        let supervisor = self.worker_slot();
        if let Some(worker) = supervisor.as_ref() {
            worker.cancel.cancel();
        }
        let mut life = self.lifecycle();
        if retire {
            life.retire()
        } else {
            life.stop()
        }
    }

    /// Stop and wait for the capture task to finish.
    pub async fn shutdown(&self) {
        self.stop();
        self.join_worker().await;
    }

    async fn join_worker(&self) {
        let worker = self.worker_slot().take();
        if let Some(worker) = worker {
            if let Err(err) = worker.task.await {
                if err.is_panic() {
                    tracing::error!(source = %self.id, error = %err, "Capture task panicked");
                }
            }
        }
    }

    /// Latest frame; counts as viewer activity.
    pub fn get_frame(&self) -> Option<Frame> {
        self.touch();
        self.slot.latest()
    }

    /// Register a viewer; the returned guard unregisters on drop.
    pub fn attach_viewer(self: &Arc<Self>) -> ViewerGuard {
        self.touch();
        let viewers = self.viewers.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(source = %self.id, viewers = viewers, "Viewer attached");
        ViewerGuard {
            session: Arc::clone(self),
        }
    }

    /// Mark the session as in use now.
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    pub(crate) fn touch_at(&self, now: Instant) {
        let offset = now.saturating_duration_since(self.created_at).as_nanos();
        let offset = u64::try_from(offset).unwrap_or(u64::MAX);
        self.last_access_ns.fetch_max(offset, Ordering::Relaxed);
    }

    /// Instant of the last frame write or viewer access (creation time if none)
    pub fn last_access(&self) -> Instant {
        self.created_at + self.last_access_offset()
    }

    fn last_access_offset(&self) -> Duration {
        Duration::from_nanos(self.last_access_ns.load(Ordering::Relaxed))
    }

    /// Time since the last access, measured at `now`
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_access())
    }

    /// Copy the fields reported by the status endpoint
    pub fn status(&self) -> StreamStatus {
        let (state, error) = {
            let life = self.lifecycle();
            (life.state, life.error.clone())
        };
        let last_access_wall = self.created_wall + self.last_access_offset();
        let last_access = last_access_wall
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        StreamStatus {
            url: self.id.to_string(),
            is_running: state.is_running(),
            last_access,
            state,
            viewers: self.viewer_count(),
            frames: self.frames_captured.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            error,
        }
    }

    // --- capture task hooks -------------------------------------------------

    /// Open a fresh handle on the blocking pool
    pub(crate) async fn open_handle(&self) -> std::result::Result<Box<dyn CaptureHandle>, CaptureError> {
        let opener = Arc::clone(&self.opener);
        let source = self.id.to_string();
        let kind = self.kind.clone();

        tokio::task::spawn_blocking(move || opener.open(&source, &kind))
            .await
            .unwrap_or_else(|err| Err(CaptureError::Backend(err.to_string())))
    }

    pub(crate) fn publish_frame(&self, jpeg: Bytes) -> u64 {
        let sequence = self.slot.publish(jpeg);
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.touch();
        self.lifecycle().advance(CaptureState::Running);
        sequence
    }

    pub(crate) fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_reconnect(&self) -> u32 {
        self.reconnects.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn mark_reconnecting(&self) {
        self.lifecycle().advance(CaptureState::Reconnecting);
    }

    fn unavailable(&self, reason: impl Into<String>) -> Error {
        Error::SourceUnavailable {
            source_id: self.id.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn fail(&self, err: &Error) {
        self.lifecycle().fail(err.to_string());
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn worker_slot(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LatestFrame for CameraSession {
    fn get_frame(&self) -> Option<Frame> {
        CameraSession::get_frame(self)
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("viewers", &self.viewer_count())
            .finish()
    }
}

/// Keeps a viewer registered for as long as its stream is alive
pub struct ViewerGuard {
    session: Arc<CameraSession>,
}

impl ViewerGuard {
    pub fn session(&self) -> &Arc<CameraSession> {
        &self.session
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        let prev = self.session.viewers.fetch_sub(1, Ordering::Relaxed);
        self.session.touch();
        tracing::debug!(
            source = %self.session.id,
            viewers = prev.saturating_sub(1),
            "Viewer detached"
        );
    }
}
