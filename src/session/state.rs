//! Capture lifecycle state machine
//!
//! Tracks a camera session from creation to shutdown:
//!
//! ```text
//! Stopped → Starting → Running ⇄ Reconnecting
//!              │          │           │
//!              ▼          ▼           ▼
//!            Failed    Stopped     Failed | Stopped
//! ```

use serde::Serialize;

/// Lifecycle state of a capture loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// Never started, or stopped explicitly
    Stopped,
    /// Capture handle is being opened
    Starting,
    /// Frames are flowing
    Running,
    /// Last read failed, handle is being reopened
    Reconnecting,
    /// Open failed or reconnect attempts were exhausted
    Failed,
}

impl CaptureState {
    /// Whether the capture handle is open (or being reopened by the loop)
    pub fn is_running(self) -> bool {
        matches!(self, CaptureState::Running | CaptureState::Reconnecting)
    }

    /// Whether the loop has terminated on its own
    pub fn is_failed(self) -> bool {
        self == CaptureState::Failed
    }

    pub fn label(self) -> &'static str {
        match self {
            CaptureState::Stopped => "stopped",
            CaptureState::Starting => "starting",
            CaptureState::Running => "running",
            CaptureState::Reconnecting => "reconnecting",
            CaptureState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Mutable lifecycle fields guarded together
#[derive(Debug)]
pub(crate) struct Lifecycle {
    pub(crate) state: CaptureState,
    pub(crate) error: Option<String>,
    /// Removed from the registry; never starts again
    pub(crate) retired: bool,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: CaptureState::Stopped,
            error: None,
            retired: false,
        }
    }

    /// Begin an open attempt. Returns false if the loop is already up or the
    /// session was retired.
    pub(crate) fn begin_start(&mut self) -> bool {
        if self.retired || self.state.is_running() {
            return false;
        }
        self.state = CaptureState::Starting;
        true
    }

    /// Complete an open attempt. Returns false if a stop raced the open.
    pub(crate) fn complete_start(&mut self) -> bool {
        if self.retired || self.state != CaptureState::Starting {
            return false;
        }
        self.state = CaptureState::Running;
        self.error = None;
        true
    }

    /// Loop-driven transition; ignored once the session left the running states.
    pub(crate) fn advance(&mut self, next: CaptureState) -> bool {
        if !self.state.is_running() {
            return false;
        }
        self.state = next;
        true
    }

    /// Record a terminal failure. An explicit stop keeps precedence.
    pub(crate) fn fail(&mut self, message: String) {
        if self.state != CaptureState::Stopped {
            self.state = CaptureState::Failed;
        }
        self.error = Some(message);
    }

    pub(crate) fn stop(&mut self) -> bool {
        let was_active = self.state != CaptureState::Stopped;
        self.state = CaptureState::Stopped;
        was_active
    }

    /// Stop for good.
    pub(crate) fn retire(&mut self) -> bool {
        self.retired = true;
        self.stop()
    }
}

/// Per-session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounters {
    /// Frames written to the slot
    pub frames_captured: u64,
    /// Frames dropped because compression failed
    pub encode_failures: u64,
    /// Reconnect attempts over the session's lifetime
    pub reconnects: u32,
    /// Current run of consecutive read failures
    pub consecutive_failures: u32,
}
