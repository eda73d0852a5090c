//! Scripted capture backend for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};

use super::{CaptureError, CaptureHandle, SourceKind, SourceOpener};

/// What the next read returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Frame,
    Miss,
    Fault,
}

struct Script {
    open_ok: bool,
    reads: VecDeque<Step>,
    fallback: Step,
    read_delay: Duration,
}

struct Inner {
    script: Mutex<Script>,
    opens: AtomicUsize,
    live_handles: AtomicUsize,
    reads: AtomicUsize,
}

/// Opener whose handles follow a shared read script
#[derive(Clone)]
pub(crate) struct ScriptedOpener {
    inner: Arc<Inner>,
}

impl ScriptedOpener {
    /// Opens succeed and every read yields a frame
    pub(crate) fn healthy() -> Self {
        Self {
            inner: Arc::new(Inner {
                script: Mutex::new(Script {
                    open_ok: true,
                    reads: VecDeque::new(),
                    fallback: Step::Frame,
                    read_delay: Duration::from_millis(2),
                }),
                opens: AtomicUsize::new(0),
                live_handles: AtomicUsize::new(0),
                reads: AtomicUsize::new(0),
            }),
        }
    }

    /// Every open fails
    pub(crate) fn unreachable() -> Self {
        let opener = Self::healthy();
        opener.set_open_ok(false);
        opener
    }

    /// Queue reads consumed in order before the fallback applies
    pub(crate) fn with_reads(self, steps: &[Step]) -> Self {
        self.inner.script.lock().unwrap().reads.extend(steps);
        self
    }

    pub(crate) fn with_fallback(self, step: Step) -> Self {
        self.inner.script.lock().unwrap().fallback = step;
        self
    }

    pub(crate) fn set_open_ok(&self, ok: bool) {
        self.inner.script.lock().unwrap().open_ok = ok;
    }

    pub(crate) fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn live_handles(&self) -> usize {
        self.inner.live_handles.load(Ordering::SeqCst)
    }

    pub(crate) fn reads(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn shared(&self) -> Arc<dyn SourceOpener> {
        Arc::new(self.clone())
    }
}

impl SourceOpener for ScriptedOpener {
    fn open(
        &self,
        source: &str,
        _kind: &SourceKind,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        if !self.inner.script.lock().unwrap().open_ok {
            return Err(CaptureError::Open {
                source_id: source.to_string(),
                reason: "connection refused".into(),
            });
        }
        self.inner.live_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedHandle {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct ScriptedHandle {
    inner: Arc<Inner>,
}

impl CaptureHandle for ScriptedHandle {
    fn read(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        let (step, delay) = {
            let mut script = self.inner.script.lock().unwrap();
            let step = script.reads.pop_front().unwrap_or(script.fallback);
            (step, script.read_delay)
        };
        std::thread::sleep(delay);
        self.inner.reads.fetch_add(1, Ordering::SeqCst);

        match step {
            Step::Frame => Ok(Some(RgbImage::from_pixel(16, 16, Rgb([40, 120, 200])))),
            Step::Miss => Ok(None),
            Step::Fault => Err(CaptureError::Backend("decoder exploded".into())),
        }
    }
}

impl Drop for ScriptedHandle {
    fn drop(&mut self) {
        self.inner.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}
