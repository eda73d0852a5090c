//! Latest-frame slot
//!
//! A single-cell buffer shared by one capture loop (writer) and any number of
//! viewers (readers). Writes replace the previous frame; there is no queue, so a
//! slow viewer can never hold back the capture loop.

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use bytes::Bytes;

/// An encoded frame
///
/// Cheap to clone: the JPEG payload is reference-counted.
#[derive(Debug, Clone)]
pub struct Frame {
    /// JPEG-encoded image
    pub jpeg: Bytes,
    /// Per-slot sequence number, starting at 1
    pub sequence: u64,
    /// When the frame was published
    pub captured_at: Instant,
}

/// Anything viewers can poll for the most recent frame
pub trait LatestFrame: Send + Sync {
    /// Return the latest frame, or `None` if nothing has been captured yet.
    fn get_frame(&self) -> Option<Frame>;
}

/// Lock-guarded single-frame cell
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: Mutex<Option<Frame>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame and return its sequence number.
    pub fn publish(&self, jpeg: Bytes) -> u64 {
        let mut guard = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence = guard.as_ref().map_or(1, |frame| frame.sequence + 1);
        *guard = Some(Frame {
            jpeg,
            sequence,
            captured_at: Instant::now(),
        });
        sequence
    }

    /// Clone the current frame out of the slot.
    pub fn latest(&self) -> Option<Frame> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sequence number of the current frame (0 when empty)
    pub fn sequence(&self) -> u64 {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |frame| frame.sequence)
    }
}

impl LatestFrame for FrameSlot {
    fn get_frame(&self) -> Option<Frame> {
        self.latest()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_empty_slot() {
        let slot = FrameSlot::new();

        assert!(slot.latest().is_none());
        assert_eq!(slot.sequence(), 0);
    }

    #[test]
    fn test_latest_wins() {
        let slot = FrameSlot::new();

        assert_eq!(slot.publish(Bytes::from_static(b"one")), 1);
        assert_eq!(slot.publish(Bytes::from_static(b"two")), 2);

        let frame = slot.latest().unwrap();
        assert_eq!(frame.sequence, 2);
        assert_eq!(&frame.jpeg[..], b"two");
    }

    #[test]
    fn test_reader_copy_is_independent() {
        let slot = FrameSlot::new();
        slot.publish(Bytes::from_static(b"first"));

        let held = slot.latest().unwrap();
        slot.publish(Bytes::from_static(b"second"));

        assert_eq!(&held.jpeg[..], b"first");
        assert_eq!(&slot.latest().unwrap().jpeg[..], b"second");
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_frames() {
        const WRITES: u64 = 2_000;
        const FRAME_LEN: usize = 256;

        let slot = Arc::new(FrameSlot::new());

        // Every byte of a payload carries the low byte of its sequence marker,
        // so a mix of two writes would show up as mismatched bytes.
        let writer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                for marker in 1..=WRITES {
                    let payload = vec![(marker % 251) as u8; FRAME_LEN];
                    let sequence = slot.publish(Bytes::from(payload));
                    assert_eq!(sequence, marker);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slot = Arc::clone(&slot);
                thread::spawn(move || {
                    let mut last_seen = 0;
                    while last_seen < WRITES {
                        if let Some(frame) = slot.latest() {
                            assert_eq!(frame.jpeg.len(), FRAME_LEN);
                            let expected = (frame.sequence % 251) as u8;
                            assert!(frame.jpeg.iter().all(|&b| b == expected));
                            assert!(frame.sequence >= last_seen);
                            last_seen = frame.sequence;
                        }
                        thread::yield_now();
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
