//! Single-value holder for the most recently captured frame.
//!
//! One writer (the device link) replaces the frame, any number of
//! stream connections read it. The lock only guards a handle swap or
//! clone, so neither side waits on the other's I/O.

use super::Frame;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Shared cell holding the latest published frame.
///
/// Delivery is at-most-latest: a reader that polls slowly simply misses
/// the frames that were overwritten in between.
#[derive(Debug)]
pub struct FrameSlot {
    latest: RwLock<Frame>,
    next_sequence: AtomicU64,
}

impl FrameSlot {
    /// Creates a slot holding the empty sentinel frame.
    pub fn new() -> Self {
        Self {
            latest: RwLock::new(Frame::empty()),
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Replaces the latest frame and returns its sequence number.
    ///
    /// The frame is built before the write lock is taken; the lock only
    /// covers the swap.
    pub fn publish(&self, jpeg: Bytes) -> u64 {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::new(jpeg, sequence);
        let len = frame.len();

        // A poisoned guard still holds a whole frame, so keep going.
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        // Racing writers must not move the slot backwards.
        if frame.sequence() > latest.sequence() {
            *latest = frame;
        }
        drop(latest);

        tracing::trace!(sequence, len, "Published frame");
        sequence
    }

    /// Returns the latest frame, or the sentinel if none was published.
    pub fn current(&self) -> Frame {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns true until the first frame is published.
    pub fn is_empty(&self) -> bool {
        self.current().is_sentinel()
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_starts_with_sentinel() {
        let slot = FrameSlot::new();

        assert!(slot.is_empty());
        assert_eq!(slot.current().len(), 0);
    }

    #[test]
    fn test_publish_replaces_latest() {
        let slot = FrameSlot::new();

        assert_eq!(slot.publish(Bytes::from_static(b"first")), 1);
        assert_eq!(slot.publish(Bytes::from_static(b"second")), 2);

        let frame = slot.current();
        assert_eq!(frame.jpeg().as_ref(), b"second");
        assert_eq!(frame.sequence(), 2);
        assert!(!slot.is_empty());
    }

    #[test]
    fn test_published_frame_is_timestamped_at_publish() {
        let slot = FrameSlot::new();
        assert!(slot.current().captured_at().is_none());

        let before = Utc::now();
        let sequence = slot.publish(Bytes::from_static(b"stamped"));
        let after = Utc::now();

        let frame = slot.current();
        assert_eq!(frame.sequence(), sequence);
        let captured_at = frame.captured_at().expect("published frame has a timestamp");
        assert!(before <= captured_at && captured_at <= after);
    }

    #[test]
    fn test_racing_writers_keep_newest_sequence() {
        let slot = Arc::new(FrameSlot::new());

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let slot = Arc::clone(&slot);
                thread::spawn(move || {
                    for _ in 0..500 {
                        slot.publish(Bytes::from_static(b"x"));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(slot.current().sequence(), 2000);
        assert_eq!(slot.publish(Bytes::from_static(b"next")), 2001);
    }

    #[test]
    fn test_concurrent_readers_never_see_mixed_frames() {
        let slot = Arc::new(FrameSlot::new());

        // Every frame is a single repeated byte, so a torn value would
        // show up as a payload with more than one distinct byte.
        let writer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                for i in 0..2000u32 {
                    let fill = (i % 251) as u8;
                    let len = 64 + (i as usize % 512);
                    slot.publish(Bytes::from(vec![fill; len]));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slot = Arc::clone(&slot);
                thread::spawn(move || {
                    let mut last_sequence = 0;
                    for _ in 0..2000 {
                        let frame = slot.current();
                        if let Some(&first) = frame.jpeg().first() {
                            assert!(frame.jpeg().iter().all(|&b| b == first));
                        }
                        assert!(frame.sequence() >= last_sequence);
                        last_sequence = frame.sequence();
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }

        assert_eq!(slot.current().sequence(), 2000);
    }
}
