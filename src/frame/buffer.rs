//! Frame type representing one captured JPEG image with metadata.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A single JPEG image received from the device.
///
/// The payload is reference counted and immutable: cloning a frame
/// shares the image bytes instead of copying them, and no holder can
/// observe a partially written image.
#[derive(Clone)]
pub struct Frame {
    /// Encoded JPEG bytes, opaque to this crate.
    jpeg: Bytes,
    /// Publication order, starting at 1. Zero marks the empty sentinel.
    sequence: u64,
    /// Wall-clock time the frame was published.
    captured_at: Option<DateTime<Utc>>,
}

impl Frame {
    /// Creates a frame from a complete JPEG payload.
    pub fn new(jpeg: Bytes, sequence: u64) -> Self {
        Self {
            jpeg,
            sequence,
            captured_at: Some(Utc::now()),
        }
    }

    /// The placeholder served before the first capture arrives.
    pub fn empty() -> Self {
        Self {
            jpeg: Bytes::new(),
            sequence: 0,
            captured_at: None,
        }
    }

    /// Returns the encoded image bytes.
    #[inline]
    pub fn jpeg(&self) -> &Bytes {
        &self.jpeg
    }

    /// Returns the payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    /// Returns true if the payload carries no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the publication timestamp, `None` for the sentinel.
    #[inline]
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.captured_at
    }

    /// True for the value a slot holds before anything was published.
    pub fn is_sentinel(&self) -> bool {
        self.sequence == 0
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("jpeg_bytes", &self.jpeg.len())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::new(Bytes::from_static(b"\xff\xd8jpeg\xff\xd9"), 3);

        assert_eq!(frame.sequence(), 3);
        assert_eq!(frame.len(), 8);
        assert!(frame.captured_at().is_some());
        assert!(!frame.is_sentinel());
    }

    #[test]
    fn test_empty_frame_is_sentinel() {
        let frame = Frame::empty();

        assert!(frame.is_sentinel());
        assert!(frame.is_empty());
        assert!(frame.captured_at().is_none());
    }

    #[test]
    fn test_clone_shares_payload() {
        let frame = Frame::new(Bytes::from(vec![7u8; 1024]), 1);
        let copy = frame.clone();

        assert_eq!(frame.jpeg().as_ptr(), copy.jpeg().as_ptr());
    }
}
