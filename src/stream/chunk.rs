//! Multipart chunk encoding.

use crate::frame::Frame;
use bytes::{BufMut, Bytes, BytesMut};

/// Multipart boundary separating frames.
pub const BOUNDARY: &str = "frame";

/// Response content type of the stream route.
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n";

/// Wraps one frame as a multipart body part.
///
/// ```text
/// --frame\r\n
/// Content-Type: image/jpeg\r\n
/// \r\n
/// <frame bytes>\r\n
/// ```
pub fn encode_chunk(frame: &Frame) -> Bytes {
    let mut chunk = BytesMut::with_capacity(PART_HEADER.len() + frame.len() + PART_TRAILER.len());
    chunk.put_slice(PART_HEADER);
    chunk.put_slice(frame.jpeg());
    chunk.put_slice(PART_TRAILER);
    chunk.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_layout() {
        let frame = Frame::new(Bytes::from_static(b"HELLO"), 1);

        assert_eq!(
            encode_chunk(&frame).as_ref(),
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\nHELLO\r\n"
        );
    }

    #[test]
    fn test_sentinel_chunk_has_empty_body() {
        assert_eq!(
            encode_chunk(&Frame::empty()).as_ref(),
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\r\n"
        );
    }

    #[test]
    fn test_boundary_matches_content_type() {
        assert!(CONTENT_TYPE.ends_with(&format!("boundary={}", BOUNDARY)));
        assert!(PART_HEADER.starts_with(format!("--{}\r\n", BOUNDARY).as_bytes()));
    }
}
