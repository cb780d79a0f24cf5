//! Request/response framing spoken with the device.
//!
//! ```text
//! host   -> device : <keyword bytes>            (no terminator)
//! device -> host   : <u32 little-endian N><N bytes of JPEG>
//! ```
//!
//! There is no checksum and no resynchronisation: a reply is either
//! read completely or the exchange fails.

use super::transport::{Transport, TransportError};
use bytes::Bytes;

/// Size of the length header preceding every payload.
pub const LENGTH_HEADER_LEN: usize = 4;

/// Encoder/decoder for one capture exchange.
#[derive(Debug, Clone)]
pub struct FrameProtocol {
    keyword: Vec<u8>,
    max_frame_bytes: u32,
}

impl FrameProtocol {
    /// Creates a protocol for the given trigger keyword.
    pub fn new(keyword: &str, max_frame_bytes: u32) -> Self {
        Self {
            keyword: keyword.as_bytes().to_vec(),
            max_frame_bytes,
        }
    }

    /// Decodes a length header.
    pub fn decode_length(header: [u8; LENGTH_HEADER_LEN]) -> u32 {
        u32::from_le_bytes(header)
    }

    /// Performs one exchange and returns the complete payload.
    ///
    /// Nothing is returned unless all `N` payload bytes arrived.
    pub fn request<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<Bytes, TransportError> {
        transport
            .write_all(&self.keyword)
            .and_then(|()| transport.flush())
            .map_err(TransportError::from_io)?;

        let mut header = [0u8; LENGTH_HEADER_LEN];
        transport
            .read_exact(&mut header)
            .map_err(TransportError::from_io)?;

        let len = Self::decode_length(header);
        if len > self.max_frame_bytes {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_frame_bytes,
            });
        }

        let mut payload = vec![0u8; len as usize];
        transport
            .read_exact(&mut payload)
            .map_err(TransportError::from_io)?;

        tracing::trace!(len, "Received frame payload");
        Ok(Bytes::from(payload))
    }
}
