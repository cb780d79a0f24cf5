//! Serial device link.
//!
//! The device is treated as a black box that returns one JPEG per
//! trigger keyword. This module owns the connection, the wire framing
//! and the polling loop that feeds the shared frame slot.

mod link;
mod protocol;
mod transport;

pub use link::{DeviceLink, LinkExit};
pub use protocol::{FrameProtocol, LENGTH_HEADER_LEN};
pub use transport::{MockDevice, SerialTransport, Transport, TransportError};
