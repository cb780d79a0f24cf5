//! Byte transport to the capture device.
//!
//! The link only needs a blocking, timeout-bounded byte pipe. The
//! [`Transport`] abstraction allows swapping the real serial port for
//! an in-memory [`MockDevice`] in tests.

use crate::config::{Parity, SerialSettings};
use serialport::{DataBits, FlowControl, Parity as SpParity, SerialPort, StopBits};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Errors that can occur while talking to the device.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The port could not be opened or configured.
    #[error("failed to open serial port {device}: {reason}")]
    Open {
        /// Port identifier.
        device: String,
        /// Driver or settings error.
        reason: String,
    },
    /// A read hit the configured timeout.
    #[error("device did not answer within the read timeout")]
    Timeout,
    /// The peer went away mid-exchange.
    #[error("device connection closed")]
    Closed,
    /// The length header exceeds the configured limit.
    #[error("frame length {len} exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Length announced by the device.
        len: u32,
        /// Configured limit.
        max: u32,
    },
    /// Any other I/O failure.
    #[error("serial I/O failed: {0}")]
    Io(#[source] io::Error),
}

impl TransportError {
    /// Classifies an I/O error raised by a transport read or write.
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionReset => Self::Closed,
            _ => Self::Io(err),
        }
    }
}

/// A blocking byte pipe with bounded reads.
///
/// Implementations must fail a read with [`io::ErrorKind::TimedOut`]
/// rather than block forever when the peer stays silent.
pub trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> Transport for T {}

/// Serial port opened with the configured line settings.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Opens the port: configured framing, no flow control, read timeout set.
    pub fn open(settings: &SerialSettings) -> Result<Self, TransportError> {
        let invalid = |reason: String| TransportError::Open {
            device: settings.device.clone(),
            reason,
        };
        let open_error = |e: serialport::Error| invalid(e.to_string());

        // Settings may be built without going through config validation.
        let data_bits = to_serialport_data_bits(settings.data_bits)
            .ok_or_else(|| invalid(format!("unsupported data bits: {}", settings.data_bits)))?;
        let stop_bits = to_serialport_stop_bits(settings.stop_bits)
            .ok_or_else(|| invalid(format!("unsupported stop bits: {}", settings.stop_bits)))?;

        let mut port = serialport::new(&settings.device, settings.baud)
            .data_bits(data_bits)
            .parity(to_serialport_parity(settings.parity))
            .stop_bits(stop_bits)
            .flow_control(FlowControl::None)
            .timeout(settings.timeout)
            .open()
            .map_err(open_error)?;

        if settings.dtr_on_open {
            port.write_data_terminal_ready(true).map_err(open_error)?;
        }

        tracing::info!(
            device = %settings.device,
            baud = settings.baud,
            timeout_ms = settings.timeout.as_millis() as u64,
            "Serial port opened"
        );
        Ok(Self { port })
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        tracing::info!(device = ?self.port.name(), "Serial port closed");
    }
}

fn to_serialport_parity(parity: Parity) -> SpParity {
    match parity {
        Parity::None => SpParity::None,
        Parity::Odd => SpParity::Odd,
        Parity::Even => SpParity::Even,
    }
}

fn to_serialport_data_bits(bits: u8) -> Option<DataBits> {
    match bits {
        5 => Some(DataBits::Five),
        6 => Some(DataBits::Six),
        7 => Some(DataBits::Seven),
        8 => Some(DataBits::Eight),
        _ => None,
    }
}

fn to_serialport_stop_bits(bits: u8) -> Option<StopBits> {
    match bits {
        1 => Some(StopBits::One),
        2 => Some(StopBits::Two),
        _ => None,
    }
}

/// In-memory device for testing that answers the trigger keyword with
/// scripted replies.
///
/// Each complete keyword written queues the next scripted reply for
/// reading. Reads with nothing pending fail with `TimedOut`, the same
/// way a silent serial port does once its timeout expires.
#[derive(Debug)]
pub struct MockDevice {
    keyword: Vec<u8>,
    replies: VecDeque<Vec<u8>>,
    pending: VecDeque<u8>,
    request: Vec<u8>,
    received: Arc<Mutex<Vec<u8>>>,
}

impl MockDevice {
    /// Creates a device that answers `keyword` and has no replies queued.
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.as_bytes().to_vec(),
            replies: VecDeque::new(),
            pending: VecDeque::new(),
            request: Vec::new(),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queues a well-formed reply: little-endian length then payload.
    pub fn with_frame(mut self, payload: &[u8]) -> Self {
        let len = u32::try_from(payload.len()).expect("mock frame exceeds u32 length");
        let mut reply = len.to_le_bytes().to_vec();
        reply.extend_from_slice(payload);
        self.replies.push_back(reply);
        self
    }

    /// Queues a reply sent verbatim, e.g. a header with a short payload.
    pub fn with_raw(mut self, reply: &[u8]) -> Self {
        self.replies.push_back(reply.to_vec());
        self
    }

    /// Handle to every byte the host has written so far.
    pub fn received(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.received)
    }
}

impl Read for MockDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock device silent"));
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);

        self.request.extend_from_slice(buf);
        while !self.keyword.is_empty() && self.request.len() >= self.keyword.len() {
            let word: Vec<u8> = self.request.drain(..self.keyword.len()).collect();
            if word == self.keyword {
                if let Some(reply) = self.replies.pop_front() {
                    self.pending.extend(reply);
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
