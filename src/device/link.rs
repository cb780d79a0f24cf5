//! Device polling loop.
//!
//! One iteration is one capture exchange. The loop is fail-fast: the
//! first timeout or transport error ends it, since a half-read reply
//! cannot be resynchronised. The slot then keeps its last good frame.

use super::protocol::FrameProtocol;
use super::transport::{Transport, TransportError};
use crate::frame::FrameSlot;
use crate::metrics::StreamMetrics;
use crate::shutdown::Shutdown;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Why the polling loop stopped.
#[derive(Debug)]
pub enum LinkExit {
    /// Shutdown was requested.
    Shutdown,
    /// The device misbehaved or went away.
    Failed(TransportError),
}

/// Owns the device connection and feeds the frame slot.
pub struct DeviceLink<T> {
    transport: T,
    protocol: FrameProtocol,
    slot: Arc<FrameSlot>,
    shutdown: Shutdown,
    metrics: Option<StreamMetrics>,
}

impl<T: Transport> DeviceLink<T> {
    /// Creates a link that publishes into `slot` until `shutdown` fires.
    pub fn new(
        transport: T,
        protocol: FrameProtocol,
        slot: Arc<FrameSlot>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            transport,
            protocol,
            slot,
            shutdown,
            metrics: None,
        }
    }

    /// Records captures into the given metrics.
    pub fn with_metrics(mut self, metrics: StreamMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Polls the device until shutdown or the first error.
    ///
    /// The transport is dropped, and therefore closed, on return.
    pub fn run(mut self) -> LinkExit {
        if let Some(metrics) = &self.metrics {
            metrics.set_device_up(true);
        }
        tracing::info!("Device link started");

        let exit = loop {
            if self.shutdown.is_triggered() {
                break LinkExit::Shutdown;
            }

            match self.protocol.request(&mut self.transport) {
                Ok(jpeg) => {
                    let len = jpeg.len();
                    let sequence = self.slot.publish(jpeg);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_frame(len);
                    }
                    tracing::debug!(sequence, len, "Captured frame");
                }
                // A read cut short by shutdown is not a device fault.
                Err(_) if self.shutdown.is_triggered() => break LinkExit::Shutdown,
                Err(err) => break LinkExit::Failed(err),
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.set_device_up(false);
        }
        match &exit {
            LinkExit::Shutdown => tracing::info!("Device link stopped"),
            LinkExit::Failed(err) => tracing::error!(
                error = %err,
                last_sequence = self.slot.current().sequence(),
                "Device link failed; streams keep serving the last frame"
            ),
        }
        exit
    }
}

impl<T: Transport + 'static> DeviceLink<T> {
    /// Runs the loop on a dedicated thread, since serial reads block.
    pub fn spawn(self) -> io::Result<JoinHandle<LinkExit>> {
        std::thread::Builder::new()
            .name("device-link".into())
            .spawn(move || self.run())
    }
}
