//! Metrics collection and registry.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus metrics for the device link and the stream connections.
///
/// Cloning is cheap and every clone updates the same registry.
#[derive(Clone)]
pub struct StreamMetrics {
    registry: Registry,

    // Device metrics
    frames_captured: IntCounter,
    frame_bytes: IntGauge,
    device_up: IntGauge,

    // Stream metrics
    active_streams: IntGauge,
    chunks_sent: IntCounter,
}

impl StreamMetrics {
    /// Creates a registry with all bridge metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let frames_captured = IntCounter::new(
            "serial_mjpeg_frames_captured_total",
            "Total number of complete frames received from the device",
        )?;
        let frame_bytes = IntGauge::new(
            "serial_mjpeg_frame_bytes",
            "Size of the most recently captured frame in bytes",
        )?;
        let device_up = IntGauge::new(
            "serial_mjpeg_device_up",
            "Whether the device polling loop is running (1=running, 0=stopped)",
        )?;
        let active_streams = IntGauge::new(
            "serial_mjpeg_active_streams",
            "Number of connected MJPEG stream clients",
        )?;
        let chunks_sent = IntCounter::new(
            "serial_mjpeg_chunks_sent_total",
            "Total multipart chunks handed to stream clients",
        )?;

        registry.register(Box::new(frames_captured.clone()))?;
        registry.register(Box::new(frame_bytes.clone()))?;
        registry.register(Box::new(device_up.clone()))?;
        registry.register(Box::new(active_streams.clone()))?;
        registry.register(Box::new(chunks_sent.clone()))?;

        Ok(Self {
            registry,
            frames_captured,
            frame_bytes,
            device_up,
            active_streams,
            chunks_sent,
        })
    }

    /// Records one complete frame from the device.
    pub fn record_frame(&self, len: usize) {
        self.frames_captured.inc();
        self.frame_bytes.set(len as i64);
    }

    /// Marks the device loop as running or stopped.
    pub fn set_device_up(&self, up: bool) {
        self.device_up.set(if up { 1 } else { 0 });
    }

    /// Counts a newly connected stream client.
    pub fn stream_opened(&self) {
        self.active_streams.inc();
    }

    /// Counts a stream client that went away.
    pub fn stream_closed(&self) {
        self.active_streams.dec();
    }

    /// Counts one multipart chunk handed to a client.
    pub fn record_chunk(&self) {
        self.chunks_sent.inc();
    }

    /// Returns the number of currently connected stream clients.
    pub fn active_streams(&self) -> i64 {
        self.active_streams.get()
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for StreamMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamMetrics")
            .field("frames_captured", &self.frames_captured.get())
            .field("active_streams", &self.active_streams.get())
            .finish()
    }
}
