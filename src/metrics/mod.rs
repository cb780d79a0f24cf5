//! Prometheus metrics for the bridge.
//!
//! # Metrics Exposed
//!
//! ## Device Metrics
//! - `serial_mjpeg_frames_captured_total` - Complete frames received
//! - `serial_mjpeg_frame_bytes` - Size of the latest frame
//! - `serial_mjpeg_device_up` - Polling loop running (1) or stopped (0)
//!
//! ## Stream Metrics
//! - `serial_mjpeg_active_streams` - Connected stream clients
//! - `serial_mjpeg_chunks_sent_total` - Multipart chunks handed to clients
//!
//! `serial_mjpeg_device_up 0` with streams still active means clients
//! are watching a stale frame. The stream itself carries no such signal.

mod collector;

pub use collector::{MetricsError, StreamMetrics};
