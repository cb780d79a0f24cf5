//! MJPEG publishing over HTTP.
//!
//! Every connected client gets an independent loop that re-reads the
//! shared frame slot on a fixed cadence and emits one multipart part per
//! tick, whether or not the device produced a new frame. A client that
//! disconnects only ends its own loop.
//!
//! There is no staleness signal: if the device link stops, clients keep
//! receiving the last captured frame until the process shuts down.

mod chunk;
mod server;

pub use chunk::{encode_chunk, BOUNDARY, CONTENT_TYPE};
pub use server::{ServerError, StreamPublisher};
