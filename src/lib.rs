//! Serial MJPEG Bridge Library
//!
//! Republishes still images from a serial capture device as a
//! continuously updated MJPEG (multipart/x-mixed-replace) stream.
//!
//! # Architecture
//!
//! Two loops share a single latest-frame slot:
//!
//! ```text
//! serial device → DeviceLink → FrameSlot → StreamPublisher → N HTTP clients
//!                 (1 thread)               (1 task per client)
//! ```
//!
//! # Design Principles
//!
//! - **Fail-fast device link**: the first timeout or transport error ends
//!   polling, a truncated frame is never published
//! - **Latest frame only**: no history, slow clients skip frames
//! - **Fixed cadence**: each client receives a part per interval, repeating
//!   the last frame while the device is idle or gone
//!
//! # Example
//!
//! ```no_run
//! use serial_mjpeg::{DeviceConfig, Supervisor};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeviceConfig::from_file("bridge.json")?;
//! let supervisor = Supervisor::new(config)?;
//! supervisor.shutdown().install_signal_handler()?;
//! supervisor.run().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod device;
pub mod frame;
pub mod metrics;
pub mod shutdown;
pub mod stream;
pub mod supervisor;

// Re-export commonly used types at crate root
pub use config::{ConfigError, DeviceConfig};
pub use device::{
    DeviceLink, FrameProtocol, LinkExit, MockDevice, SerialTransport, TransportError,
};
pub use frame::{Frame, FrameSlot};
pub use metrics::StreamMetrics;
pub use shutdown::Shutdown;
pub use stream::{encode_chunk, StreamPublisher};
pub use supervisor::{Supervisor, SupervisorError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
