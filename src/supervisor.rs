//! Startup, wiring and shutdown of the bridge.
//!
//! The supervisor opens the serial port, starts the device link on its
//! own thread and then serves HTTP until the shutdown token fires. The
//! link closes the port when it returns.

use crate::config::{ConfigError, DeviceConfig};
use crate::device::{
    DeviceLink, FrameProtocol, LinkExit, SerialTransport, Transport, TransportError,
};
use crate::frame::FrameSlot;
use crate::metrics::{MetricsError, StreamMetrics};
use crate::shutdown::Shutdown;
use crate::stream::{ServerError, StreamPublisher};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

/// Errors that stop the bridge from starting or running.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The serial port could not be opened.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Binding or serving HTTP failed.
    #[error(transparent)]
    Server(#[from] ServerError),
    /// The metrics registry could not be set up.
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    /// The device link thread could not be started.
    #[error("failed to start device link thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Owns the configuration and the state shared by both loops.
pub struct Supervisor {
    config: DeviceConfig,
    slot: Arc<FrameSlot>,
    shutdown: Shutdown,
    metrics: StreamMetrics,
}

impl Supervisor {
    /// Validates the configuration and prepares the shared state.
    pub fn new(config: DeviceConfig) -> Result<Self, SupervisorError> {
        config.validate()?;
        Ok(Self {
            config,
            slot: Arc::new(FrameSlot::new()),
            shutdown: Shutdown::new(),
            metrics: StreamMetrics::new()?,
        })
    }

    /// Token that stops both loops when triggered.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// The slot the device link publishes into.
    pub fn slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.slot)
    }

    /// Metrics shared by the link and the stream handlers.
    pub fn metrics(&self) -> StreamMetrics {
        self.metrics.clone()
    }

    /// Opens the serial port, binds HTTP and runs until shutdown.
    pub async fn run(self) -> Result<(), SupervisorError> {
        let transport = SerialTransport::open(&self.config.serial())?;
        let listener = self.publisher()?.bind().await?;
        self.run_with_transport(transport, listener).await
    }

    fn publisher(&self) -> Result<StreamPublisher, SupervisorError> {
        Ok(StreamPublisher::new(
            self.config.http()?,
            Arc::clone(&self.slot),
            self.shutdown.clone(),
            self.metrics.clone(),
        ))
    }

    /// Runs both loops over an already opened transport and listener.
    pub async fn run_with_transport<T>(
        self,
        transport: T,
        listener: TcpListener,
    ) -> Result<(), SupervisorError>
    where
        T: Transport + 'static,
    {
        let publisher = self.publisher()?;
        let Supervisor {
            config,
            slot,
            shutdown,
            metrics,
        } = self;

        let protocol = FrameProtocol::new(&config.keyword, config.max_frame_bytes);
        let link = DeviceLink::new(transport, protocol, slot, shutdown.clone())
            .with_metrics(metrics)
            .spawn()
            .map_err(SupervisorError::Spawn)?;

        let served = publisher.serve(listener).await;

        // The server may also return on error; the link must stop either way.
        shutdown.trigger();
        match tokio::task::spawn_blocking(move || link.join()).await {
            Ok(Ok(LinkExit::Shutdown)) => {}
            Ok(Ok(LinkExit::Failed(err))) => {
                tracing::debug!(error = %err, "Device link had already stopped")
            }
            Ok(Err(_)) | Err(_) => tracing::warn!("Device link thread panicked"),
        }

        served?;
        Ok(())
    }
}
