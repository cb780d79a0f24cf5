//! Serial MJPEG Bridge CLI
//!
//! Polls a serial capture device for JPEG frames and serves them as an
//! MJPEG stream over HTTP.

use clap::Parser;
use serial_mjpeg::{DeviceConfig, Supervisor};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "serial-mjpeg")]
#[command(about = "Serve frames from a serial camera as an MJPEG stream")]
#[command(version)]
struct Args {
    /// Path to the configuration file (.json or .toml)
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Serial MJPEG bridge v{}", serial_mjpeg::VERSION);

    let config = match DeviceConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        device = %config.device,
        baud = config.baud,
        listen = %config.listen,
        port = config.port,
        path = %config.path,
        "Configuration loaded"
    );

    let supervisor = match Supervisor::new(config) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            eprintln!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = supervisor.shutdown().install_signal_handler() {
        eprintln!("Failed to install signal handler: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = supervisor.run().await {
        error!(error = %e, "Bridge stopped with an error");
        std::process::exit(1);
    }

    info!("Done");
}
