//! Bridge configuration.
//!
//! The file is read once at startup and never changes afterwards. The
//! flat key layout (`device`, `baud`, `keyword`, `listen`, `port`,
//! `path`) is accepted both as JSON and as TOML.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Default serial read timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
/// Default delay between two chunks of one stream (20 fps).
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 50;
/// Default upper bound accepted for a frame length header.
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// Parity setting for the serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Complete configuration for one device and its HTTP stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Serial port identifier, e.g. `/dev/ttyACM0` or `COM3`.
    pub device: String,
    /// Serial baud rate.
    pub baud: u32,
    /// ASCII word that asks the device for one capture.
    pub keyword: String,
    /// HTTP bind address.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// HTTP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Route serving the MJPEG stream.
    #[serde(default = "default_path")]
    pub path: String,
    /// Bound on every serial read, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Delay between chunks of one stream, in milliseconds.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Largest frame length header accepted from the device.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: u32,
    /// Data bits per character (5-8).
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Parity mode.
    #[serde(default)]
    pub parity: Parity,
    /// Stop bits (1 or 2).
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Assert DTR when the port is opened.
    #[serde(default = "default_dtr_on_open")]
    pub dtr_on_open: bool,
    /// Optional Prometheus endpoint, disabled when absent.
    #[serde(default)]
    pub metrics_path: Option<String>,
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_path() -> String {
    "/".to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_frame_interval_ms() -> u64 {
    DEFAULT_FRAME_INTERVAL_MS
}

fn default_max_frame_bytes() -> u32 {
    DEFAULT_MAX_FRAME_BYTES
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_dtr_on_open() -> bool {
    true
}

/// Serial port parameters extracted from a [`DeviceConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Serial port identifier.
    pub device: String,
    /// Baud rate.
    pub baud: u32,
    /// Data bits per character (5-8).
    pub data_bits: u8,
    /// Parity mode.
    pub parity: Parity,
    /// Stop bits (1 or 2).
    pub stop_bits: u8,
    /// Assert DTR after opening.
    pub dtr_on_open: bool,
    /// Bound on every read.
    pub timeout: Duration,
}

/// HTTP serving parameters extracted from a [`DeviceConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// Address the server listens on.
    pub bind_addr: SocketAddr,
    /// Route serving the stream.
    pub path: String,
    /// Delay between chunks of one stream.
    pub frame_interval: Duration,
    /// Prometheus route, if enabled.
    pub metrics_path: Option<String>,
}

impl DeviceConfig {
    /// Creates a configuration with defaults for everything but the device.
    pub fn new(device: impl Into<String>, baud: u32, keyword: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            baud,
            keyword: keyword.into(),
            listen: default_listen(),
            port: default_port(),
            path: default_path(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            data_bits: default_data_bits(),
            parity: Parity::None,
            stop_bits: default_stop_bits(),
            dtr_on_open: default_dtr_on_open(),
            metrics_path: None,
        }
    }

    /// Loads configuration from a JSON (`.json`) or TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(format!("{}: {}", path.display(), e)))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::from_json(&content)?
        } else {
            Self::from_toml(&content)?
        };

        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parses and validates a JSON document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: DeviceConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: DeviceConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.trim().is_empty() {
            return Err(ConfigError::invalid("device", "must not be empty"));
        }
        if self.baud == 0 {
            return Err(ConfigError::invalid("baud", "must be greater than zero"));
        }
        if self.keyword.is_empty() {
            return Err(ConfigError::invalid("keyword", "must not be empty"));
        }
        if !self.keyword.is_ascii() {
            return Err(ConfigError::invalid("keyword", "must be ASCII"));
        }
        if !self.path.starts_with('/') {
            return Err(ConfigError::invalid("path", "must start with '/'"));
        }
        if let Some(metrics_path) = &self.metrics_path {
            if !metrics_path.starts_with('/') {
                return Err(ConfigError::invalid("metrics_path", "must start with '/'"));
            }
            if *metrics_path == self.path {
                return Err(ConfigError::invalid("metrics_path", "must differ from path"));
            }
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("timeout_ms", "must be greater than zero"));
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "frame_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::invalid(
                "max_frame_bytes",
                "must be greater than zero",
            ));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(ConfigError::invalid("data_bits", "must be 5-8"));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(ConfigError::invalid("stop_bits", "must be 1 or 2"));
        }
        self.bind_addr()?;
        Ok(())
    }

    /// Resolves `listen` and `port` into a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .listen
            .parse()
            .map_err(|_| ConfigError::invalid("listen", "must be an IP address"))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Serial read timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay between stream chunks.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Serial port parameters.
    pub fn serial(&self) -> SerialSettings {
        SerialSettings {
            device: self.device.clone(),
            baud: self.baud,
            data_bits: self.data_bits,
            parity: self.parity,
            stop_bits: self.stop_bits,
            dtr_on_open: self.dtr_on_open,
            timeout: self.timeout(),
        }
    }

    /// HTTP serving parameters.
    pub fn http(&self) -> Result<HttpSettings, ConfigError> {
        Ok(HttpSettings {
            bind_addr: self.bind_addr()?,
            path: self.path.clone(),
            frame_interval: self.frame_interval(),
            metrics_path: self.metrics_path.clone(),
        })
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    FileRead(String),
    /// The file is not valid JSON/TOML or misses required keys.
    #[error("failed to parse config file: {0}")]
    Parse(String),
    /// A value is out of range.
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}
