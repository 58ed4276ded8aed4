//! Configuration for the SetuIO daemon
//!
//! Loads configuration from a TOML file with the minimal parameters needed
//! to bridge the vehicle serial link to dashboard viewers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub network: NetworkConfig,
    pub stream: StreamConfig,
    pub battery: BatteryConfig,
    pub logging: LoggingConfig,
}

/// Serial link configuration (vehicle microcontroller)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM3")
    pub port: String,
    /// Baud rate of the vehicle MCU link
    pub baud_rate: u32,
    /// Open the serial link at startup instead of waiting for the
    /// first camera_ready trigger from a viewer
    pub eager_connect: bool,
}

/// TCP viewer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// TCP bind address for dashboard viewers
    ///
    /// Examples:
    /// - `0.0.0.0:5000` - Bind to all interfaces on port 5000
    /// - `127.0.0.1:5000` - Localhost only
    pub bind_address: String,
}

/// Streaming behavior configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Minimum interval between relayed image frames per team (ms)
    pub frame_window_ms: u64,
    /// Wire format for viewer payloads ("json" or "postcard")
    pub wire_format: String,
}

/// Battery simulation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatteryConfig {
    /// Battery level reported before any drain has happened (percent)
    pub initial_level: f64,
    /// Seconds between 1% drain steps while viewers are connected
    pub drain_period_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: AppConfig =
            toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Default configuration matching the deployed ground station
    pub fn asv_defaults() -> Self {
        Self {
            serial: SerialConfig {
                port: "COM3".to_string(),
                baud_rate: 9600,
                eager_connect: false,
            },
            network: NetworkConfig {
                bind_address: "0.0.0.0:5000".to_string(),
            },
            stream: StreamConfig {
                frame_window_ms: 80,
                wire_format: "json".to_string(),
            },
            battery: BatteryConfig {
                initial_level: 100.0,
                drain_period_secs: 60,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    /// Apply environment variable overrides (PORT replaces the bind port)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            self.network.bind_address = override_port(&self.network.bind_address, &port);
        }
    }
}

/// Replace the port part of a `host:port` address, keeping the host.
///
/// Invalid port strings leave the address untouched.
fn override_port(address: &str, port: &str) -> String {
    if port.parse::<u16>().is_err() {
        log::warn!("Ignoring invalid PORT override: {}", port);
        return address.to_string();
    }
    match address.rsplit_once(':') {
        Some((host, _)) => format!("{}:{}", host, port),
        None => format!("{}:{}", address, port),
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::asv_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::asv_defaults();
        assert_eq!(config.serial.port, "COM3");
        assert_eq!(config.serial.baud_rate, 9600);
        assert!(!config.serial.eager_connect);
        assert_eq!(config.network.bind_address, "0.0.0.0:5000");
        assert_eq!(config.stream.frame_window_ms, 80);
        assert_eq!(config.battery.initial_level, 100.0);
        assert_eq!(config.battery.drain_period_secs, 60);
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::asv_defaults();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        // Should contain all sections
        assert!(toml_string.contains("[serial]"));
        assert!(toml_string.contains("[network]"));
        assert!(toml_string.contains("[stream]"));
        assert!(toml_string.contains("[battery]"));
        assert!(toml_string.contains("[logging]"));

        // Should contain key values
        assert!(toml_string.contains("baud_rate = 9600"));
        assert!(toml_string.contains("frame_window_ms = 80"));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[serial]
port = "/dev/ttyUSB0"
baud_rate = 115200
eager_connect = true

[network]
bind_address = "127.0.0.1:6000"

[stream]
frame_window_ms = 200
wire_format = "postcard"

[battery]
initial_level = 80.0
drain_period_secs = 30

[logging]
level = "debug"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 115200);
        assert!(config.serial.eager_connect);
        assert_eq!(config.network.bind_address, "127.0.0.1:6000");
        assert_eq!(config.stream.frame_window_ms, 200);
        assert_eq!(config.stream.wire_format, "postcard");
        assert_eq!(config.battery.drain_period_secs, 30);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_override_port() {
        assert_eq!(override_port("0.0.0.0:5000", "8080"), "0.0.0.0:8080");
        assert_eq!(override_port("127.0.0.1:5000", "6000"), "127.0.0.1:6000");
        assert_eq!(override_port("0.0.0.0:5000", "junk"), "0.0.0.0:5000");
    }
}
