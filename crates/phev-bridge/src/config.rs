//! Bridge configuration
//!
//! Loaded from a JSON file. Every field has a default, so an empty object is a
//! valid config that runs against the simulated vehicle.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use phev_pipe::demo::DemoConnector;
use phev_pipe::transport::{Connector, SerialConnector, TcpConnector, DEFAULT_BAUD_RATE};
use serde::{Deserialize, Serialize};

/// Where the vehicle gateway is reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VehicleEndpoint {
    /// Serial device, usually an rfcomm port bound to the gateway
    Serial {
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// Gateway reachable over TCP
    Tcp { address: String },
    /// Simulated vehicle
    Demo {
        #[serde(default)]
        seed: u64,
    },
}

impl Default for VehicleEndpoint {
    fn default() -> Self {
        Self::Demo { seed: 0 }
    }
}

impl VehicleEndpoint {
    /// Build the connector for this endpoint
    pub fn connector(&self) -> Box<dyn Connector> {
        match self {
            Self::Serial { port, baud_rate } => Box::new(SerialConnector::new(port.clone(), *baud_rate)),
            Self::Tcp { address } => Box::new(TcpConnector::new(address.clone())),
            Self::Demo { seed } => Box::new(DemoConnector::new(*seed)),
        }
    }
}

/// Application side of the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppEndpoint {
    /// TCP address of the client application
    pub address: String,
}

impl Default for AppEndpoint {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Full bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Pipe name used in logs and event output
    pub name: String,
    pub vehicle: VehicleEndpoint,
    pub app: AppEndpoint,
    pub read_timeout_ms: u64,
    pub read_buffer_size: usize,
    /// Default tracing filter when `RUST_LOG` is not set
    pub log_level: String,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: "phev".to_string(),
            vehicle: VehicleEndpoint::default(),
            app: AppEndpoint::default(),
            read_timeout_ms: phev_pipe::transport::DEFAULT_READ_TIMEOUT_MS,
            read_buffer_size: phev_pipe::pipe::DEFAULT_READ_BUFFER_SIZE,
            log_level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load a config file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Read timeout as a duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = write_config("{}");
        let config = BridgeConfig::load(file.path()).unwrap();

        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.vehicle, VehicleEndpoint::Demo { seed: 0 });
        assert_eq!(config.read_timeout(), Duration::from_millis(100));
        assert_eq!(config.read_buffer_size, 1024);
    }

    #[test]
    fn test_serial_vehicle() {
        let file = write_config(
            r#"{
                "name": "outlander",
                "vehicle": { "type": "serial", "port": "/dev/rfcomm0" },
                "app": { "address": "10.0.0.2:9000" },
                "log_level": "debug"
            }"#,
        );
        let config = BridgeConfig::load(file.path()).unwrap();

        assert_eq!(config.name, "outlander");
        assert_eq!(
            config.vehicle,
            VehicleEndpoint::Serial {
                port: "/dev/rfcomm0".to_string(),
                baud_rate: DEFAULT_BAUD_RATE,
            }
        );
        assert_eq!(config.app.address, "10.0.0.2:9000");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.vehicle.connector().describe(), "serial:///dev/rfcomm0@115200");
    }

    #[test]
    fn test_tcp_vehicle() {
        let file = write_config(r#"{ "vehicle": { "type": "tcp", "address": "192.168.8.46:8080" } }"#);
        let config = BridgeConfig::load(file.path()).unwrap();

        assert_eq!(config.vehicle.connector().describe(), "tcp://192.168.8.46:8080");
    }

    #[test]
    fn test_invalid_json_reports_path() {
        let file = write_config("{ not json");
        let err = BridgeConfig::load(file.path()).unwrap_err();

        assert!(format!("{err:#}").contains("parsing config"));
    }

    #[test]
    fn test_missing_file() {
        assert!(BridgeConfig::load(Path::new("/nonexistent/phev.json")).is_err());
    }
}
