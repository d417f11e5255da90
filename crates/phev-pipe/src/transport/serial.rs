//! Serial port handling
//!
//! Provides serial access to the vehicle gateway (USB adapters and BLE/SPP
//! bridges that show up as serial devices).

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Channel, Connector, SerialChannel};
use crate::error::PipeError;

/// Default baud rate for the gateway link
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                (Some(usb_info.vid), Some(usb_info.pid), usb_info.product)
            }
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// Sort key: rfcomm (Bluetooth serial) first, then ttyACM, then ttyUSB, each
/// numerically, then everything else by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0u8, "rfcomm"), (1, "ttyACM"), (2, "ttyUSB")] {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank, num, basename.to_string());
        }
    }
    (3, 0, basename.to_string())
}

/// List available serial ports in a stable order
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // Bluetooth serial bindings are often missed by the enumeration API
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("rfcomm") || fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone()).or_insert_with(|| PortInfo {
                        name: full,
                        vid: None,
                        pid: None,
                        product: None,
                    });
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Open a serial port with a short read timeout
pub fn open_port(name: &str, baud_rate: Option<u32>) -> Result<Box<dyn SerialPort>, PipeError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

    serialport::new(name, baud)
        .timeout(Duration::from_millis(100))
        .open()
        .map_err(|e| PipeError::SerialError(format!("{}: {}", name, e)))
}

/// Configure a serial port for 8N1 without flow control
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), PipeError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| PipeError::SerialError(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| PipeError::SerialError(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| PipeError::SerialError(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| PipeError::SerialError(e.to_string()))?;

    // Some adapters reset the gateway when DTR drops
    if let Err(e) = port.write_data_terminal_ready(true) {
        warn!(error = %e, "failed to set DTR high, continuing");
    }

    Ok(())
}

/// Opens the serial port on demand
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port_name: String,
    baud_rate: u32,
}

impl SerialConnector {
    /// Connector for a named port
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
        }
    }
}

impl Connector for SerialConnector {
    fn connect(&mut self) -> Result<Box<dyn Channel>, PipeError> {
        let mut port = open_port(&self.port_name, Some(self.baud_rate))?;
        configure_port(port.as_mut())?;
        port.clear(serialport::ClearBuffer::All)
            .map_err(|e| PipeError::SerialError(e.to_string()))?;
        debug!(port = %self.port_name, baud = self.baud_rate, "serial port open");

        Ok(Box::new(SerialChannel::new(port)))
    }

    fn describe(&self) -> String {
        format!("serial://{}@{}", self.port_name, self.baud_rate)
    }
}
