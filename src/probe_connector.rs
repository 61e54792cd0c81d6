//! Device discovery and connection.
//!
//! LogicProbe hardware enumerates as a USB CDC serial port. Discovery walks
//! the system port list and keeps ports whose USB vendor/product pair is on
//! the allowlist; connecting validates an explicitly named port the same way
//! before opening it.

use crate::probe_link::{LinkError, ProbeLink};
use serialport::SerialPortType;

/// Serial baud rate the firmware's CDC endpoint runs at.
pub const PROBE_BAUD_RATE: u32 = 115_200;

/// USB vendor/product pairs the firmware enumerates with.
const VALID_USB_IDS: [(u16, u16); 2] = [
    (0x0483, 0x5740), // STM32 virtual COM port
    (0x1a86, 0x7523), // CH340 bridge on older revisions
];

#[derive(Debug, Clone)]
pub struct ProbeDevice {
    pub name: String,
    pub port: String,
}

impl ProbeDevice {
    pub fn new(name: String, port: String) -> Self {
        Self { name, port }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Port {port} is not a LogicProbe device")]
    InvalidPort { port: String },

    #[error("No LogicProbe device found. Please connect one or specify the port manually")]
    DeviceNotFound,
}

pub struct ProbeConnector;

impl ProbeConnector {
    /// Connect to a LogicProbe device.
    ///
    /// With an explicit `port` the port is validated against the device list
    /// before opening; otherwise the first discovered device is used.
    pub fn connect(port: Option<&str>) -> Result<ProbeLink, ConnectorError> {
        let port = if let Some(port) = port {
            log::debug!("Connecting to LogicProbe on port {port}");
            Self::validate_port(port)?;
            port.to_string()
        } else {
            Self::find_device_port()?
        };

        Ok(ProbeLink::open(&port, PROBE_BAUD_RATE)?)
    }

    /// Validate that a given port corresponds to a LogicProbe device.
    fn validate_port(port: &str) -> Result<(), ConnectorError> {
        let devices = Self::get_available_devices()?;

        if !devices.iter().any(|d| d.port == port) {
            return Err(ConnectorError::InvalidPort {
                port: port.to_string(),
            });
        }

        Ok(())
    }

    /// All serial ports that look like LogicProbe hardware.
    pub fn get_available_devices() -> Result<Vec<ProbeDevice>, ConnectorError> {
        let mut devices = Vec::new();

        for port in serialport::available_ports()? {
            let SerialPortType::UsbPort(usb) = &port.port_type else {
                continue;
            };
            if !VALID_USB_IDS
                .iter()
                .any(|&(vid, pid)| usb.vid == vid && usb.pid == pid)
            {
                continue;
            }
            let name = usb
                .product
                .clone()
                .unwrap_or_else(|| "LogicProbe".to_string());
            log::debug!("Found candidate device {name} at {}", port.port_name);
            devices.push(ProbeDevice::new(name, port.port_name));
        }

        Ok(devices)
    }

    /// Port of the first discovered device.
    fn find_device_port() -> Result<String, ConnectorError> {
        log::debug!("Searching for a LogicProbe device");

        Self::get_available_devices()?
            .into_iter()
            .next()
            .map(|device| device.port)
            .ok_or(ConnectorError::DeviceNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_reports_valid_devices() {
        // Depends on what hardware is attached; found devices must at least
        // carry a name and a port.
        match ProbeConnector::get_available_devices() {
            Ok(devices) => {
                for device in devices {
                    assert!(!device.name.is_empty());
                    assert!(!device.port.is_empty());
                }
            }
            Err(ConnectorError::Serial(_)) => {
                // Expected where port enumeration is unavailable.
            }
            Err(e) => panic!("Unexpected error: {e:?}"),
        }
    }

    #[test]
    fn unknown_port_is_rejected() {
        let result = ProbeConnector::connect(Some("/dev/does-not-exist"));
        assert!(matches!(
            result,
            Err(ConnectorError::InvalidPort { .. }) | Err(ConnectorError::Serial(_))
        ));
    }
}
