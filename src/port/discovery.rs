//! Serial device enumeration for the `--list` startup mode.

use super::error::PortError;
use serialport::{available_ports, SerialPortInfo, SerialPortType};
use std::fmt;

/// USB identity of a serial adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbInfo {
    pub vid: u16,
    pub pid: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// One serial device found on the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub usb: Option<UsbInfo>,
    pub kind: &'static str,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (usb, kind) = match info.port_type {
            SerialPortType::UsbPort(usb) => (
                Some(UsbInfo {
                    vid: usb.vid,
                    pid: usb.pid,
                    serial_number: usb.serial_number,
                    manufacturer: usb.manufacturer,
                    product: usb.product,
                }),
                "usb",
            ),
            SerialPortType::BluetoothPort => (None, "bluetooth"),
            SerialPortType::PciPort => (None, "pci"),
            SerialPortType::Unknown => (None, "unknown"),
        };

        Self {
            name: info.port_name,
            usb,
            kind,
        }
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Found port: {}", self.name)?;
        match &self.usb {
            Some(usb) => {
                writeln!(f, " - USB ID     {:04x}:{:04x}", usb.vid, usb.pid)?;
                if let Some(serial) = &usb.serial_number {
                    writeln!(f, " - USB serial {serial}")?;
                }
                if let Some(manufacturer) = &usb.manufacturer {
                    writeln!(f, " - Vendor     {manufacturer}")?;
                }
                if let Some(product) = &usb.product {
                    writeln!(f, " - Product    {product}")?;
                }
                Ok(())
            }
            None => writeln!(f, " - Type       {}", self.kind),
        }
    }
}

/// Enumerate the serial devices currently present.
pub fn list_ports() -> Result<Vec<PortInfo>, PortError> {
    let ports = available_ports()?;
    Ok(ports.into_iter().map(PortInfo::from).collect())
}
