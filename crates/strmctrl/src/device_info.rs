//! Identity of an attached panel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Location and serial number of a Stream Controller SE on the USB bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub bus: u8,
    pub address: u8,
    pub serial: String,
}

impl DeviceInfo {
    pub fn new(bus: u8, address: u8, serial: impl Into<String>) -> Self {
        Self {
            bus,
            address,
            serial: serial.into(),
        }
    }

    /// `true` when `serial` is empty (any device) or equal to this device's serial.
    pub fn matches_serial(&self, serial: &str) -> bool {
        serial.is_empty() || self.serial == serial
    }

    /// One-line description, e.g. `Bus 001 Device 004 Serial: ABC123`.
    pub fn descriptor(&self) -> String {
        format!(
            "Bus {:03} Device {:03} Serial: {}",
            self.bus, self.address, self.serial
        )
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus {:03} Device {:03}: Serial {}",
            self.bus, self.address, self.serial
        )
    }
}
