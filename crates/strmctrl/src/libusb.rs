//! libusb backend built on `rusb`.

use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rusb::{Context, DeviceHandle, Speed, UsbContext};
use tracing::{debug, warn};

use crate::error::{TransportError, TransportResult};
use crate::transport::{Direction, EndpointInfo, TransferKind, UsbBus, UsbDevice};

impl From<rusb::Error> for TransportError {
    fn from(err: rusb::Error) -> Self {
        match err {
            rusb::Error::Timeout => TransportError::Timeout,
            rusb::Error::NoDevice => TransportError::Disconnected,
            other => TransportError::Usb(other.to_string()),
        }
    }
}

/// A libusb context; dropping it releases the context.
pub struct LibusbBus {
    context: Context,
}

impl LibusbBus {
    pub fn new() -> TransportResult<Self> {
        Ok(Self {
            context: Context::new()?,
        })
    }
}

impl UsbBus for LibusbBus {
    fn open_devices(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> TransportResult<Vec<Box<dyn UsbDevice>>> {
        let mut opened: Vec<Box<dyn UsbDevice>> = Vec::new();
        for device in self.context.devices()?.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    debug!(
                        "Skipping device {:03}:{:03}: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };
            if descriptor.vendor_id() != vendor_id || descriptor.product_id() != product_id {
                continue;
            }
            match device.open() {
                Ok(handle) => {
                    let serial = handle
                        .read_serial_number_string_ascii(&descriptor)
                        .unwrap_or_else(|e| {
                            debug!(
                                "No serial number on {:03}:{:03}: {}",
                                device.bus_number(),
                                device.address(),
                                e
                            );
                            String::new()
                        });
                    opened.push(Box::new(LibusbDevice {
                        bus_number: device.bus_number(),
                        address: device.address(),
                        speed: device.speed(),
                        serial,
                        device,
                        handle: RwLock::new(Some(handle)),
                        claimed: Mutex::new(None),
                    }));
                }
                Err(e) => warn!(
                    "Failed to open device {:03}:{:03}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                ),
            }
        }
        Ok(opened)
    }
}

/// One open libusb handle.
///
/// Transfers take the handle's read lock; lifecycle changes take the write lock.
pub struct LibusbDevice {
    device: rusb::Device<Context>,
    handle: RwLock<Option<DeviceHandle<Context>>>,
    claimed: Mutex<Option<u8>>,
    bus_number: u8,
    address: u8,
    speed: Speed,
    serial: String,
}

impl LibusbDevice {
    fn with_handle_mut<T>(
        &self,
        op: impl FnOnce(&mut DeviceHandle<Context>) -> rusb::Result<T>,
    ) -> TransportResult<T> {
        let mut guard = self.handle.write();
        let handle = guard.as_mut().ok_or(TransportError::NotOpen)?;
        Ok(op(handle)?)
    }

    fn with_handle<T>(
        &self,
        op: impl FnOnce(&DeviceHandle<Context>) -> rusb::Result<T>,
    ) -> TransportResult<T> {
        let guard = self.handle.read();
        let handle = guard.as_ref().ok_or(TransportError::NotOpen)?;
        Ok(op(handle)?)
    }
}

/// Host poll interval for an endpoint's `bInterval` at the given bus speed.
///
/// High-speed and faster buses count in 125 µs microframes as
/// `2^(bInterval - 1)`; slower buses count in whole milliseconds.
pub fn poll_interval(speed: Speed, b_interval: u8) -> Duration {
    match speed {
        Speed::High | Speed::Super | Speed::SuperPlus => {
            let exponent = u32::from(b_interval.clamp(1, 16).saturating_sub(1));
            Duration::from_micros(125u64 << exponent)
        }
        _ => Duration::from_millis(u64::from(b_interval)),
    }
}

impl UsbDevice for LibusbDevice {
    fn bus_number(&self) -> u8 {
        self.bus_number
    }

    fn address(&self) -> u8 {
        self.address
    }

    fn serial_number(&self) -> String {
        self.serial.clone()
    }

    fn set_auto_detach_kernel_driver(&self, enable: bool) -> TransportResult<()> {
        let mut guard = self.handle.write();
        let handle = guard.as_mut().ok_or(TransportError::NotOpen)?;
        match handle.set_auto_detach_kernel_driver(enable) {
            Ok(()) => Ok(()),
            // Platforms without detachable kernel drivers.
            Err(rusb::Error::NotSupported) => {
                debug!("Kernel driver auto-detach unsupported");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn reset(&self) -> TransportResult<()> {
        self.with_handle_mut(|h| h.reset())
    }

    fn set_configuration(&self, configuration: u8) -> TransportResult<()> {
        self.with_handle_mut(|h| h.set_active_configuration(configuration))
    }

    fn claim_interface(&self, interface: u8, alt_setting: u8) -> TransportResult<()> {
        self.with_handle_mut(|h| h.claim_interface(interface))?;
        *self.claimed.lock() = Some(interface);
        self.with_handle_mut(|h| h.set_alternate_setting(interface, alt_setting))
    }

    fn endpoint(
        &self,
        interface: u8,
        alt_setting: u8,
        number: u8,
        direction: Direction,
    ) -> TransportResult<EndpointInfo> {
        let config = self.device.active_config_descriptor()?;
        let wanted = match direction {
            Direction::In => rusb::Direction::In,
            Direction::Out => rusb::Direction::Out,
        };
        let endpoint = config
            .interfaces()
            .flat_map(|i| i.descriptors())
            .filter(|d| d.interface_number() == interface && d.setting_number() == alt_setting)
            .flat_map(|d| d.endpoint_descriptors().collect::<Vec<_>>())
            .find(|e| e.number() == number && e.direction() == wanted)
            .ok_or(TransportError::EndpointNotFound {
                interface,
                number,
                direction,
            })?;

        let transfer = match endpoint.transfer_type() {
            rusb::TransferType::Interrupt => TransferKind::Interrupt,
            _ => TransferKind::Bulk,
        };
        Ok(EndpointInfo {
            address: endpoint.address(),
            direction,
            transfer,
            max_packet_size: usize::from(endpoint.max_packet_size() & 0x07FF),
            poll_interval: poll_interval(self.speed, endpoint.interval()),
        })
    }

    fn write(
        &self,
        endpoint: &EndpointInfo,
        data: &[u8],
        timeout: Duration,
    ) -> TransportResult<usize> {
        self.with_handle(|h| match endpoint.transfer {
            TransferKind::Interrupt => h.write_interrupt(endpoint.address, data, timeout),
            TransferKind::Bulk => h.write_bulk(endpoint.address, data, timeout),
        })
    }

    fn read(
        &self,
        endpoint: &EndpointInfo,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransportResult<usize> {
        self.with_handle(|h| match endpoint.transfer {
            TransferKind::Interrupt => h.read_interrupt(endpoint.address, buf, timeout),
            TransferKind::Bulk => h.read_bulk(endpoint.address, buf, timeout),
        })
    }

    fn release_interface(&self) -> TransportResult<()> {
        let Some(interface) = self.claimed.lock().take() else {
            return Ok(());
        };
        self.with_handle_mut(|h| h.release_interface(interface))
    }

    fn release_configuration(&self) -> TransportResult<()> {
        // libusb keeps the configuration selected until the handle closes.
        debug!("Configuration released with device handle");
        Ok(())
    }

    fn close(&self) -> TransportResult<()> {
        let handle = self.handle.write().take().ok_or(TransportError::NotOpen)?;
        drop(handle);
        Ok(())
    }
}
