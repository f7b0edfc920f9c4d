//! USB transport seam.
//!
//! [`UsbBus`] enumerates candidate devices and [`UsbDevice`] drives one open
//! handle. All methods take `&self` so a device can be shared between the
//! caller, the keep-alive thread and the event poller; implementations
//! serialize lifecycle changes internally.

use std::time::Duration;

use crate::error::TransportResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    Bulk,
    Interrupt,
}

/// Resolved endpoint of the claimed interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointInfo {
    /// Full endpoint address including the direction bit.
    pub address: u8,
    pub direction: Direction,
    pub transfer: TransferKind,
    pub max_packet_size: usize,
    /// Host poll interval derived from `bInterval` and the bus speed.
    pub poll_interval: Duration,
}

impl EndpointInfo {
    pub fn number(&self) -> u8 {
        self.address & 0x0F
    }
}

pub trait UsbBus: Send + Sync {
    /// Open every attached device matching `vendor_id`/`product_id`.
    ///
    /// Devices that fail to open are skipped.
    fn open_devices(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> TransportResult<Vec<Box<dyn UsbDevice>>>;
}

pub trait UsbDevice: Send + Sync {
    fn bus_number(&self) -> u8;

    fn address(&self) -> u8;

    /// Serial number string, empty when the device does not report one.
    fn serial_number(&self) -> String;

    fn set_auto_detach_kernel_driver(&self, enable: bool) -> TransportResult<()>;

    fn reset(&self) -> TransportResult<()>;

    fn set_configuration(&self, configuration: u8) -> TransportResult<()>;

    fn claim_interface(&self, interface: u8, alt_setting: u8) -> TransportResult<()>;

    fn endpoint(
        &self,
        interface: u8,
        alt_setting: u8,
        number: u8,
        direction: Direction,
    ) -> TransportResult<EndpointInfo>;

    /// Write `data` in one transfer and return the number of bytes accepted.
    fn write(&self, endpoint: &EndpointInfo, data: &[u8], timeout: Duration)
    -> TransportResult<usize>;

    /// Read at most `buf.len()` bytes and return the number received.
    fn read(
        &self,
        endpoint: &EndpointInfo,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransportResult<usize>;

    fn release_interface(&self) -> TransportResult<()>;

    fn release_configuration(&self) -> TransportResult<()>;

    /// Close the handle; later calls fail with [`NotOpen`](crate::TransportError::NotOpen).
    fn close(&self) -> TransportResult<()>;
}

pub mod mock {
    //! In-memory bus and device that record every operation.

    use super::*;
    use crate::error::TransportError;
    use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, unbounded};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use strmctrl_protocol::{COMMAND_PREFIX, ENDPOINT_IN, ENDPOINT_OUT};

    /// One recorded call on a [`MockDevice`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum MockOp {
        SetAutoDetach(bool),
        Reset,
        SetConfiguration(u8),
        ClaimInterface { interface: u8, alt_setting: u8 },
        Write { endpoint: u8, data: Vec<u8> },
        ReleaseInterface,
        ReleaseConfiguration,
        Close,
    }

    /// Injected outcome for a single write.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum WriteFault {
        /// Fail the transfer.
        Fail,
        /// Accept only this many bytes.
        Short(usize),
    }

    struct MockState {
        vendor_id: u16,
        product_id: u16,
        bus_number: u8,
        address: u8,
        serial: String,
        in_packet_size: usize,
        out_packet_size: usize,
        poll_interval: Duration,
        ops: Mutex<Vec<MockOp>>,
        writes: Mutex<usize>,
        write_faults: Mutex<Vec<(usize, WriteFault)>>,
        fail_reset: Mutex<bool>,
        fail_claim: Mutex<bool>,
        closed: Mutex<bool>,
        reports_tx: Sender<Vec<u8>>,
        reports_rx: Receiver<Vec<u8>>,
    }

    /// Cloneable handle to a simulated panel; clones share state.
    #[derive(Clone)]
    pub struct MockDevice {
        state: Arc<MockState>,
    }

    impl MockDevice {
        pub fn new(bus_number: u8, address: u8, serial: impl Into<String>) -> Self {
            let (reports_tx, reports_rx) = unbounded();
            Self {
                state: Arc::new(MockState {
                    vendor_id: strmctrl_protocol::VENDOR_ID,
                    product_id: strmctrl_protocol::PRODUCT_ID,
                    bus_number,
                    address,
                    serial: serial.into(),
                    in_packet_size: 512,
                    out_packet_size: 512,
                    poll_interval: Duration::from_millis(1),
                    ops: Mutex::new(Vec::new()),
                    writes: Mutex::new(0),
                    write_faults: Mutex::new(Vec::new()),
                    fail_reset: Mutex::new(false),
                    fail_claim: Mutex::new(false),
                    closed: Mutex::new(false),
                    reports_tx,
                    reports_rx,
                }),
            }
        }

        /// Same device with a different USB identity.
        pub fn with_ids(self, vendor_id: u16, product_id: u16) -> Self {
            self.rebuild(|state| {
                state.vendor_id = vendor_id;
                state.product_id = product_id;
            })
        }

        /// Same device with different endpoint packet sizes.
        pub fn with_packet_sizes(self, in_packet_size: usize, out_packet_size: usize) -> Self {
            self.rebuild(|state| {
                state.in_packet_size = in_packet_size;
                state.out_packet_size = out_packet_size;
            })
        }

        fn rebuild(self, edit: impl FnOnce(&mut MockState)) -> Self {
            let (reports_tx, reports_rx) = unbounded();
            let mut state = MockState {
                vendor_id: self.state.vendor_id,
                product_id: self.state.product_id,
                bus_number: self.state.bus_number,
                address: self.state.address,
                serial: self.state.serial.clone(),
                in_packet_size: self.state.in_packet_size,
                out_packet_size: self.state.out_packet_size,
                poll_interval: self.state.poll_interval,
                ops: Mutex::new(Vec::new()),
                writes: Mutex::new(0),
                write_faults: Mutex::new(Vec::new()),
                fail_reset: Mutex::new(false),
                fail_claim: Mutex::new(false),
                closed: Mutex::new(false),
                reports_tx,
                reports_rx,
            };
            edit(&mut state);
            Self {
                state: Arc::new(state),
            }
        }

        pub fn out_packet_size(&self) -> usize {
            self.state.out_packet_size
        }

        /// Deliver `report` on the next inbound read.
        pub fn queue_report(&self, report: Vec<u8>) {
            // The receiver lives as long as the state, so this cannot fail.
            let _sent = self.state.reports_tx.send(report);
        }

        /// Deliver a full-size report carrying `code` and `state` at the
        /// control offsets.
        pub fn queue_control(&self, code: u8, state: u8) {
            let mut report =
                vec![0u8; self.state.in_packet_size.max(strmctrl_protocol::REPORT_MIN_LEN)];
            if let Some(slot) = report.get_mut(strmctrl_protocol::CONTROL_OFFSET) {
                *slot = code;
            }
            if let Some(slot) = report.get_mut(strmctrl_protocol::STATE_OFFSET) {
                *slot = state;
            }
            self.queue_report(report);
        }

        pub fn fail_reset(&self) {
            *self.state.fail_reset.lock() = true;
        }

        pub fn fail_claim(&self) {
            *self.state.fail_claim.lock() = true;
        }

        /// Apply `fault` to the write with zero-based index `index`.
        pub fn fail_write_at(&self, index: usize, fault: WriteFault) {
            self.state.write_faults.lock().push((index, fault));
        }

        /// Apply `fault` to the next write.
        pub fn fail_next_write(&self, fault: WriteFault) {
            let next = self.write_count();
            self.fail_write_at(next, fault);
        }

        pub fn write_count(&self) -> usize {
            *self.state.writes.lock()
        }

        pub fn ops(&self) -> Vec<MockOp> {
            self.state.ops.lock().clone()
        }

        pub fn count_ops(&self, op: &MockOp) -> usize {
            self.state.ops.lock().iter().filter(|o| *o == op).count()
        }

        /// Every write attempted on the outbound endpoint, in order.
        pub fn writes(&self) -> Vec<Vec<u8>> {
            self.state
                .ops
                .lock()
                .iter()
                .filter_map(|op| match op {
                    MockOp::Write { data, .. } => Some(data.clone()),
                    _ => None,
                })
                .collect()
        }

        /// Writes rendered as command names with arguments (`"BAT 00 9A 01"`),
        /// or `payload:<len>` for raw image data.
        pub fn written_commands(&self) -> Vec<String> {
            self.writes().iter().map(|data| describe_write(data)).collect()
        }

        pub fn is_closed(&self) -> bool {
            *self.state.closed.lock()
        }

        fn record(&self, op: MockOp) {
            self.state.ops.lock().push(op);
        }

        fn ensure_open(&self) -> TransportResult<()> {
            if self.is_closed() {
                return Err(TransportError::NotOpen);
            }
            Ok(())
        }
    }

    fn describe_write(data: &[u8]) -> String {
        let Some(rest) = data.strip_prefix(&COMMAND_PREFIX[..]) else {
            return format!("payload:{}", data.len());
        };
        let rest = rest.get(2..).unwrap_or_default();
        let name_len = rest.iter().position(|b| *b == 0).unwrap_or(rest.len());
        let (name, tail) = rest.split_at(name_len);
        let mut line = String::from_utf8_lossy(name).into_owned();
        let args = tail.get(2..).unwrap_or_default();
        let end = match line.as_str() {
            "LIG" => 1,
            "CLE" => 2,
            "BAT" => 3,
            _ => 0,
        };
        for arg in args.iter().take(end) {
            line.push_str(&format!(" {arg:02X}"));
        }
        line
    }

    impl UsbDevice for MockDevice {
        fn bus_number(&self) -> u8 {
            self.state.bus_number
        }

        fn address(&self) -> u8 {
            self.state.address
        }

        fn serial_number(&self) -> String {
            self.state.serial.clone()
        }

        fn set_auto_detach_kernel_driver(&self, enable: bool) -> TransportResult<()> {
            self.ensure_open()?;
            self.record(MockOp::SetAutoDetach(enable));
            Ok(())
        }

        fn reset(&self) -> TransportResult<()> {
            self.ensure_open()?;
            self.record(MockOp::Reset);
            if *self.state.fail_reset.lock() {
                return Err(TransportError::Usb("reset rejected".to_string()));
            }
            Ok(())
        }

        fn set_configuration(&self, configuration: u8) -> TransportResult<()> {
            self.ensure_open()?;
            self.record(MockOp::SetConfiguration(configuration));
            Ok(())
        }

        fn claim_interface(&self, interface: u8, alt_setting: u8) -> TransportResult<()> {
            self.ensure_open()?;
            self.record(MockOp::ClaimInterface {
                interface,
                alt_setting,
            });
            if *self.state.fail_claim.lock() {
                return Err(TransportError::Usb("interface busy".to_string()));
            }
            Ok(())
        }

        fn endpoint(
            &self,
            interface: u8,
            _alt_setting: u8,
            number: u8,
            direction: Direction,
        ) -> TransportResult<EndpointInfo> {
            self.ensure_open()?;
            let (expected, max_packet_size) = match direction {
                Direction::In => (ENDPOINT_IN, self.state.in_packet_size),
                Direction::Out => (ENDPOINT_OUT, self.state.out_packet_size),
            };
            if number != expected {
                return Err(TransportError::EndpointNotFound {
                    interface,
                    number,
                    direction,
                });
            }
            let address = match direction {
                Direction::In => number | 0x80,
                Direction::Out => number,
            };
            Ok(EndpointInfo {
                address,
                direction,
                transfer: TransferKind::Interrupt,
                max_packet_size,
                poll_interval: self.state.poll_interval,
            })
        }

        fn write(
            &self,
            endpoint: &EndpointInfo,
            data: &[u8],
            _timeout: Duration,
        ) -> TransportResult<usize> {
            self.ensure_open()?;
            let index = {
                let mut writes = self.state.writes.lock();
                let index = *writes;
                *writes = writes.saturating_add(1);
                index
            };
            self.record(MockOp::Write {
                endpoint: endpoint.address,
                data: data.to_vec(),
            });
            let fault = self
                .state
                .write_faults
                .lock()
                .iter()
                .find(|(at, _)| *at == index)
                .map(|(_, fault)| *fault);
            match fault {
                Some(WriteFault::Fail) => Err(TransportError::Usb("write rejected".to_string())),
                Some(WriteFault::Short(n)) => Ok(n.min(data.len())),
                None => Ok(data.len()),
            }
        }

        fn read(
            &self,
            _endpoint: &EndpointInfo,
            buf: &mut [u8],
            timeout: Duration,
        ) -> TransportResult<usize> {
            self.ensure_open()?;
            match self.state.reports_rx.recv_timeout(timeout) {
                Ok(report) => {
                    let n = report.len().min(buf.len());
                    for (dst, src) in buf.iter_mut().zip(report.iter()) {
                        *dst = *src;
                    }
                    Ok(n)
                }
                Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout),
                Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
            }
        }

        fn release_interface(&self) -> TransportResult<()> {
            self.ensure_open()?;
            self.record(MockOp::ReleaseInterface);
            Ok(())
        }

        fn release_configuration(&self) -> TransportResult<()> {
            self.ensure_open()?;
            self.record(MockOp::ReleaseConfiguration);
            Ok(())
        }

        fn close(&self) -> TransportResult<()> {
            self.ensure_open()?;
            self.record(MockOp::Close);
            *self.state.closed.lock() = true;
            Ok(())
        }
    }

    /// Bus holding a fixed set of [`MockDevice`]s.
    #[derive(Clone, Default)]
    pub struct MockBus {
        devices: Vec<MockDevice>,
    }

    impl MockBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_device(&mut self, device: MockDevice) {
            self.devices.push(device);
        }

        pub fn with_device(mut self, device: MockDevice) -> Self {
            self.add_device(device);
            self
        }

        pub fn device_count(&self) -> usize {
            self.devices.len()
        }
    }

    impl UsbBus for MockBus {
        fn open_devices(
            &self,
            vendor_id: u16,
            product_id: u16,
        ) -> TransportResult<Vec<Box<dyn UsbDevice>>> {
            Ok(self
                .devices
                .iter()
                .filter(|d| d.state.vendor_id == vendor_id && d.state.product_id == product_id)
                .map(|d| Box::new(d.clone()) as Box<dyn UsbDevice>)
                .collect())
        }
    }
}
