//! Device session: open/handshake, keep-alive, event polling and commands.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use image::DynamicImage;
use parking_lot::{Mutex, RwLock};
use strmctrl_protocol::{
    CONFIGURATION, Command, CommandEncoder, Control, ENDPOINT_IN, ENDPOINT_OUT, Event, INTERFACE,
    INTERFACE_ALT_SETTING, PRODUCT_ID, REPORT_MIN_LEN, VENDOR_ID, decode_report,
};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::device_info::DeviceInfo;
use crate::error::{StrmCtrlError, StrmCtrlResult, TransportError, TransportResult};
use crate::libusb::LibusbBus;
use crate::transport::{Direction, EndpointInfo, UsbBus, UsbDevice};
use crate::upload::PreparedImage;

/// Number of display slots addressed by [`Session::set_images`].
pub const DISPLAY_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Closed,
    Opening,
    Ready,
    Closing,
}

/// List every attached Stream Controller SE.
pub fn list_devices() -> StrmCtrlResult<Vec<DeviceInfo>> {
    let bus = LibusbBus::new().map_err(StrmCtrlError::EnumerationFailed)?;
    list_devices_with(&bus)
}

/// List devices on `bus`, closing each handle after reading its identity.
pub fn list_devices_with(bus: &dyn UsbBus) -> StrmCtrlResult<Vec<DeviceInfo>> {
    let devices = bus
        .open_devices(VENDOR_ID, PRODUCT_ID)
        .map_err(StrmCtrlError::EnumerationFailed)?;
    Ok(devices
        .into_iter()
        .map(|device| {
            let info = device_info(device.as_ref());
            if let Err(e) = device.close() {
                warn!("Failed to close {}: {}", info, e);
            }
            info
        })
        .collect())
}

fn device_info(device: &dyn UsbDevice) -> DeviceInfo {
    DeviceInfo::new(
        device.bus_number(),
        device.address(),
        device.serial_number(),
    )
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now)
}

fn remaining(deadline: Instant) -> StrmCtrlResult<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
        .ok_or(StrmCtrlError::Timeout)
}

/// Resources acquired so far during open, released in reverse on failure.
#[derive(Debug, Default, Clone, Copy)]
struct Acquired {
    configured: bool,
    claimed: bool,
}

fn release(device: &dyn UsbDevice, acquired: Acquired) {
    if acquired.claimed {
        if let Err(e) = device.release_interface() {
            warn!("Failed to release interface: {}", e);
        }
    }
    if acquired.configured {
        if let Err(e) = device.release_configuration() {
            warn!("Failed to release configuration: {}", e);
        }
    }
    if let Err(e) = device.close() {
        warn!("Failed to close device: {}", e);
    }
}

struct Shared {
    device: Arc<dyn UsbDevice>,
    bus: Mutex<Option<Arc<dyn UsbBus>>>,
    info: DeviceInfo,
    config: SessionConfig,
    encoder: CommandEncoder,
    endpoint_in: EndpointInfo,
    endpoint_out: EndpointInfo,
    state: RwLock<SessionState>,
    /// Held for the whole of every outbound operation.
    outbound: Mutex<()>,
    /// Dropping the sender disconnects `closed_rx` and stops both threads.
    closed_tx: Mutex<Option<Sender<()>>>,
    closed_rx: Receiver<()>,
}

impl Shared {
    fn ensure_ready(&self) -> StrmCtrlResult<()> {
        if *self.state.read() != SessionState::Ready {
            return Err(StrmCtrlError::Closed);
        }
        Ok(())
    }

    fn write_all(&self, data: &[u8], deadline: Instant) -> StrmCtrlResult<()> {
        let timeout = remaining(deadline)?;
        let written = self.device.write(&self.endpoint_out, data, timeout)?;
        if written < data.len() {
            return Err(StrmCtrlError::ShortWrite {
                written,
                expected: data.len(),
            });
        }
        Ok(())
    }

    /// Caller must hold `outbound`.
    fn send_command(&self, command: &Command, deadline: Instant) -> StrmCtrlResult<()> {
        let packet = self.encoder.encode(command)?;
        debug!(command = %command, len = packet.len(), "Sending command");
        self.write_all(&packet, deadline)
    }

    /// Caller must hold `outbound`.
    fn send_image(&self, image: &PreparedImage, deadline: Instant) -> StrmCtrlResult<()> {
        self.send_command(image.header(), deadline)?;
        debug!(len = image.payload().len(), "Sending image payload");
        self.write_all(image.payload(), deadline)
    }

    fn handshake(&self) -> StrmCtrlResult<()> {
        let _outbound = self.outbound.lock();
        for command in [Command::Disconnect, Command::Connect] {
            let deadline = deadline_after(self.config.command_timeout());
            self.send_command(&command, deadline)?;
        }
        Ok(())
    }

    fn keep_alive(&self) {
        let _outbound = self.outbound.lock();
        let deadline = deadline_after(self.config.command_timeout());
        if let Err(e) = self.send_command(&Command::Connect, deadline) {
            warn!("Keep-alive failed for {}: {}", self.info, e);
        }
    }

    /// Best-effort blanking of every display before release.
    fn blank_displays(&self) {
        let _outbound = self.outbound.lock();
        for command in [Command::ClearAll, Command::Commit] {
            let deadline = deadline_after(self.config.command_timeout());
            if let Err(e) = self.send_command(&command, deadline) {
                warn!("Failed to send {} during close: {}", command.name(), e);
            }
        }
    }

    /// Release interface, configuration, device handle and USB context, in
    /// that order.
    fn release_all(&self) {
        release(
            self.device.as_ref(),
            Acquired {
                configured: true,
                claimed: true,
            },
        );
        if self.bus.lock().take().is_some() {
            debug!("Released USB context");
        }
    }
}

fn keep_alive_loop(shared: Arc<Shared>) {
    debug!("Keep-alive thread started");
    let ticker = channel::tick(shared.config.keep_alive_interval());
    loop {
        crossbeam::select! {
            recv(shared.closed_rx) -> _ => break,
            recv(ticker) -> _ => shared.keep_alive(),
        }
    }
    debug!("Keep-alive thread stopping");
}

/// Shortest slice handed to a single transfer.
const MIN_READ_SLICE: Duration = Duration::from_millis(1);

fn is_closing(closed_rx: &Receiver<()>) -> bool {
    matches!(closed_rx.try_recv(), Err(TryRecvError::Disconnected))
}

/// Read one report within `read_timeout`, split into slices no longer than
/// the command timeout so the closed signal is seen between transfers.
///
/// Returns `None` once the session is closing.
fn read_report(
    shared: &Shared,
    buf: &mut [u8],
    read_timeout: Duration,
) -> Option<TransportResult<usize>> {
    let deadline = deadline_after(read_timeout);
    let slice = shared.config.command_timeout().max(MIN_READ_SLICE);
    loop {
        if is_closing(&shared.closed_rx) {
            return None;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        match shared
            .device
            .read(&shared.endpoint_in, buf, left.clamp(MIN_READ_SLICE, slice))
        {
            Err(TransportError::Timeout) if Instant::now() < deadline => {}
            result => return Some(result),
        }
    }
}

fn poll_loop(shared: Arc<Shared>, events: Sender<Event>, read_timeout: Duration) {
    debug!("Event poller started");
    let interval = shared
        .endpoint_in
        .poll_interval
        .max(shared.config.min_poll_interval());
    let ticker = channel::tick(interval);
    let mut buf = vec![0u8; shared.endpoint_in.max_packet_size];
    loop {
        crossbeam::select! {
            recv(shared.closed_rx) -> _ => break,
            recv(ticker) -> _ => {}
        }

        buf.fill(0);
        let len = match read_report(&shared, &mut buf, read_timeout) {
            None => break,
            Some(Ok(len)) => len,
            Some(Err(TransportError::Timeout)) => continue,
            Some(Err(e)) => {
                debug!("Skipping failed read: {}", e);
                continue;
            }
        };
        if len < REPORT_MIN_LEN {
            warn!("Short input report: {} bytes", len);
        }
        let event = match decode_report(&buf) {
            Ok(event) => event,
            Err(e) => {
                debug!("Dropping report: {}", e);
                continue;
            }
        };

        crossbeam::select! {
            send(events, event) -> sent => {
                if sent.is_err() {
                    debug!("Event receiver dropped");
                    break;
                }
            }
            recv(shared.closed_rx) -> _ => break,
        }
    }
    debug!("Event poller stopping");
}

/// An open Stream Controller SE.
///
/// Dropping the session closes it.
pub struct Session {
    shared: Arc<Shared>,
    events_started: AtomicBool,
    keep_alive: Mutex<Option<JoinHandle<()>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Open the device with serial number `serial`, or the first one found
    /// when `serial` is empty.
    ///
    /// Configuration comes from [`SessionConfig::from_env`].
    pub fn open(serial: &str) -> StrmCtrlResult<Self> {
        let bus = LibusbBus::new().map_err(StrmCtrlError::EnumerationFailed)?;
        Self::open_with(Arc::new(bus), serial, SessionConfig::from_env())
    }

    pub fn open_with(
        bus: Arc<dyn UsbBus>,
        serial: &str,
        config: SessionConfig,
    ) -> StrmCtrlResult<Self> {
        info!("Opening stream controller (serial {:?})", serial);
        let device = select_device(bus.as_ref(), serial)?;
        let device: Arc<dyn UsbDevice> = Arc::from(device);
        let info = device_info(device.as_ref());
        debug!("Selected {}", info);

        if let Err(e) = device
            .set_auto_detach_kernel_driver(true)
            .and_then(|()| device.reset())
        {
            release(device.as_ref(), Acquired::default());
            return Err(StrmCtrlError::ResetFailed(e));
        }

        let (endpoint_in, endpoint_out, encoder) = match setup_endpoints(device.as_ref()) {
            Ok(bound) => bound,
            Err((acquired, e)) => {
                release(device.as_ref(), acquired);
                return Err(StrmCtrlError::EndpointSetupFailed(e));
            }
        };

        let (closed_tx, closed_rx) = channel::bounded(0);
        let shared = Arc::new(Shared {
            device,
            bus: Mutex::new(Some(bus)),
            info,
            config,
            encoder,
            endpoint_in,
            endpoint_out,
            state: RwLock::new(SessionState::Opening),
            outbound: Mutex::new(()),
            closed_tx: Mutex::new(Some(closed_tx)),
            closed_rx,
        });

        if let Err(e) = shared.handshake() {
            shared.blank_displays();
            shared.release_all();
            *shared.state.write() = SessionState::Closed;
            return Err(StrmCtrlError::InitFailed(Box::new(e)));
        }

        let keep_alive_shared = Arc::clone(&shared);
        let keep_alive = thread::Builder::new()
            .name("strmctrl-keep-alive".to_string())
            .spawn(move || keep_alive_loop(keep_alive_shared));
        let keep_alive = match keep_alive {
            Ok(handle) => handle,
            Err(source) => {
                drop(shared.closed_tx.lock().take());
                shared.blank_displays();
                shared.release_all();
                *shared.state.write() = SessionState::Closed;
                return Err(StrmCtrlError::ThreadSpawn {
                    name: "keep-alive",
                    source,
                });
            }
        };

        *shared.state.write() = SessionState::Ready;
        info!("Stream controller ready: {}", shared.info);
        Ok(Self {
            shared,
            events_started: AtomicBool::new(false),
            keep_alive: Mutex::new(Some(keep_alive)),
            poller: Mutex::new(None),
        })
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.shared.info
    }

    /// `Bus BBB Device DDD Serial: S`
    pub fn descriptor(&self) -> String {
        self.shared.info.descriptor()
    }

    /// Start polling the inbound endpoint and return the event stream.
    ///
    /// Each poll waits up to `read_timeout` for a report. The stream ends when
    /// the session closes. Only one stream may be started per session.
    pub fn read_events(&self, read_timeout: Duration) -> StrmCtrlResult<Receiver<Event>> {
        self.shared.ensure_ready()?;
        if self.events_started.swap(true, Ordering::AcqRel) {
            return Err(StrmCtrlError::EventsAlreadyStarted);
        }

        let (events_tx, events_rx) = channel::bounded(self.shared.config.event_channel_capacity);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("strmctrl-events".to_string())
            .spawn(move || poll_loop(shared, events_tx, read_timeout))
            .map_err(|source| StrmCtrlError::ThreadSpawn {
                name: "event poller",
                source,
            })?;
        *self.poller.lock() = Some(handle);
        info!("Event polling started");
        Ok(events_rx)
    }

    /// Set the backlight brightness in percent; values above 100 are clamped.
    pub fn set_brightness(&self, percent: u8, timeout: Duration) -> StrmCtrlResult<()> {
        self.shared.ensure_ready()?;
        let deadline = deadline_after(timeout);
        let _outbound = self.shared.outbound.lock();
        self.shared
            .send_command(&Command::Brightness(percent), deadline)
    }

    /// Blank every display.
    pub fn clear(&self, timeout: Duration) -> StrmCtrlResult<()> {
        self.shared.ensure_ready()?;
        let deadline = deadline_after(timeout);
        let _outbound = self.shared.outbound.lock();
        self.shared.send_command(&Command::ClearAll, deadline)?;
        self.shared.send_command(&Command::Commit, deadline)
    }

    /// Upload a 64×64 image to one display button and commit it.
    pub fn set_image(
        &self,
        display: Control,
        image: &DynamicImage,
        timeout: Duration,
    ) -> StrmCtrlResult<()> {
        self.shared.ensure_ready()?;
        let slot = display
            .display_index()
            .ok_or(StrmCtrlError::NotADisplay(display))?;
        let prepared = PreparedImage::new(slot, image)?;

        let deadline = deadline_after(timeout);
        let _outbound = self.shared.outbound.lock();
        self.shared.send_image(&prepared, deadline)?;
        self.shared.send_command(&Command::Commit, deadline)
    }

    /// Replace all six displays at once; `None` leaves a slot blank.
    ///
    /// Every image is validated and encoded before anything is sent.
    pub fn set_images(
        &self,
        images: [Option<&DynamicImage>; DISPLAY_COUNT],
        timeout: Duration,
    ) -> StrmCtrlResult<()> {
        self.shared.ensure_ready()?;
        let prepared = Control::DISPLAYS
            .iter()
            .zip(images)
            .filter_map(|(display, image)| Some((display.display_index()?, image?)))
            .map(|(slot, image)| PreparedImage::new(slot, image))
            .collect::<StrmCtrlResult<Vec<_>>>()?;

        let deadline = deadline_after(timeout);
        let _outbound = self.shared.outbound.lock();
        self.shared.send_command(&Command::ClearAll, deadline)?;
        for image in &prepared {
            self.shared.send_image(image, deadline)?;
        }
        self.shared.send_command(&Command::Commit, deadline)
    }

    /// Close the session. Safe to call more than once.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.write();
            match *state {
                SessionState::Closing | SessionState::Closed => return,
                SessionState::Opening | SessionState::Ready => *state = SessionState::Closing,
            }
        }
        info!("Closing {}", self.shared.info);

        drop(self.shared.closed_tx.lock().take());
        for (name, slot) in [("Keep-alive", &self.keep_alive), ("Event poller", &self.poller)] {
            let Some(handle) = slot.lock().take() else {
                continue;
            };
            if handle.join().is_err() {
                warn!("{} thread panicked", name);
            }
        }

        self.shared.blank_displays();
        self.shared.release_all();
        *self.shared.state.write() = SessionState::Closed;
        info!("Stream controller closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn select_device(bus: &dyn UsbBus, serial: &str) -> StrmCtrlResult<Box<dyn UsbDevice>> {
    let candidates = bus
        .open_devices(VENDOR_ID, PRODUCT_ID)
        .map_err(StrmCtrlError::EnumerationFailed)?;
    debug!("Found {} candidate device(s)", candidates.len());

    let mut selected = None;
    for candidate in candidates {
        if selected.is_none() && device_info(candidate.as_ref()).matches_serial(serial) {
            selected = Some(candidate);
        } else if let Err(e) = candidate.close() {
            warn!("Failed to close unselected device: {}", e);
        }
    }
    selected.ok_or_else(|| StrmCtrlError::DeviceNotFound {
        serial: serial.to_string(),
    })
}

fn setup_endpoints(
    device: &dyn UsbDevice,
) -> Result<(EndpointInfo, EndpointInfo, CommandEncoder), (Acquired, TransportError)> {
    let mut acquired = Acquired::default();
    device
        .set_configuration(CONFIGURATION)
        .map_err(|e| (acquired, e))?;
    acquired.configured = true;
    device
        .claim_interface(INTERFACE, INTERFACE_ALT_SETTING)
        .map_err(|e| (acquired, e))?;
    acquired.claimed = true;

    let endpoint_in = device
        .endpoint(INTERFACE, INTERFACE_ALT_SETTING, ENDPOINT_IN, Direction::In)
        .map_err(|e| (acquired, e))?;
    if endpoint_in.max_packet_size == 0 {
        return Err((
            acquired,
            TransportError::ZeroPacketSize {
                address: endpoint_in.address,
            },
        ));
    }
    let endpoint_out = device
        .endpoint(
            INTERFACE,
            INTERFACE_ALT_SETTING,
            ENDPOINT_OUT,
            Direction::Out,
        )
        .map_err(|e| (acquired, e))?;
    // A zero packet size is the only thing the encoder rejects.
    let encoder = CommandEncoder::new(endpoint_out.max_packet_size)
        .ok()
        .ok_or((
            acquired,
            TransportError::ZeroPacketSize {
                address: endpoint_out.address,
            },
        ))?;
    debug!(
        "Endpoints bound: in {:#04x} ({} bytes, {:?}), out {:#04x} ({} bytes)",
        endpoint_in.address,
        endpoint_in.max_packet_size,
        endpoint_in.poll_interval,
        endpoint_out.address,
        endpoint_out.max_packet_size
    );
    Ok((endpoint_in, endpoint_out, encoder))
}
