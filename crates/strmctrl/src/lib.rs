//! Driver for the Stream Controller SE USB control panel.
//!
//! A [`Session`] owns one open panel. Opening resets the device, claims its
//! vendor interface, performs the `DIS`/`CONNECT` handshake and starts a
//! keep-alive heartbeat. From there the caller can:
//!
//! - stream input [`Event`]s with [`Session::read_events`]
//! - upload 64×64 images to the six display buttons
//! - adjust brightness or blank the displays
//!
//! The USB layer sits behind the [`UsbBus`]/[`UsbDevice`] traits. The default
//! backend uses libusb through `rusb`; [`mock`] provides an in-memory panel for
//! tests.
//!
//! ```no_run
//! use std::time::Duration;
//! use strmctrl::{Action, Control, Session};
//!
//! # fn main() -> Result<(), strmctrl::StrmCtrlError> {
//! let session = Session::open("")?;
//! session.set_brightness(60, Duration::from_secs(1))?;
//! for event in session.read_events(Duration::from_millis(100))? {
//!     if event.is(Control::ButtonLeft, Action::Pressed) {
//!         break;
//!     }
//! }
//! session.close();
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod device_info;
pub mod error;
pub mod libusb;
pub mod session;
pub mod transport;
pub mod upload;

pub use config::SessionConfig;
pub use device_info::DeviceInfo;
pub use error::{StrmCtrlError, StrmCtrlResult, TransportError, TransportResult};
pub use libusb::{LibusbBus, LibusbDevice};
pub use session::{DISPLAY_COUNT, Session, SessionState, list_devices, list_devices_with};
pub use transport::{Direction, EndpointInfo, TransferKind, UsbBus, UsbDevice, mock};
pub use upload::PreparedImage;

pub use image;
pub use strmctrl_protocol::{Action, Control, Event, IMAGE_SIZE};
