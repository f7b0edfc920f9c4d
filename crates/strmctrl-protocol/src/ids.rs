//! USB identity and interface layout of the Stream Controller SE.
//!
//! The device identity is fixed; there is no protocol negotiation. All
//! traffic goes through configuration 1, interface 0 (alt setting 0), with
//! input reports on endpoint 2 and commands on endpoint 3.

/// USB Vendor ID.
pub const VENDOR_ID: u16 = 0x1500;

/// USB Product ID.
pub const PRODUCT_ID: u16 = 0x3001;

/// Configuration value selected during session setup.
pub const CONFIGURATION: u8 = 1;

/// Interface carrying both endpoints.
pub const INTERFACE: u8 = 0;

/// Alternate setting of [`INTERFACE`].
pub const INTERFACE_ALT_SETTING: u8 = 0;

/// Inbound (device → host) endpoint number for input reports.
pub const ENDPOINT_IN: u8 = 2;

/// Outbound (host → device) endpoint number for commands and image payloads.
pub const ENDPOINT_OUT: u8 = 3;

/// Returns `true` if the VID/PID pair identifies a Stream Controller SE.
pub fn is_stream_controller(vid: u16, pid: u16) -> bool {
    vid == VENDOR_ID && pid == PRODUCT_ID
}
