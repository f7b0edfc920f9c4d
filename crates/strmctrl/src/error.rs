//! Error types for the USB seam and session operations.

use strmctrl_protocol::{Control, ProtocolError};
use thiserror::Error;

/// Failures reported by a [`UsbBus`](crate::UsbBus) or [`UsbDevice`](crate::UsbDevice).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transfer timed out")]
    Timeout,

    #[error("Device disconnected")]
    Disconnected,

    #[error("Device handle is closed")]
    NotOpen,

    #[error("Endpoint {number} ({direction:?}) not found on interface {interface}")]
    EndpointNotFound {
        interface: u8,
        number: u8,
        direction: crate::Direction,
    },

    #[error("Endpoint {address:#04x} reports a zero max packet size")]
    ZeroPacketSize { address: u8 },

    #[error("USB error: {0}")]
    Usb(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum StrmCtrlError {
    #[error("Device not found (serial {serial:?})")]
    DeviceNotFound { serial: String },

    #[error("Device enumeration failed: {0}")]
    EnumerationFailed(#[source] TransportError),

    #[error("Device reset failed: {0}")]
    ResetFailed(#[source] TransportError),

    #[error("Endpoint setup failed: {0}")]
    EndpointSetupFailed(#[source] TransportError),

    #[error("Device initialisation failed: {0}")]
    InitFailed(#[source] Box<StrmCtrlError>),

    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("Transfer failed: {0}")]
    TransferFailed(#[from] TransportError),

    #[error("Operation timed out")]
    Timeout,

    #[error("Invalid image size {width}x{height} (expected 64x64)")]
    InvalidImageSize { width: u32, height: u32 },

    #[error("Encoded image too large: {len} bytes (max 65535)")]
    ImageTooLarge { len: usize },

    #[error("Image encoding failed: {0}")]
    ImageEncoding(#[from] image::ImageError),

    #[error("{0:?} is not a display button")]
    NotADisplay(Control),

    #[error("Event polling already started")]
    EventsAlreadyStarted,

    #[error("Session is closed")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub type StrmCtrlResult<T> = Result<T, StrmCtrlError>;
