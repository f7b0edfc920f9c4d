//! Wire protocol for the Stream Controller SE control panel.
//!
//! The panel exposes six 64×64 pixel display buttons, three plain buttons and
//! three push-knobs over a vendor-specific USB interface. This crate covers the
//! byte-level side of that interface:
//!
//! - [`decode_control`] / [`decode_report`]: raw input reports into logical [`Event`]s
//! - [`CommandEncoder`]: `CRT`-framed command packets padded to the endpoint size
//! - [`Command`]: the known command set (`DIS`, `CONNECT`, `LIG`, `CLE`, `STP`, `BAT`)
//!
//! ## Design
//! This crate does no I/O. It provides only constants, pure
//! functions and value types that can be tested and fuzzed without hardware.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod command;
pub mod ids;
pub mod report;
pub mod table;
pub mod types;

pub use command::{
    CLEAR_ALL_ARGS, COMMAND_PREFIX, Command, CommandEncoder, MAX_BRIGHTNESS, framed_len,
};
pub use ids::{
    CONFIGURATION, ENDPOINT_IN, ENDPOINT_OUT, INTERFACE, INTERFACE_ALT_SETTING, PRODUCT_ID,
    VENDOR_ID, is_stream_controller,
};
pub use report::{CONTROL_OFFSET, REPORT_MIN_LEN, STATE_OFFSET, decode_report};
pub use table::{STATE_PRESSED, decode_control};
pub use types::{Action, Control, Event, IMAGE_SIZE};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown control code {code:#04x} (state {state:#04x})")]
    UnknownControl { code: u8, state: u8 },

    #[error("Invalid report size: expected at least {expected}, got {actual}")]
    InvalidReportSize { expected: usize, actual: usize },

    #[error("Command too large: {len} bytes exceed packet size {max}")]
    CommandTooLarge { len: usize, max: usize },

    #[error("Invalid packet size: {0}")]
    InvalidPacketSize(usize),

    #[error("Invalid command name: {0:?}")]
    InvalidCommandName(String),

    #[error("Invalid display slot: {0} (expected 1..=6)")]
    InvalidSlot(u8),

    #[error("Payload too large: {len} bytes exceed {max}")]
    PayloadTooLarge { len: usize, max: usize },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
