//! `CRT` command framing.
//!
//! Every outbound command is a single packet of exactly the outbound
//! endpoint's max packet size:
//! - Bytes 0-2: ASCII `CRT`
//! - 2 zero bytes
//! - ASCII command name
//! - 2 zero bytes
//! - argument bytes
//! - zero padding up to the packet size

use std::fmt;

use crate::{ProtocolError, ProtocolResult};

pub const COMMAND_PREFIX: &[u8; 3] = b"CRT";

const SEPARATOR: [u8; 2] = [0x00, 0x00];

/// Arguments of `CLE` that address every display slot.
pub const CLEAR_ALL_ARGS: [u8; 2] = [0x00, 0xFF];

/// Upper bound of the `LIG` brightness argument.
pub const MAX_BRIGHTNESS: u8 = 100;

/// Highest display slot addressed by `BAT`.
const MAX_SLOT: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `DIS`: reset display and connection state before the handshake.
    Disconnect,
    /// `CONNECT`: handshake, repeated as keep-alive heartbeat.
    Connect,
    /// `LIG`: backlight brightness in percent, clamped when encoded.
    Brightness(u8),
    /// `CLE 00 FF`: clear every display slot.
    ClearAll,
    /// `STP`: commit pending display updates.
    Commit,
    /// `BAT`: announce a JPEG payload of `len` bytes for display `slot`.
    ImageHeader { len: u16, slot: u8 },
}

impl Command {
    /// Build a `BAT` header, validating the slot and payload size.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::InvalidSlot`] unless `slot` is in `1..=6`
    /// - [`ProtocolError::PayloadTooLarge`] if `len` does not fit in 16 bits
    pub fn image_header(len: usize, slot: u8) -> ProtocolResult<Self> {
        if !(1..=MAX_SLOT).contains(&slot) {
            return Err(ProtocolError::InvalidSlot(slot));
        }
        let len = u16::try_from(len)
            .ok()
            .ok_or(ProtocolError::PayloadTooLarge {
                len,
                max: usize::from(u16::MAX),
            })?;
        Ok(Self::ImageHeader { len, slot })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnect => "DIS",
            Self::Connect => "CONNECT",
            Self::Brightness(_) => "LIG",
            Self::ClearAll => "CLE",
            Self::Commit => "STP",
            Self::ImageHeader { .. } => "BAT",
        }
    }

    pub fn args(&self) -> Vec<u8> {
        match self {
            Self::Disconnect | Self::Connect | Self::Commit => Vec::new(),
            Self::Brightness(percent) => vec![(*percent).min(MAX_BRIGHTNESS)],
            Self::ClearAll => CLEAR_ALL_ARGS.to_vec(),
            Self::ImageHeader { len, slot } => {
                let [hi, lo] = len.to_be_bytes();
                vec![hi, lo, *slot]
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        for arg in self.args() {
            write!(f, " {arg:02X}")?;
        }
        Ok(())
    }
}

/// Length of a framed command before padding.
pub fn framed_len(name: &str, args: &[u8]) -> usize {
    COMMAND_PREFIX.len() + SEPARATOR.len() + name.len() + SEPARATOR.len() + args.len()
}

/// Encodes commands into packets of a fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEncoder {
    packet_size: usize,
}

impl CommandEncoder {
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidPacketSize`] if `packet_size` is zero.
    pub fn new(packet_size: usize) -> ProtocolResult<Self> {
        if packet_size == 0 {
            return Err(ProtocolError::InvalidPacketSize(packet_size));
        }
        Ok(Self { packet_size })
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    pub fn encode(&self, command: &Command) -> ProtocolResult<Vec<u8>> {
        self.encode_raw(command.name(), &command.args())
    }

    /// Frame an arbitrary command name and argument bytes.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::InvalidCommandName`] for empty or non-ASCII names
    /// - [`ProtocolError::CommandTooLarge`] if the framed command exceeds the packet size
    pub fn encode_raw(&self, name: &str, args: &[u8]) -> ProtocolResult<Vec<u8>> {
        if name.is_empty() || !name.is_ascii() {
            return Err(ProtocolError::InvalidCommandName(name.to_string()));
        }
        let len = framed_len(name, args);
        if len > self.packet_size {
            return Err(ProtocolError::CommandTooLarge {
                len,
                max: self.packet_size,
            });
        }

        let mut packet = Vec::with_capacity(self.packet_size);
        packet.extend_from_slice(COMMAND_PREFIX);
        packet.extend_from_slice(&SEPARATOR);
        packet.extend_from_slice(name.as_bytes());
        packet.extend_from_slice(&SEPARATOR);
        packet.extend_from_slice(args);
        packet.resize(self.packet_size, 0x00);
        Ok(packet)
    }
}
