//! Raw hardware control codes and their logical meaning.
//!
//! Every input report carries a one-byte control code and a one-byte state.
//! Press-type controls (displays, buttons, knob pushes) use the state byte;
//! knob rotations encode the direction in the code's parity and ignore it.

use crate::types::{Action, Control, Event};
use crate::{ProtocolError, ProtocolResult};

/// State byte reported while a control is held down.
pub const STATE_PRESSED: u8 = 0x01;

const PRESS_CODES: [(u8, Control); 12] = [
    (0x01, Control::DisplayTopLeft),
    (0x02, Control::DisplayTopCenter),
    (0x03, Control::DisplayTopRight),
    (0x04, Control::DisplayBottomLeft),
    (0x05, Control::DisplayBottomCenter),
    (0x06, Control::DisplayBottomRight),
    (0x25, Control::ButtonLeft),
    (0x30, Control::ButtonCenter),
    (0x31, Control::ButtonRight),
    (0x35, Control::KnobTop),
    (0x33, Control::KnobBottomLeft),
    (0x34, Control::KnobBottomRight),
];

// Counter-clockwise code of each pair; clockwise is the next (odd) code.
const ROTATION_CODES: [(u8, Control); 3] = [
    (0x50, Control::KnobTop),
    (0x60, Control::KnobBottomRight),
    (0x90, Control::KnobBottomLeft),
];

/// Decode a raw control code and state into a logical event.
///
/// # Errors
///
/// Returns [`ProtocolError::UnknownControl`] for codes outside the table.
pub fn decode_control(code: u8, state: u8) -> ProtocolResult<Event> {
    if let Some(control) = lookup(&PRESS_CODES, code) {
        let action = if state == STATE_PRESSED {
            Action::Pressed
        } else {
            Action::Released
        };
        return Ok(Event::new(control, action));
    }

    if let Some(control) = lookup(&ROTATION_CODES, code & !1) {
        let action = if code & 1 == 1 {
            Action::TurnedClockwise
        } else {
            Action::TurnedCounterClockwise
        };
        return Ok(Event::new(control, action));
    }

    Err(ProtocolError::UnknownControl { code, state })
}

/// Raw code reported when `control` is pressed or released.
pub fn press_code(control: Control) -> u8 {
    PRESS_CODES
        .iter()
        .find(|(_, c)| *c == control)
        .map_or(0, |(code, _)| *code)
}

/// Raw code reported when `control` is turned in the direction of `action`.
///
/// `None` for controls that are not knobs and for non-rotation actions.
pub fn rotation_code(control: Control, action: Action) -> Option<u8> {
    let base = ROTATION_CODES
        .iter()
        .find(|(_, c)| *c == control)
        .map(|(code, _)| *code)?;
    match action {
        Action::TurnedClockwise => Some(base | 1),
        Action::TurnedCounterClockwise => Some(base),
        Action::Pressed | Action::Released => None,
    }
}

fn lookup(table: &[(u8, Control)], code: u8) -> Option<Control> {
    table
        .iter()
        .find(|(raw, _)| *raw == code)
        .map(|(_, control)| *control)
}
