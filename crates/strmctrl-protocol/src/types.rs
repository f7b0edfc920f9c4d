//! Logical controls, actions and events.

use serde::{Deserialize, Serialize};

/// Width and height of a display button image, in pixels.
pub const IMAGE_SIZE: u32 = 64;

/// One of the twelve physical elements of the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Control {
    DisplayTopLeft,
    DisplayTopCenter,
    DisplayTopRight,
    DisplayBottomLeft,
    DisplayBottomCenter,
    DisplayBottomRight,
    ButtonLeft,
    ButtonCenter,
    ButtonRight,
    KnobTop,
    KnobBottomLeft,
    KnobBottomRight,
}

impl Control {
    pub const ALL: [Control; 12] = [
        Control::DisplayTopLeft,
        Control::DisplayTopCenter,
        Control::DisplayTopRight,
        Control::DisplayBottomLeft,
        Control::DisplayBottomCenter,
        Control::DisplayBottomRight,
        Control::ButtonLeft,
        Control::ButtonCenter,
        Control::ButtonRight,
        Control::KnobTop,
        Control::KnobBottomLeft,
        Control::KnobBottomRight,
    ];

    /// Display buttons in slot order (slot 1 first).
    pub const DISPLAYS: [Control; 6] = [
        Control::DisplayTopLeft,
        Control::DisplayTopCenter,
        Control::DisplayTopRight,
        Control::DisplayBottomLeft,
        Control::DisplayBottomCenter,
        Control::DisplayBottomRight,
    ];

    pub fn is_display(self) -> bool {
        matches!(
            self,
            Control::DisplayTopLeft
                | Control::DisplayTopCenter
                | Control::DisplayTopRight
                | Control::DisplayBottomLeft
                | Control::DisplayBottomCenter
                | Control::DisplayBottomRight
        )
    }

    pub fn is_button(self) -> bool {
        matches!(
            self,
            Control::ButtonLeft | Control::ButtonCenter | Control::ButtonRight
        )
    }

    pub fn is_knob(self) -> bool {
        matches!(
            self,
            Control::KnobTop | Control::KnobBottomLeft | Control::KnobBottomRight
        )
    }

    /// 1-based display slot used by the image upload command, `None` for
    /// buttons and knobs.
    pub fn display_index(self) -> Option<u8> {
        match self {
            Control::DisplayTopLeft => Some(1),
            Control::DisplayTopCenter => Some(2),
            Control::DisplayTopRight => Some(3),
            Control::DisplayBottomLeft => Some(4),
            Control::DisplayBottomCenter => Some(5),
            Control::DisplayBottomRight => Some(6),
            _ => None,
        }
    }

    /// Inverse of [`Control::display_index`].
    pub fn from_display_index(index: u8) -> Option<Self> {
        let slot = usize::from(index).checked_sub(1)?;
        Self::DISPLAYS.get(slot).copied()
    }
}

/// What happened to a control.
///
/// Press and release apply to displays, buttons and knob pushes; rotation
/// applies only to knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Pressed,
    Released,
    TurnedClockwise,
    TurnedCounterClockwise,
}

impl Action {
    pub fn is_press(self) -> bool {
        matches!(self, Action::Pressed | Action::Released)
    }

    pub fn is_rotation(self) -> bool {
        matches!(
            self,
            Action::TurnedClockwise | Action::TurnedCounterClockwise
        )
    }
}

/// A decoded input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub control: Control,
    pub action: Action,
}

impl Event {
    pub fn new(control: Control, action: Action) -> Self {
        Self { control, action }
    }

    /// `true` if this event is exactly `action` on `control`.
    pub fn is(&self, control: Control, action: Action) -> bool {
        self.control == control && self.action == action
    }

    /// `true` if `control` was turned in either direction.
    pub fn is_rotation_of(&self, control: Control) -> bool {
        self.control == control && self.action.is_rotation()
    }
}
