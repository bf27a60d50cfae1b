//! Semantic input events produced by the protocol decoder

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Key/stick state as reported in the low nibble of byte 3
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputState {
    Released,
    Pressed,
    Held,
}

impl InputState {
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0 => Some(InputState::Released),
            1 => Some(InputState::Pressed),
            2 => Some(InputState::Held),
            _ => None,
        }
    }

    /// Pressed or held
    pub fn is_down(self) -> bool {
        !matches!(self, InputState::Released)
    }
}

/// Physical buttons around the puck
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerButton {
    Menu,
    Back,
    Option,
    Radio,
    Cd,
    Nav,
    Tel,
}

impl ControllerButton {
    pub const ALL: [ControllerButton; 7] = [
        ControllerButton::Menu,
        ControllerButton::Back,
        ControllerButton::Option,
        ControllerButton::Radio,
        ControllerButton::Cd,
        ControllerButton::Nav,
        ControllerButton::Tel,
    ];

    /// Wire id carried in byte 5 of an input frame
    pub fn id(self) -> u8 {
        match self {
            ControllerButton::Menu => 0x01,
            ControllerButton::Back => 0x02,
            ControllerButton::Option => 0x04,
            ControllerButton::Radio => 0x08,
            ControllerButton::Cd => 0x10,
            ControllerButton::Nav => 0x20,
            ControllerButton::Tel => 0x40,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|button| button.id() == id)
    }
}

impl Display for ControllerButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerButton::Menu => "Menu",
            ControllerButton::Back => "Back",
            ControllerButton::Option => "Option",
            ControllerButton::Radio => "Radio",
            ControllerButton::Cd => "CD",
            ControllerButton::Nav => "Nav",
            ControllerButton::Tel => "Tel",
        };
        write!(f, "{}", name)
    }
}

/// Direction bitmask of the joystick; zero is the center push.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct StickDirection(pub u8);

impl StickDirection {
    pub const CENTER: StickDirection = StickDirection(0);
    pub const UP: u8 = 0x01;
    pub const RIGHT: u8 = 0x02;
    pub const DOWN: u8 = 0x04;
    pub const LEFT: u8 = 0x08;

    pub fn is_center(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

/// Finger count reported by the touchpad
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TouchKind {
    Single,
    Multi,
    Triple,
    Quad,
}

/// Touch coordinate, 9 bits per axis (0..=511)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct TouchPoint {
    pub x: u16,
    pub y: u16,
}

impl TouchPoint {
    pub const MAX: u16 = 511;

    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TouchSample {
    FingerRemoved,
    Contact {
        kind: TouchKind,
        finger: TouchPoint,
        /// Only present for [`TouchKind::Multi`]
        second_finger: Option<TouchPoint>,
    },
}

impl TouchSample {
    pub fn single(x: u16, y: u16) -> Self {
        TouchSample::Contact {
            kind: TouchKind::Single,
            finger: TouchPoint::new(x, y),
            second_finger: None,
        }
    }

    pub fn two_fingers(first: TouchPoint, second: TouchPoint) -> Self {
        TouchSample::Contact {
            kind: TouchKind::Multi,
            finger: first,
            second_finger: Some(second),
        }
    }

    pub fn has_two_fingers(&self) -> bool {
        matches!(
            self,
            TouchSample::Contact {
                second_finger: Some(_),
                ..
            }
        )
    }
}

/// Decoded input, one per accepted frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Button { id: u8, state: InputState },
    Joystick {
        direction: StickDirection,
        state: InputState,
    },
    Rotary { delta: i32 },
    Touchpad(TouchSample),
}

impl InputEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InputEvent::Button { .. } => "button",
            InputEvent::Joystick { .. } => "joystick",
            InputEvent::Rotary { .. } => "rotary",
            InputEvent::Touchpad(_) => "touchpad",
        }
    }
}
