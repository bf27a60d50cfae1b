//! HID output seam
//!
//! The core only ever produces abstract [`HidAction`]s; turning them into
//! keyboard/consumer/mouse reports is the job of whatever implements
//! [`HidOutput`]. Two implementations ship with the crate:
//!
//! - [`TracingHid`] logs every action (dry runs, replay)
//! - [`RecordingHid`] forwards actions into a channel for inspection

pub mod keycodes;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HidAction {
    KeyDown(u8),
    KeyUp(u8),
    MediaKeyDown(u16),
    MediaKeyUp(u16),
    MouseMove { dx: i8, dy: i8 },
    MouseButtonDown(MouseButton),
    MouseButtonUp(MouseButton),
    MouseScroll(i8),
}

impl Display for HidAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HidAction::KeyDown(code) => write!(f, "key down {:#04X}", code),
            HidAction::KeyUp(code) => write!(f, "key up {:#04X}", code),
            HidAction::MediaKeyDown(code) => write!(f, "media down {:#06X}", code),
            HidAction::MediaKeyUp(code) => write!(f, "media up {:#06X}", code),
            HidAction::MouseMove { dx, dy } => write!(f, "mouse move ({}, {})", dx, dy),
            HidAction::MouseButtonDown(button) => write!(f, "mouse {:?} down", button),
            HidAction::MouseButtonUp(button) => write!(f, "mouse {:?} up", button),
            HidAction::MouseScroll(amount) => write!(f, "scroll {}", amount),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HidError {
    #[error("HID device not connected")]
    NotConnected,
}

/// Receiver of abstract output actions.
///
/// Invoked from a single submitting context; implementations serialize their
/// own report composition.
pub trait HidOutput: Send + 'static {
    fn is_connected(&self) -> bool;

    fn key_down(&mut self, code: u8) -> Result<(), HidError>;
    fn key_up(&mut self, code: u8) -> Result<(), HidError>;
    fn media_key_down(&mut self, code: u16) -> Result<(), HidError>;
    fn media_key_up(&mut self, code: u16) -> Result<(), HidError>;
    fn mouse_move(&mut self, dx: i8, dy: i8) -> Result<(), HidError>;
    fn mouse_button_down(&mut self, button: MouseButton) -> Result<(), HidError>;
    fn mouse_button_up(&mut self, button: MouseButton) -> Result<(), HidError>;
    fn mouse_scroll(&mut self, amount: i8) -> Result<(), HidError>;

    fn apply(&mut self, action: &HidAction) -> Result<(), HidError> {
        match *action {
            HidAction::KeyDown(code) => self.key_down(code),
            HidAction::KeyUp(code) => self.key_up(code),
            HidAction::MediaKeyDown(code) => self.media_key_down(code),
            HidAction::MediaKeyUp(code) => self.media_key_up(code),
            HidAction::MouseMove { dx, dy } => self.mouse_move(dx, dy),
            HidAction::MouseButtonDown(button) => self.mouse_button_down(button),
            HidAction::MouseButtonUp(button) => self.mouse_button_up(button),
            HidAction::MouseScroll(amount) => self.mouse_scroll(amount),
        }
    }
}

/// Logs actions instead of sending reports
#[derive(Debug, Default)]
pub struct TracingHid {
    sent: u64,
}

impl TracingHid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    fn log(&mut self, action: HidAction) -> Result<(), HidError> {
        self.sent += 1;
        match action {
            HidAction::MouseMove { .. } | HidAction::MouseScroll(_) => debug!("HID {}", action),
            _ => info!("HID {}", action),
        }
        Ok(())
    }
}

impl HidOutput for TracingHid {
    fn is_connected(&self) -> bool {
        true
    }

    fn key_down(&mut self, code: u8) -> Result<(), HidError> {
        self.log(HidAction::KeyDown(code))
    }

    fn key_up(&mut self, code: u8) -> Result<(), HidError> {
        self.log(HidAction::KeyUp(code))
    }

    fn media_key_down(&mut self, code: u16) -> Result<(), HidError> {
        self.log(HidAction::MediaKeyDown(code))
    }

    fn media_key_up(&mut self, code: u16) -> Result<(), HidError> {
        self.log(HidAction::MediaKeyUp(code))
    }

    fn mouse_move(&mut self, dx: i8, dy: i8) -> Result<(), HidError> {
        self.log(HidAction::MouseMove { dx, dy })
    }

    fn mouse_button_down(&mut self, button: MouseButton) -> Result<(), HidError> {
        self.log(HidAction::MouseButtonDown(button))
    }

    fn mouse_button_up(&mut self, button: MouseButton) -> Result<(), HidError> {
        self.log(HidAction::MouseButtonUp(button))
    }

    fn mouse_scroll(&mut self, amount: i8) -> Result<(), HidError> {
        self.log(HidAction::MouseScroll(amount))
    }
}

/// Forwards every action into an unbounded channel.
///
/// Reports itself disconnected once the receiving side is gone.
#[derive(Debug, Clone)]
pub struct RecordingHid {
    sender: mpsc::UnboundedSender<HidAction>,
}

impl RecordingHid {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HidAction>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn record(&mut self, action: HidAction) -> Result<(), HidError> {
        self.sender
            .send(action)
            .map_err(|_| HidError::NotConnected)
    }
}

impl HidOutput for RecordingHid {
    fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    fn key_down(&mut self, code: u8) -> Result<(), HidError> {
        self.record(HidAction::KeyDown(code))
    }

    fn key_up(&mut self, code: u8) -> Result<(), HidError> {
        self.record(HidAction::KeyUp(code))
    }

    fn media_key_down(&mut self, code: u16) -> Result<(), HidError> {
        self.record(HidAction::MediaKeyDown(code))
    }

    fn media_key_up(&mut self, code: u16) -> Result<(), HidError> {
        self.record(HidAction::MediaKeyUp(code))
    }

    fn mouse_move(&mut self, dx: i8, dy: i8) -> Result<(), HidError> {
        self.record(HidAction::MouseMove { dx, dy })
    }

    fn mouse_button_down(&mut self, button: MouseButton) -> Result<(), HidError> {
        self.record(HidAction::MouseButtonDown(button))
    }

    fn mouse_button_up(&mut self, button: MouseButton) -> Result<(), HidError> {
        self.record(HidAction::MouseButtonUp(button))
    }

    fn mouse_scroll(&mut self, amount: i8) -> Result<(), HidError> {
        self.record(HidAction::MouseScroll(amount))
    }
}
