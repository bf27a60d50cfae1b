//! Input handler chain
//!
//! Decoded [`InputEvent`]s are offered to an ordered list of handlers; the
//! first one that claims an event stops the chain. Handlers are synchronous
//! and never wait: anything time-related (the rotary step pacing) travels as
//! data on the emitted [`Emission`]s and is honoured by the frame worker once
//! the controller state lock has been released.
//!
//! ```text
//! InputEvent ─→ button ─→ joystick ─→ rotary ─→ touchpad
//!                  │          │          │          │
//!                  └──────────┴────┬─────┴──────────┘
//!                                  ↓
//!                     ActionBuffer [HidAction + pause]
//! ```

pub mod button;
pub mod event;
pub mod joystick;
pub mod rotary;
pub mod touchpad;

pub use event::{
    ControllerButton, InputEvent, InputState, StickDirection, TouchKind, TouchPoint, TouchSample,
};

use crate::hid::{HidAction, MouseButton};
use button::{ButtonHandler, ButtonSettings};
use joystick::{JoystickHandler, JoystickMode, JoystickSettings};
use rotary::{RotaryHandler, RotarySettings};
use std::time::Duration;
use tokio::time::Instant;
use touchpad::{TouchpadHandler, TouchpadSettings};
use tracing::debug;

/// One output action plus the pause to keep before the next one
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Emission {
    pub action: HidAction,
    pub pause_after: Duration,
}

/// Collects the actions produced while handling one event
#[derive(Debug, Default)]
pub struct ActionBuffer {
    emissions: Vec<Emission>,
}

impl ActionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: HidAction) {
        self.push_paced(action, Duration::ZERO);
    }

    pub fn push_paced(&mut self, action: HidAction, pause_after: Duration) {
        self.emissions.push(Emission {
            action,
            pause_after,
        });
    }

    /// Button down immediately followed by button up
    pub fn click(&mut self, button: MouseButton) {
        self.push(HidAction::MouseButtonDown(button));
        self.push(HidAction::MouseButtonUp(button));
    }

    pub fn is_empty(&self) -> bool {
        self.emissions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.emissions.len()
    }

    pub fn emissions(&self) -> &[Emission] {
        &self.emissions
    }

    pub fn actions(&self) -> Vec<HidAction> {
        self.emissions.iter().map(|e| e.action).collect()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, Emission> {
        self.emissions.drain(..)
    }

    pub fn clear(&mut self) {
        self.emissions.clear();
    }
}

/// Runtime reconfiguration understood by the handlers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerCommand {
    SetJoystickMode(JoystickMode),
    SetRotaryEnabled(bool),
}

pub trait InputHandler: Send + 'static {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Returns `true` when the event was claimed; the chain stops there.
    fn handle(&mut self, event: &InputEvent, now: Instant, out: &mut ActionBuffer) -> bool;

    /// Apply a runtime command; handlers ignore what they do not own.
    fn reconfigure(&mut self, _command: &HandlerCommand) {}
}

/// Ordered set of handlers
pub struct HandlerChain {
    handlers: Vec<Box<dyn InputHandler>>,
}

impl HandlerChain {
    pub fn new(handlers: Vec<Box<dyn InputHandler>>) -> Self {
        Self { handlers }
    }

    /// The standard chain: button, joystick, rotary, touchpad
    pub fn standard(
        buttons: &ButtonSettings,
        joystick: &JoystickSettings,
        rotary: &RotarySettings,
        touchpad: &TouchpadSettings,
    ) -> Self {
        Self::new(vec![
            Box::new(ButtonHandler::new(buttons)),
            Box::new(JoystickHandler::new(joystick.clone())),
            Box::new(RotaryHandler::new(rotary.clone())),
            Box::new(TouchpadHandler::new(touchpad.clone())),
        ])
    }

    pub fn dispatch(&mut self, event: &InputEvent, now: Instant, out: &mut ActionBuffer) -> bool {
        for handler in self.handlers.iter_mut() {
            if handler.handle(event, now, out) {
                debug!("{} event handled by {}", event.kind(), handler.name());
                return true;
            }
        }
        debug!("No handler claimed {:?}", event);
        false
    }

    pub fn reconfigure(&mut self, command: &HandlerCommand) {
        for handler in self.handlers.iter_mut() {
            handler.reconfigure(command);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Clamp a scaled delta into a HID relative axis
pub(crate) fn clamp_axis(value: i32) -> i8 {
    value.clamp(-127, 127) as i8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::keycodes::{android, key};

    fn standard_chain() -> HandlerChain {
        HandlerChain::standard(
            &ButtonSettings::default(),
            &JoystickSettings::default(),
            &RotarySettings::default(),
            &TouchpadSettings::default(),
        )
    }

    struct Greedy;

    impl InputHandler for Greedy {
        fn name(&self) -> &'static str {
            "greedy"
        }

        fn handle(&mut self, _event: &InputEvent, _now: Instant, out: &mut ActionBuffer) -> bool {
            out.push(HidAction::KeyDown(key::A));
            true
        }
    }

    #[test]
    fn first_claiming_handler_stops_the_chain() {
        let mut chain = HandlerChain::new(vec![Box::new(Greedy), Box::new(Greedy)]);
        let mut out = ActionBuffer::new();
        assert!(chain.dispatch(&InputEvent::Rotary { delta: 1 }, Instant::now(), &mut out));
        assert_eq!(out.actions(), vec![HidAction::KeyDown(key::A)]);
    }

    #[test]
    fn menu_press_reaches_button_handler() {
        let mut chain = standard_chain();
        assert_eq!(chain.len(), 4);
        let mut out = ActionBuffer::new();
        let event = InputEvent::Button {
            id: ControllerButton::Menu.id(),
            state: InputState::Pressed,
        };
        assert!(chain.dispatch(&event, Instant::now(), &mut out));
        assert_eq!(out.actions(), vec![HidAction::MediaKeyDown(android::MENU)]);
    }

    #[test]
    fn unmapped_button_is_not_claimed() {
        let mut chain = standard_chain();
        let mut out = ActionBuffer::new();
        let event = InputEvent::Button {
            id: 0x80,
            state: InputState::Pressed,
        };
        assert!(!chain.dispatch(&event, Instant::now(), &mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn reconfigure_reaches_joystick() {
        let mut chain = standard_chain();
        chain.reconfigure(&HandlerCommand::SetJoystickMode(JoystickMode::ArrowKeys));
        let mut out = ActionBuffer::new();
        let event = InputEvent::Joystick {
            direction: StickDirection(StickDirection::UP),
            state: InputState::Pressed,
        };
        assert!(chain.dispatch(&event, Instant::now(), &mut out));
        assert_eq!(out.actions(), vec![HidAction::KeyDown(key::UP_ARROW)]);
    }

    #[test]
    fn clamp_axis_limits() {
        assert_eq!(clamp_axis(300), 127);
        assert_eq!(clamp_axis(-300), -127);
        assert_eq!(clamp_axis(-5), -5);
    }
}
