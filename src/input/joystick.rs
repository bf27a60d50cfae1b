//! Joystick handler
//!
//! Two modes, switchable at runtime:
//! - `mouse`: every pressed/held direction report nudges the pointer by
//!   `step` per axis, the center push is the left mouse button
//! - `arrow_keys`: directions become arrow keys, the center push is Enter

use super::{
    clamp_axis, ActionBuffer, HandlerCommand, InputEvent, InputHandler, InputState, StickDirection,
};
use crate::hid::keycodes::key;
use crate::hid::{HidAction, MouseButton};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoystickMode {
    #[default]
    Mouse,
    ArrowKeys,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoystickSettings {
    pub mode: JoystickMode,
    /// Pointer travel per report in mouse mode
    pub step: u8,
}

impl Default for JoystickSettings {
    fn default() -> Self {
        Self {
            mode: JoystickMode::Mouse,
            step: 30,
        }
    }
}

const ARROWS: [(u8, u8); 4] = [
    (StickDirection::UP, key::UP_ARROW),
    (StickDirection::RIGHT, key::RIGHT_ARROW),
    (StickDirection::DOWN, key::DOWN_ARROW),
    (StickDirection::LEFT, key::LEFT_ARROW),
];

pub struct JoystickHandler {
    settings: JoystickSettings,
    /// Arrow keys currently held down, released together
    held_keys: Vec<u8>,
}

impl JoystickHandler {
    pub fn new(settings: JoystickSettings) -> Self {
        Self {
            settings,
            held_keys: Vec::new(),
        }
    }

    pub fn mode(&self) -> JoystickMode {
        self.settings.mode
    }

    fn handle_mouse(&mut self, direction: StickDirection, state: InputState, out: &mut ActionBuffer) {
        if direction.is_center() {
            match state {
                InputState::Pressed => out.push(HidAction::MouseButtonDown(MouseButton::Left)),
                InputState::Released => out.push(HidAction::MouseButtonUp(MouseButton::Left)),
                InputState::Held => {}
            }
            return;
        }
        if !state.is_down() {
            return;
        }

        let step = i32::from(self.settings.step);
        let mut dx = 0;
        let mut dy = 0;
        if direction.contains(StickDirection::UP) {
            dy -= step;
        }
        if direction.contains(StickDirection::DOWN) {
            dy += step;
        }
        if direction.contains(StickDirection::LEFT) {
            dx -= step;
        }
        if direction.contains(StickDirection::RIGHT) {
            dx += step;
        }
        if dx != 0 || dy != 0 {
            debug!("Joystick move ({}, {})", dx, dy);
            out.push(HidAction::MouseMove {
                dx: clamp_axis(dx),
                dy: clamp_axis(dy),
            });
        }
    }

    fn handle_arrows(&mut self, direction: StickDirection, state: InputState, out: &mut ActionBuffer) {
        match state {
            InputState::Pressed => {
                let keys: Vec<u8> = if direction.is_center() {
                    vec![key::ENTER]
                } else {
                    ARROWS
                        .iter()
                        .filter(|(bit, _)| direction.contains(*bit))
                        .map(|(_, code)| *code)
                        .collect()
                };
                for code in keys {
                    if !self.held_keys.contains(&code) {
                        out.push(HidAction::KeyDown(code));
                        self.held_keys.push(code);
                    }
                }
            }
            InputState::Released => self.release_keys(out),
            InputState::Held => {}
        }
    }

    fn release_keys(&mut self, out: &mut ActionBuffer) {
        for code in self.held_keys.drain(..) {
            out.push(HidAction::KeyUp(code));
        }
    }
}

impl InputHandler for JoystickHandler {
    fn name(&self) -> &'static str {
        "joystick"
    }

    fn handle(&mut self, event: &InputEvent, _now: Instant, out: &mut ActionBuffer) -> bool {
        let InputEvent::Joystick { direction, state } = *event else {
            return false;
        };
        if self.settings.mode == JoystickMode::Mouse && state == InputState::Released {
            // arrow keys still down from before a mode switch
            self.release_keys(out);
        }
        match self.settings.mode {
            JoystickMode::Mouse => self.handle_mouse(direction, state, out),
            JoystickMode::ArrowKeys => self.handle_arrows(direction, state, out),
        }
        true
    }

    fn reconfigure(&mut self, command: &HandlerCommand) {
        if let HandlerCommand::SetJoystickMode(mode) = *command {
            if mode != self.settings.mode {
                info!("Joystick mode {:?} -> {:?}", self.settings.mode, mode);
                self.settings.mode = mode;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stick(bits: u8, state: InputState) -> InputEvent {
        InputEvent::Joystick {
            direction: StickDirection(bits),
            state,
        }
    }

    #[test]
    fn mouse_mode_moves_by_step() {
        let mut handler = JoystickHandler::new(JoystickSettings::default());
        let mut out = ActionBuffer::new();
        let now = Instant::now();

        handler.handle(&stick(StickDirection::UP, InputState::Pressed), now, &mut out);
        handler.handle(
            &stick(StickDirection::DOWN | StickDirection::LEFT, InputState::Held),
            now,
            &mut out,
        );
        handler.handle(&stick(StickDirection::UP, InputState::Released), now, &mut out);
        assert_eq!(
            out.actions(),
            vec![
                HidAction::MouseMove { dx: 0, dy: -30 },
                HidAction::MouseMove { dx: -30, dy: 30 },
            ]
        );
    }

    #[test]
    fn mouse_mode_center_is_left_button() {
        let mut handler = JoystickHandler::new(JoystickSettings::default());
        let mut out = ActionBuffer::new();
        let now = Instant::now();
        handler.handle(&stick(0, InputState::Pressed), now, &mut out);
        handler.handle(&stick(0, InputState::Held), now, &mut out);
        handler.handle(&stick(0, InputState::Released), now, &mut out);
        assert_eq!(
            out.actions(),
            vec![
                HidAction::MouseButtonDown(MouseButton::Left),
                HidAction::MouseButtonUp(MouseButton::Left),
            ]
        );
    }

    #[test]
    fn arrow_mode_presses_and_releases_keys() {
        let mut handler = JoystickHandler::new(JoystickSettings {
            mode: JoystickMode::ArrowKeys,
            step: 30,
        });
        let mut out = ActionBuffer::new();
        let now = Instant::now();
        handler.handle(&stick(StickDirection::RIGHT, InputState::Pressed), now, &mut out);
        handler.handle(&stick(StickDirection::RIGHT, InputState::Held), now, &mut out);
        handler.handle(&stick(0x00, InputState::Released), now, &mut out);
        handler.handle(&stick(0, InputState::Pressed), now, &mut out);
        handler.handle(&stick(0, InputState::Released), now, &mut out);
        assert_eq!(
            out.actions(),
            vec![
                HidAction::KeyDown(key::RIGHT_ARROW),
                HidAction::KeyUp(key::RIGHT_ARROW),
                HidAction::KeyDown(key::ENTER),
                HidAction::KeyUp(key::ENTER),
            ]
        );
    }

    #[test]
    fn mode_switch_at_runtime() {
        let mut handler = JoystickHandler::new(JoystickSettings::default());
        handler.reconfigure(&HandlerCommand::SetJoystickMode(JoystickMode::ArrowKeys));
        assert_eq!(handler.mode(), JoystickMode::ArrowKeys);
        handler.reconfigure(&HandlerCommand::SetRotaryEnabled(false));
        assert_eq!(handler.mode(), JoystickMode::ArrowKeys);
    }

    #[test]
    fn keys_held_across_mode_switch_are_released() {
        let mut handler = JoystickHandler::new(JoystickSettings {
            mode: JoystickMode::ArrowKeys,
            step: 30,
        });
        let mut out = ActionBuffer::new();
        let now = Instant::now();
        handler.handle(&stick(StickDirection::UP, InputState::Pressed), now, &mut out);
        handler.reconfigure(&HandlerCommand::SetJoystickMode(JoystickMode::Mouse));
        handler.handle(&stick(StickDirection::UP, InputState::Released), now, &mut out);
        assert_eq!(
            out.actions(),
            vec![
                HidAction::KeyDown(key::UP_ARROW),
                HidAction::KeyUp(key::UP_ARROW),
            ]
        );
    }
}
