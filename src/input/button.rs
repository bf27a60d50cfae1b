//! Button handler: one key target per physical button

use super::{ActionBuffer, ControllerButton, InputEvent, InputHandler, InputState};
use crate::hid::keycodes::{android, key, media};
use crate::hid::HidAction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::time::Instant;
use tracing::info;

/// What a button press turns into
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyTarget {
    /// Consumer page usage
    Media(u16),
    /// Keyboard page usage
    Keyboard(u8),
}

impl KeyTarget {
    fn down(self) -> HidAction {
        match self {
            KeyTarget::Media(code) => HidAction::MediaKeyDown(code),
            KeyTarget::Keyboard(code) => HidAction::KeyDown(code),
        }
    }

    fn up(self) -> HidAction {
        match self {
            KeyTarget::Media(code) => HidAction::MediaKeyUp(code),
            KeyTarget::Keyboard(code) => HidAction::KeyUp(code),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonBinding {
    pub button: ControllerButton,
    pub target: KeyTarget,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonPreset {
    /// Application-control keys for Android head units
    #[default]
    Android,
    /// Plain letter keys for desktop use
    Desktop,
}

impl ButtonPreset {
    pub fn bindings(self) -> Vec<ButtonBinding> {
        let targets = match self {
            ButtonPreset::Android => [
                KeyTarget::Media(android::MENU),
                KeyTarget::Media(android::BACK),
                KeyTarget::Media(media::PLAY_PAUSE),
                KeyTarget::Media(media::PREVIOUS_TRACK),
                KeyTarget::Media(media::NEXT_TRACK),
                KeyTarget::Media(android::HOME),
                KeyTarget::Media(android::SEARCH),
            ],
            ButtonPreset::Desktop => [
                KeyTarget::Keyboard(key::M),
                KeyTarget::Keyboard(key::B),
                KeyTarget::Keyboard(key::O),
                KeyTarget::Keyboard(key::R),
                KeyTarget::Keyboard(key::C),
                KeyTarget::Keyboard(key::N),
                KeyTarget::Keyboard(key::T),
            ],
        };
        ControllerButton::ALL
            .into_iter()
            .zip(targets)
            .map(|(button, target)| ButtonBinding { button, target })
            .collect()
    }
}

/// `[buttons]` section: a preset, optionally overridden per button
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonSettings {
    pub preset: ButtonPreset,
    pub bindings: Vec<ButtonBinding>,
}

impl ButtonSettings {
    /// Preset bindings with explicit bindings applied on top
    pub fn resolved(&self) -> HashMap<u8, KeyTarget> {
        let mut map: HashMap<u8, KeyTarget> = self
            .preset
            .bindings()
            .into_iter()
            .map(|b| (b.button.id(), b.target))
            .collect();
        for binding in &self.bindings {
            map.insert(binding.button.id(), binding.target);
        }
        map
    }
}

pub struct ButtonHandler {
    bindings: HashMap<u8, KeyTarget>,
}

impl ButtonHandler {
    pub fn new(settings: &ButtonSettings) -> Self {
        Self {
            bindings: settings.resolved(),
        }
    }
}

impl InputHandler for ButtonHandler {
    fn name(&self) -> &'static str {
        "button"
    }

    fn handle(&mut self, event: &InputEvent, _now: Instant, out: &mut ActionBuffer) -> bool {
        let InputEvent::Button { id, state } = *event else {
            return false;
        };
        let Some(target) = self.bindings.get(&id).copied() else {
            return false;
        };

        match state {
            InputState::Pressed => {
                match ControllerButton::from_id(id) {
                    Some(button) => info!("{} button pressed", button),
                    None => info!("Button {:#04X} pressed", id),
                }
                out.push(target.down());
            }
            InputState::Released => out.push(target.up()),
            InputState::Held => {}
        }
        true
    }
}
