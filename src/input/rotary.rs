//! Rotary knob handler
//!
//! One discrete action per detent, each followed by a short pause so the
//! host sees separate steps instead of a burst. A single frame never yields
//! more than `max_steps_per_frame` steps.

use super::{ActionBuffer, HandlerCommand, InputEvent, InputHandler};
use crate::hid::keycodes::media;
use crate::hid::HidAction;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotaryMode {
    /// Mouse wheel, clockwise scrolls down
    #[default]
    Scroll,
    /// Volume up/down media keys
    Volume,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotarySettings {
    pub mode: RotaryMode,
    pub enabled: bool,
    pub step_delay_ms: u64,
    pub max_steps_per_frame: u16,
}

impl Default for RotarySettings {
    fn default() -> Self {
        Self {
            mode: RotaryMode::Scroll,
            enabled: true,
            step_delay_ms: 20,
            max_steps_per_frame: 16,
        }
    }
}

impl RotarySettings {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

pub struct RotaryHandler {
    settings: RotarySettings,
}

impl RotaryHandler {
    pub fn new(settings: RotarySettings) -> Self {
        Self { settings }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }
}

impl InputHandler for RotaryHandler {
    fn name(&self) -> &'static str {
        "rotary"
    }

    fn handle(&mut self, event: &InputEvent, _now: Instant, out: &mut ActionBuffer) -> bool {
        let InputEvent::Rotary { delta } = *event else {
            return false;
        };
        if !self.settings.enabled || delta == 0 {
            return true;
        }

        debug!("Rotary delta {}", delta);
        let mut steps = delta.unsigned_abs();
        let limit = u32::from(self.settings.max_steps_per_frame);
        if steps > limit {
            warn!("Rotary delta {} clamped to {} steps", delta, limit);
            steps = limit;
        }
        let pause = self.settings.step_delay();
        let clockwise = delta > 0;
        for _ in 0..steps {
            match self.settings.mode {
                RotaryMode::Scroll => {
                    let amount = if clockwise { -1 } else { 1 };
                    out.push_paced(HidAction::MouseScroll(amount), pause);
                }
                RotaryMode::Volume => {
                    let code = if clockwise {
                        media::VOLUME_UP
                    } else {
                        media::VOLUME_DOWN
                    };
                    out.push(HidAction::MediaKeyDown(code));
                    out.push_paced(HidAction::MediaKeyUp(code), pause);
                }
            }
        }
        true
    }

    fn reconfigure(&mut self, command: &HandlerCommand) {
        if let HandlerCommand::SetRotaryEnabled(enabled) = *command {
            info!("Rotary {}", if enabled { "enabled" } else { "disabled" });
            self.settings.enabled = enabled;
        }
    }
}
