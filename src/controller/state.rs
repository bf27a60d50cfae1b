use std::fmt::{self, Display};
use tokio::time::Instant;

/// Where the puck is in its bring-up, derived from [`ControllerState`] flags
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakePhase {
    Uninitialized,
    RotaryInitPending,
    TouchpadInitPending,
    Cooldown,
    Ready,
}

impl Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakePhase::Uninitialized => "uninitialized",
            HandshakePhase::RotaryInitPending => "rotary init pending",
            HandshakePhase::TouchpadInitPending => "touchpad init pending",
            HandshakePhase::Cooldown => "cooldown",
            HandshakePhase::Ready => "ready",
        };
        write!(f, "{}", name)
    }
}

/// Shared controller state.
///
/// Protocol-derived fields are written by the frame router, timing fields by
/// the handshake scheduler. Both run under the same lock.
#[derive(Clone, Debug, Default)]
pub struct ControllerState {
    pub(super) ready: bool,
    pub(super) rotary_init_done: bool,
    pub(super) touchpad_init_done: bool,
    pub(super) touchpad_active: bool,
    pub(super) light_init_done: bool,
    pub(super) rotary_position_set: bool,
    pub(super) rotary_position: u32,
    pub(super) touchpad_ignored: u32,
    pub(super) light_enabled: bool,
    pub(super) reinit_count: u32,

    pub(super) init_started_at: Option<Instant>,
    pub(super) cooldown_started_at: Option<Instant>,
    pub(super) last_rotary_init_at: Option<Instant>,
    pub(super) last_touchpad_poll_at: Option<Instant>,
    pub(super) last_poll_at: Option<Instant>,
    pub(super) last_light_at: Option<Instant>,
}

impl ControllerState {
    pub fn new(light_enabled: bool) -> Self {
        Self {
            light_enabled,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        if self.ready {
            HandshakePhase::Ready
        } else if self.init_started_at.is_none() {
            HandshakePhase::Uninitialized
        } else if !self.rotary_init_done {
            HandshakePhase::RotaryInitPending
        } else if !self.touchpad_init_done {
            HandshakePhase::TouchpadInitPending
        } else {
            HandshakePhase::Cooldown
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn rotary_init_done(&self) -> bool {
        self.rotary_init_done
    }

    pub fn touchpad_init_done(&self) -> bool {
        self.touchpad_init_done
    }

    pub fn touchpad_active(&self) -> bool {
        self.touchpad_active
    }

    pub fn light_init_done(&self) -> bool {
        self.light_init_done
    }

    pub fn rotary_position(&self) -> Option<u32> {
        self.rotary_position_set.then_some(self.rotary_position)
    }

    pub fn light_enabled(&self) -> bool {
        self.light_enabled
    }

    pub fn set_light_enabled(&mut self, enabled: bool) {
        self.light_enabled = enabled;
    }

    /// How often the puck reported a lost initialization
    pub fn reinit_count(&self) -> u32 {
        self.reinit_count
    }

    /// Forget everything about the previous session, keeping only
    /// configuration-like fields and counters.
    ///
    /// The caller re-sends the rotary init right away, so the init start and
    /// retry timestamps point at `now`.
    pub(super) fn reset_for_reinit(&mut self, now: Instant) {
        *self = Self {
            light_enabled: self.light_enabled,
            reinit_count: self.reinit_count + 1,
            init_started_at: Some(now),
            last_rotary_init_at: Some(now),
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_follows_flags() {
        let mut state = ControllerState::new(true);
        assert_eq!(state.phase(), HandshakePhase::Uninitialized);
        state.init_started_at = Some(Instant::now());
        assert_eq!(state.phase(), HandshakePhase::RotaryInitPending);
        state.rotary_init_done = true;
        assert_eq!(state.phase(), HandshakePhase::TouchpadInitPending);
        state.touchpad_init_done = true;
        assert_eq!(state.phase(), HandshakePhase::Cooldown);
        state.ready = true;
        assert_eq!(state.phase(), HandshakePhase::Ready);
    }

    #[test]
    fn reset_keeps_light_and_counts() {
        let now = Instant::now();
        let mut state = ControllerState::new(false);
        state.init_started_at = Some(now);
        state.ready = true;
        state.rotary_init_done = true;
        state.touchpad_init_done = true;
        state.touchpad_active = true;
        state.rotary_position_set = true;
        state.rotary_position = 1234;
        state.touchpad_ignored = 3;
        state.last_poll_at = Some(now);

        state.reset_for_reinit(now);
        assert!(!state.is_ready());
        assert!(!state.rotary_init_done());
        assert!(!state.touchpad_init_done());
        assert!(!state.touchpad_active());
        assert_eq!(state.rotary_position(), None);
        assert_eq!(state.touchpad_ignored, 0);
        assert_eq!(state.last_poll_at, None);
        assert!(!state.light_enabled());
        assert_eq!(state.reinit_count(), 1);
        assert_eq!(state.phase(), HandshakePhase::RotaryInitPending);
    }
}
