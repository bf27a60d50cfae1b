//! Handshake / keepalive timing
//!
//! Called from the keepalive scheduler at a fixed tick. Each call looks at the
//! clock and the shared state and returns the frames that are due; sending
//! them is left to the caller so no transport call happens under the lock.
//!
//! ```text
//! start ─ rotary init + light ─→ RotaryInitPending ──(0x277 ack)──┐
//!            ↑ retry every init_retry                             ↓
//!                                                    touchpad poll, TouchpadInitPending
//!                                                                 ↓
//!               Ready ←── cooldown elapsed ─── Cooldown ←─────────┘
//!
//! always: poll every poll_interval, light every light_keepalive
//! ```

use super::state::ControllerState;
use crate::can::RawFrame;
use crate::protocol::commands;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// `[handshake]` section, all periods in milliseconds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeSettings {
    pub poll_interval_ms: u64,
    pub light_keepalive_ms: u64,
    pub light_init_ms: u64,
    pub cooldown_ms: u64,
    pub init_retry_ms: u64,
    pub touchpad_retry_ms: u64,
    /// Touch frames dropped right after the rotary init was acknowledged
    pub touchpad_ignore_count: u32,
    /// Bound on how long the frame worker waits for bus traffic
    pub rx_timeout_ms: u64,
    pub tick_ms: u64,
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            light_keepalive_ms: 10_000,
            light_init_ms: 1_000,
            cooldown_ms: 750,
            init_retry_ms: 5_000,
            touchpad_retry_ms: 50,
            touchpad_ignore_count: 0,
            rx_timeout_ms: 100,
            tick_ms: 10,
        }
    }
}

impl HandshakeSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn light_keepalive(&self) -> Duration {
        Duration::from_millis(self.light_keepalive_ms)
    }

    pub fn light_init(&self) -> Duration {
        Duration::from_millis(self.light_init_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn init_retry(&self) -> Duration {
        Duration::from_millis(self.init_retry_ms)
    }

    pub fn touchpad_retry(&self) -> Duration {
        Duration::from_millis(self.touchpad_retry_ms)
    }

    pub fn rx_timeout(&self) -> Duration {
        Duration::from_millis(self.rx_timeout_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

fn elapsed(since: Option<Instant>, now: Instant) -> Option<Duration> {
    since.map(|at| now.saturating_duration_since(at))
}

fn due(since: Option<Instant>, now: Instant, period: Duration) -> bool {
    elapsed(since, now).map_or(true, |e| e >= period)
}

#[derive(Clone, Debug)]
pub struct Handshake {
    settings: HandshakeSettings,
}

impl Handshake {
    pub fn new(settings: HandshakeSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &HandshakeSettings {
        &self.settings
    }

    /// First contact: rotary init plus the current light command
    pub fn start(&self, state: &mut ControllerState, now: Instant) -> Vec<RawFrame> {
        info!("Starting controller handshake");
        state.init_started_at = Some(now);
        state.last_rotary_init_at = Some(now);
        state.last_light_at = Some(now);
        vec![commands::rotary_init(), commands::light(state.light_enabled)]
    }

    /// Advance the timers; returns the frames due at `now`
    pub fn tick(&self, state: &mut ControllerState, now: Instant) -> Vec<RawFrame> {
        if state.init_started_at.is_none() {
            return self.start(state, now);
        }

        let mut frames = Vec::new();

        if state.rotary_init_done && !state.touchpad_init_done {
            info!("Rotary init acknowledged, sending touchpad init");
            frames.push(commands::touchpad_poll());
            state.last_touchpad_poll_at = Some(now);
            state.touchpad_init_done = true;
        } else if state.touchpad_init_done
            && !state.touchpad_active
            && due(state.last_touchpad_poll_at, now, self.settings.touchpad_retry())
        {
            debug!("No touchpad frame yet, re-sending touchpad poll");
            frames.push(commands::touchpad_poll());
            state.last_touchpad_poll_at = Some(now);
        }

        self.update_readiness(state, now);

        if !state.light_init_done
            && elapsed(state.init_started_at, now).is_some_and(|e| e >= self.settings.light_init())
        {
            debug!("Light init complete");
            state.light_init_done = true;
        }

        if due(state.last_poll_at, now, self.settings.poll_interval()) {
            frames.push(commands::poll());
            if state.touchpad_active {
                frames.push(commands::touchpad_poll());
                state.last_touchpad_poll_at = Some(now);
            }
            state.last_poll_at = Some(now);
        }

        if due(state.last_light_at, now, self.settings.light_keepalive()) {
            frames.push(commands::light(state.light_enabled));
            state.last_light_at = Some(now);
        }

        if !state.rotary_init_done
            && due(state.last_rotary_init_at, now, self.settings.init_retry())
        {
            warn!("No rotary init acknowledge, retrying");
            frames.push(commands::rotary_init());
            state.last_rotary_init_at = Some(now);
        }

        frames
    }

    fn update_readiness(&self, state: &mut ControllerState, now: Instant) {
        if !(state.rotary_init_done && state.touchpad_init_done) {
            state.cooldown_started_at = None;
            if state.ready {
                warn!("Init flags cleared, controller no longer ready");
                state.ready = false;
            }
            return;
        }
        if state.ready {
            return;
        }

        let since = *state.cooldown_started_at.get_or_insert(now);
        if now.saturating_duration_since(since) >= self.settings.cooldown() {
            info!("Controller ready");
            state.ready = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::state::HandshakePhase;
    use crate::protocol::can_id;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn ids(frames: &[RawFrame]) -> Vec<u32> {
        frames.iter().map(|f| f.id).collect()
    }

    /// Tick every 10 ms from `from` to `to` (inclusive), collecting frames
    fn run(
        handshake: &Handshake,
        state: &mut ControllerState,
        start: Instant,
        from: u64,
        to: u64,
    ) -> Vec<RawFrame> {
        let mut frames = Vec::new();
        let mut t = from;
        while t <= to {
            frames.extend(handshake.tick(state, start + ms(t)));
            t += 10;
        }
        frames
    }

    #[test]
    fn first_tick_sends_init_and_light() {
        let handshake = Handshake::new(HandshakeSettings::default());
        let mut state = ControllerState::new(true);
        let frames = handshake.tick(&mut state, Instant::now());
        assert_eq!(frames, vec![commands::rotary_init(), commands::light(true)]);
        assert_eq!(state.phase(), HandshakePhase::RotaryInitPending);
    }

    #[test]
    fn rotary_init_retried_until_ack() {
        let handshake = Handshake::new(HandshakeSettings::default());
        let mut state = ControllerState::new(true);
        let start = Instant::now();
        let frames = run(&handshake, &mut state, start, 0, 10_000);
        let inits = frames
            .iter()
            .filter(|f| f.id == can_id::ROTARY_INIT)
            .count();
        // t=0, 5000, 10000
        assert_eq!(inits, 3);
        assert!(!state.is_ready());
        assert!(state.light_init_done());
    }

    #[test]
    fn full_bring_up_to_ready() {
        let handshake = Handshake::new(HandshakeSettings::default());
        let mut state = ControllerState::new(true);
        let start = Instant::now();
        handshake.tick(&mut state, start);

        state.rotary_init_done = true;
        let frames = handshake.tick(&mut state, start + ms(20));
        assert_eq!(ids(&frames)[0], can_id::TOUCH_POLL);
        assert_eq!(state.phase(), HandshakePhase::Cooldown);

        // cooldown began at 20 ms
        run(&handshake, &mut state, start, 30, 760);
        assert!(!state.is_ready());
        handshake.tick(&mut state, start + ms(770));
        assert!(state.is_ready());
        assert_eq!(state.phase(), HandshakePhase::Ready);
    }

    #[test]
    fn touchpad_poll_retried_until_active() {
        let handshake = Handshake::new(HandshakeSettings::default());
        let mut state = ControllerState::new(true);
        let start = Instant::now();
        handshake.tick(&mut state, start);
        state.rotary_init_done = true;

        let frames = run(&handshake, &mut state, start, 10, 200);
        let polls = frames.iter().filter(|f| f.id == can_id::TOUCH_POLL).count();
        // initial at 10, retries at 60, 110, 160
        assert_eq!(polls, 4);

        state.touchpad_active = true;
        let frames = run(&handshake, &mut state, start, 210, 500);
        assert!(frames.iter().all(|f| f.id != can_id::TOUCH_POLL));

        // rides along the regular poll (last sent at 10 ms) from now on
        let frames = handshake.tick(&mut state, start + ms(510));
        assert_eq!(ids(&frames), vec![can_id::POLL, can_id::TOUCH_POLL]);
    }

    #[test]
    fn keepalives_follow_their_periods() {
        let handshake = Handshake::new(HandshakeSettings::default());
        let mut state = ControllerState::new(false);
        let start = Instant::now();
        state.rotary_init_done = true;
        let frames = run(&handshake, &mut state, start, 0, 20_000);

        let polls = frames.iter().filter(|f| f.id == can_id::POLL).count();
        let lights: Vec<&RawFrame> = frames.iter().filter(|f| f.id == can_id::LIGHT).collect();
        // first tick only starts the handshake, polls run from t=10
        assert_eq!(polls, 40);
        assert_eq!(lights.len(), 3);
        assert!(lights.iter().all(|f| f.payload() == [0xFE, 0x00]));
    }

    #[test]
    fn cooldown_requires_continuity() {
        let handshake = Handshake::new(HandshakeSettings::default());
        let mut state = ControllerState::new(true);
        let start = Instant::now();
        handshake.tick(&mut state, start);
        state.rotary_init_done = true;
        run(&handshake, &mut state, start, 10, 500);

        // lost-init style interruption mid-cooldown
        state.rotary_init_done = false;
        state.touchpad_init_done = false;
        handshake.tick(&mut state, start + ms(510));
        state.rotary_init_done = true;
        run(&handshake, &mut state, start, 520, 1_000);
        assert!(!state.is_ready());
        run(&handshake, &mut state, start, 1_010, 1_300);
        assert!(state.is_ready());
    }
}
