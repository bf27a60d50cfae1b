//! Synchronous per-frame processing: route, gate on readiness, dispatch.

use crate::can::RawFrame;
use crate::config::BridgeConfig;
use crate::controller::{ControllerState, FrameRouter, RouteOutcome};
use crate::input::{ActionBuffer, HandlerChain, HandlerCommand, InputEvent};
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Processed {
    /// Frames to transmit right away
    pub outbound: Vec<RawFrame>,
    pub event: Option<InputEvent>,
    /// The event reached a handler that claimed it
    pub dispatched: bool,
}

pub struct FramePipeline {
    router: FrameRouter,
    chain: HandlerChain,
}

impl FramePipeline {
    pub fn new(router: FrameRouter, chain: HandlerChain) -> Self {
        Self { router, chain }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        let router = FrameRouter::new(
            config.touchpad.layout,
            config.handshake.touchpad_ignore_count,
        );
        let chain = HandlerChain::standard(
            &config.buttons,
            &config.joystick,
            &config.rotary,
            &config.touchpad.gestures,
        );
        Self::new(router, chain)
    }

    /// Must be called with the state lock held; `out` collects HID actions
    /// to submit once the lock is gone.
    pub fn process(
        &mut self,
        frame: &RawFrame,
        state: &mut ControllerState,
        hid_connected: bool,
        now: Instant,
        out: &mut ActionBuffer,
    ) -> Processed {
        let RouteOutcome { event, outbound } = self.router.route(frame, state, now);

        let mut dispatched = false;
        if let Some(event) = event.as_ref() {
            if !state.is_ready() {
                trace!("Controller {}, dropping {} event", state.phase(), event.kind());
            } else if !hid_connected {
                debug!("HID not connected, dropping {} event", event.kind());
            } else {
                dispatched = self.chain.dispatch(event, now, out);
            }
        }

        Processed {
            outbound,
            event,
            dispatched,
        }
    }

    pub fn reconfigure(&mut self, command: &HandlerCommand) {
        self.chain.reconfigure(command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Handshake, HandshakeSettings};
    use crate::hid::keycodes::android;
    use crate::hid::HidAction;
    use crate::protocol::commands;
    use std::time::Duration;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    /// Drive the handshake to Ready through the public surface only
    fn ready_state(pipeline: &mut FramePipeline, start: Instant) -> (ControllerState, Instant) {
        let handshake = Handshake::new(HandshakeSettings::default());
        let mut state = ControllerState::new(true);
        let mut out = ActionBuffer::new();
        handshake.tick(&mut state, start);
        pipeline.process(&RawFrame::new(0x277, &[]), &mut state, true, start, &mut out);

        let mut now = start;
        while !state.is_ready() {
            now += ms(10);
            handshake.tick(&mut state, now);
        }
        (state, now)
    }

    fn menu(state_nibble: u8) -> RawFrame {
        RawFrame::new(0x267, &[0x00, 0x00, 0x00, state_nibble, 0xC0, 0x01])
    }

    #[test]
    fn menu_button_reaches_hid_when_ready() {
        let mut pipeline = FramePipeline::from_config(&BridgeConfig::default());
        let (mut state, now) = ready_state(&mut pipeline, Instant::now());
        let mut out = ActionBuffer::new();

        let processed = pipeline.process(&menu(0x01), &mut state, true, now, &mut out);
        assert!(processed.dispatched);
        assert!(processed.outbound.is_empty());
        assert_eq!(out.actions(), vec![HidAction::MediaKeyDown(android::MENU)]);
    }

    #[test]
    fn events_dropped_before_ready_or_without_hid() {
        let mut pipeline = FramePipeline::from_config(&BridgeConfig::default());
        let mut state = ControllerState::new(true);
        let mut out = ActionBuffer::new();
        let now = Instant::now();

        let early = pipeline.process(&menu(0x01), &mut state, true, now, &mut out);
        assert!(early.event.is_some());
        assert!(!early.dispatched);

        let (mut state, now) = ready_state(&mut pipeline, now);
        let offline = pipeline.process(&menu(0x01), &mut state, false, now, &mut out);
        assert!(!offline.dispatched);
        assert!(out.is_empty());
    }

    #[test]
    fn lost_init_blocks_following_input() {
        let mut pipeline = FramePipeline::from_config(&BridgeConfig::default());
        let (mut state, now) = ready_state(&mut pipeline, Instant::now());
        let mut out = ActionBuffer::new();

        let lost = pipeline.process(
            &RawFrame::new(0x5E7, &[0, 0, 0, 0, 0x06]),
            &mut state,
            true,
            now,
            &mut out,
        );
        assert_eq!(lost.outbound, vec![commands::rotary_init()]);
        assert!(!state.is_ready());

        let after = pipeline.process(&menu(0x01), &mut state, true, now + ms(1), &mut out);
        assert!(!after.dispatched);
        assert!(out.is_empty());
    }

    #[test]
    fn identical_touch_samples_stay_silent() {
        let mut pipeline = FramePipeline::from_config(&BridgeConfig::default());
        let (mut state, mut now) = ready_state(&mut pipeline, Instant::now());
        let mut out = ActionBuffer::new();
        let touch = RawFrame::new(0x0BF, &[0x00, 0x64, 0x80, 0x0C, 0x10, 0, 0, 0]);

        for _ in 0..10 {
            now += ms(15);
            let processed = pipeline.process(&touch, &mut state, true, now, &mut out);
            assert!(processed.dispatched);
        }
        assert!(out.is_empty());
    }

    #[test]
    fn reconfigure_switches_rotary_off() {
        let mut pipeline = FramePipeline::from_config(&BridgeConfig::default());
        let (mut state, now) = ready_state(&mut pipeline, Instant::now());
        let mut out = ActionBuffer::new();

        pipeline.reconfigure(&HandlerCommand::SetRotaryEnabled(false));
        let seed = RawFrame::new(0x264, &[0, 0, 0, 0x10, 0x00]);
        let turn = RawFrame::new(0x264, &[0, 0, 0, 0x12, 0x00]);
        pipeline.process(&seed, &mut state, true, now, &mut out);
        let processed = pipeline.process(&turn, &mut state, true, now, &mut out);
        assert_eq!(processed.event, Some(InputEvent::Rotary { delta: 2 }));
        assert!(processed.dispatched);
        assert!(out.is_empty());
    }
}
