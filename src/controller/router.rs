//! Applies decoded frames to the controller state
//!
//! The router is the only writer of protocol-derived state: init
//! acknowledgements, the rotary position and the touchpad bookkeeping. It
//! returns at most one input event per frame plus any frames that must go out
//! immediately (the rotary init after a lost-init report).

use super::state::ControllerState;
use crate::can::RawFrame;
use crate::input::InputEvent;
use crate::protocol::{commands, decode, DecodedFrame, TouchLayout, STATUS_LOST_INIT};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Seed bytes that sit half a detent off; nudged onto the boundary
const SEED_HIGH_BUMP_UP: u8 = 0x7F;
const SEED_HIGH_BUMP_DOWN: u8 = 0x80;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    pub event: Option<InputEvent>,
    pub outbound: Vec<RawFrame>,
}

impl RouteOutcome {
    fn event(event: InputEvent) -> Self {
        Self {
            event: Some(event),
            outbound: Vec::new(),
        }
    }
}

/// Signed distance between two 16-bit counter readings along the shortest
/// path around the wrap.
pub fn rotary_delta(old: u32, new: u32) -> i32 {
    let mut delta = new as i32 - old as i32;
    if delta > 32_768 {
        delta -= 65_536;
    } else if delta < -32_768 {
        delta += 65_536;
    }
    delta
}

fn seed_position(counter: u16, high_byte: u8) -> u32 {
    let counter = u32::from(counter);
    match high_byte {
        SEED_HIGH_BUMP_UP => (counter + 1) & 0xFFFF,
        SEED_HIGH_BUMP_DOWN => counter.wrapping_sub(1) & 0xFFFF,
        _ => counter,
    }
}

#[derive(Clone, Debug)]
pub struct FrameRouter {
    layout: TouchLayout,
    touchpad_ignore_count: u32,
}

impl FrameRouter {
    pub fn new(layout: TouchLayout, touchpad_ignore_count: u32) -> Self {
        Self {
            layout,
            touchpad_ignore_count,
        }
    }

    pub fn route(&self, frame: &RawFrame, state: &mut ControllerState, now: Instant) -> RouteOutcome {
        let Some(decoded) = decode(frame, self.layout) else {
            trace!("Dropping malformed frame {}", frame);
            return RouteOutcome::default();
        };

        match decoded {
            DecodedFrame::Echo => RouteOutcome::default(),
            DecodedFrame::Unknown { id } => {
                debug!("Unknown CAN id {:#05X}: {}", id, frame);
                RouteOutcome::default()
            }
            DecodedFrame::Input(event) => RouteOutcome::event(event),
            DecodedFrame::RotaryInitAck => {
                if !state.rotary_init_done {
                    info!("Rotary init acknowledged");
                }
                state.rotary_init_done = true;
                RouteOutcome::default()
            }
            DecodedFrame::RotaryCounter { counter, high_byte } => {
                self.rotary(counter, high_byte, state)
            }
            DecodedFrame::Touch(sample) => {
                if !state.touchpad_active {
                    info!("Touchpad active");
                    state.touchpad_active = true;
                }
                if state.rotary_init_done && state.touchpad_ignored < self.touchpad_ignore_count {
                    state.touchpad_ignored += 1;
                    debug!(
                        "Ignoring touch frame {}/{}",
                        state.touchpad_ignored, self.touchpad_ignore_count
                    );
                    return RouteOutcome::default();
                }
                RouteOutcome::event(InputEvent::Touchpad(sample))
            }
            DecodedFrame::Status { code } => {
                if code != STATUS_LOST_INIT {
                    trace!("Status {:#04X}", code);
                    return RouteOutcome::default();
                }
                warn!("Controller lost initialization, restarting handshake");
                state.reset_for_reinit(now);
                RouteOutcome {
                    event: None,
                    outbound: vec![commands::rotary_init()],
                }
            }
        }
    }

    fn rotary(&self, counter: u16, high_byte: u8, state: &mut ControllerState) -> RouteOutcome {
        if !state.rotary_position_set {
            state.rotary_position = seed_position(counter, high_byte);
            state.rotary_position_set = true;
            debug!("Rotary position seeded at {}", state.rotary_position);
            return RouteOutcome::default();
        }

        let new_position = u32::from(counter);
        let delta = rotary_delta(state.rotary_position, new_position);
        if delta == 0 {
            return RouteOutcome::default();
        }
        state.rotary_position = new_position;
        RouteOutcome::event(InputEvent::Rotary { delta })
    }
}
