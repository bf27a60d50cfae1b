//! Frame classification
//!
//! Turns a [`RawFrame`] into a [`DecodedFrame`] without looking at any
//! controller state. Short or malformed frames decode to `None` and are
//! dropped by the caller without further notice.

use super::touch::{decode_touch, TouchLayout};
use super::{can_id, commands, input_tag};
use super::{INPUT_MIN_LEN, ROTARY_MIN_LEN, STATUS_MIN_LEN, TOUCH_MIN_LEN};
use crate::can::RawFrame;
use crate::input::{InputEvent, InputState, StickDirection, TouchSample};

/// Result of classifying one inbound frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodedFrame {
    /// Button, stick or center push
    Input(InputEvent),
    /// Raw rotary counter; the delta needs the previous position
    RotaryCounter { counter: u16, high_byte: u8 },
    RotaryInitAck,
    Touch(TouchSample),
    Status { code: u8 },
    /// One of our own outbound frames seen on the bus
    Echo,
    Unknown { id: u32 },
}

pub fn decode(frame: &RawFrame, layout: TouchLayout) -> Option<DecodedFrame> {
    // the puck only speaks 11-bit identifiers
    if frame.extended {
        return Some(DecodedFrame::Unknown { id: frame.id });
    }
    // on 0xBF this also swallows a two-finger contact at (0, 0), (0, 0) with
    // a 0x10 first byte: it is byte for byte our touchpad poll
    if commands::is_echo(frame) {
        return Some(DecodedFrame::Echo);
    }

    let data = frame.payload();
    match frame.id {
        can_id::INPUT => decode_input(data).map(DecodedFrame::Input),
        can_id::ROTARY => {
            if data.len() < ROTARY_MIN_LEN {
                return None;
            }
            Some(DecodedFrame::RotaryCounter {
                counter: u16::from_le_bytes([data[3], data[4]]),
                high_byte: data[4],
            })
        }
        can_id::ROTARY_INIT_ACK => Some(DecodedFrame::RotaryInitAck),
        can_id::TOUCH => {
            if data.len() < TOUCH_MIN_LEN {
                return None;
            }
            decode_touch(&frame.data, layout).map(DecodedFrame::Touch)
        }
        can_id::STATUS => {
            if data.len() < STATUS_MIN_LEN {
                return None;
            }
            Some(DecodedFrame::Status { code: data[4] })
        }
        id => Some(DecodedFrame::Unknown { id }),
    }
}

fn decode_input(data: &[u8]) -> Option<InputEvent> {
    if data.len() < INPUT_MIN_LEN {
        return None;
    }
    let state = InputState::from_nibble(data[3] & 0x0F)?;

    match data[4] {
        input_tag::BUTTON => Some(InputEvent::Button { id: data[5], state }),
        input_tag::STICK => Some(InputEvent::Joystick {
            direction: StickDirection(data[3] >> 4),
            state,
        }),
        input_tag::CENTER => Some(InputEvent::Joystick {
            direction: StickDirection::CENTER,
            state,
        }),
        _ => None,
    }
}
