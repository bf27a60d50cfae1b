//! Outbound frame builders

use super::can_id;
use crate::can::RawFrame;

pub const ROTARY_INIT_PAYLOAD: [u8; 8] = [0x1D, 0xE1, 0x00, 0xF0, 0xFF, 0x7F, 0xDE, 0x04];
pub const POLL_PAYLOAD: [u8; 8] = [0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
pub const TOUCH_POLL_PAYLOAD: [u8; 8] = [0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
pub const LIGHT_ON_PAYLOAD: [u8; 2] = [0xFD, 0x00];
pub const LIGHT_OFF_PAYLOAD: [u8; 2] = [0xFE, 0x00];

pub fn rotary_init() -> RawFrame {
    RawFrame::new(can_id::ROTARY_INIT, &ROTARY_INIT_PAYLOAD)
}

pub fn poll() -> RawFrame {
    RawFrame::new(can_id::POLL, &POLL_PAYLOAD)
}

pub fn touchpad_poll() -> RawFrame {
    RawFrame::new(can_id::TOUCH_POLL, &TOUCH_POLL_PAYLOAD)
}

pub fn light(enabled: bool) -> RawFrame {
    if enabled {
        RawFrame::new(can_id::LIGHT, &LIGHT_ON_PAYLOAD)
    } else {
        RawFrame::new(can_id::LIGHT, &LIGHT_OFF_PAYLOAD)
    }
}

/// True for frames the adapter transmitted itself.
///
/// The touchpad poll shares the touch identifier, so it only counts as an
/// echo when the payload matches ours byte for byte.
pub fn is_echo(frame: &RawFrame) -> bool {
    match frame.id {
        can_id::ROTARY_INIT | can_id::LIGHT | can_id::POLL => true,
        can_id::TOUCH_POLL => frame.payload() == TOUCH_POLL_PAYLOAD,
        _ => false,
    }
}
