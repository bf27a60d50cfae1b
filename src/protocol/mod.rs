//! iDrive ZBE wire protocol
//!
//! Identifiers, type tags and fixed payloads of the controller puck, plus the
//! pure decoding and frame-building functions built on them. Nothing in here
//! touches [`ControllerState`](crate::controller::ControllerState); applying a
//! decoded frame to the state is the router's job.
//!
//! ```text
//! 0x267 input    [.. .. .. state|dir  tag  button ..]
//! 0x264 rotary   [.. .. .. counter_lo counter_hi ..]
//! 0x0BF touch    [.. x_lo xhi|ylo y_hi type x2.. ..]
//! 0x5E7 status   [.. .. .. .. code ..]
//! 0x277 rotary init acknowledge
//! ```

pub mod commands;
pub mod decoder;
pub mod touch;

pub use decoder::{decode, DecodedFrame};
pub use touch::TouchLayout;

/// CAN identifiers, inbound and outbound
pub mod can_id {
    pub const INPUT: u32 = 0x267;
    pub const ROTARY: u32 = 0x264;
    pub const ROTARY_INIT_ACK: u32 = 0x277;
    pub const STATUS: u32 = 0x5E7;
    pub const TOUCH: u32 = 0x0BF;

    pub const ROTARY_INIT: u32 = 0x273;
    pub const LIGHT: u32 = 0x202;
    pub const POLL: u32 = 0x501;
    /// The touchpad poll shares the touch identifier
    pub const TOUCH_POLL: u32 = TOUCH;
}

/// Type tag in byte 4 of an input frame
pub mod input_tag {
    pub const BUTTON: u8 = 0xC0;
    pub const STICK: u8 = 0xDD;
    pub const CENTER: u8 = 0xDE;
}

/// Type byte of a touch frame
pub mod touch_type {
    pub const FINGER_REMOVED: u8 = 0x11;
    pub const SINGLE: u8 = 0x10;
    pub const MULTI: u8 = 0x00;
    pub const TRIPLE: u8 = 0x1F;
    pub const QUAD: u8 = 0x0F;
}

/// Status code reported when the puck dropped its initialization
pub const STATUS_LOST_INIT: u8 = 0x06;

pub const INPUT_MIN_LEN: usize = 6;
pub const ROTARY_MIN_LEN: usize = 5;
pub const TOUCH_MIN_LEN: usize = 8;
pub const STATUS_MIN_LEN: usize = 5;
