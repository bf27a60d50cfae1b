//! HID usage codes used by the default bindings

/// Keyboard page (0x07)
pub mod key {
    pub const A: u8 = 0x04;
    pub const B: u8 = 0x05;
    pub const C: u8 = 0x06;
    pub const M: u8 = 0x10;
    pub const N: u8 = 0x11;
    pub const O: u8 = 0x12;
    pub const R: u8 = 0x15;
    pub const T: u8 = 0x17;
    pub const ENTER: u8 = 0x28;
    pub const ESCAPE: u8 = 0x29;
    pub const RIGHT_ARROW: u8 = 0x4F;
    pub const LEFT_ARROW: u8 = 0x50;
    pub const DOWN_ARROW: u8 = 0x51;
    pub const UP_ARROW: u8 = 0x52;
}

/// Consumer page (0x0C), media transport
pub mod media {
    pub const NEXT_TRACK: u16 = 0x00B5;
    pub const PREVIOUS_TRACK: u16 = 0x00B6;
    pub const PLAY_PAUSE: u16 = 0x00CD;
    pub const VOLUME_UP: u16 = 0x00E9;
    pub const VOLUME_DOWN: u16 = 0x00EA;
}

/// Consumer page application-control codes understood by Android head units
pub mod android {
    pub const MENU: u16 = 0x0040;
    pub const SEARCH: u16 = 0x0221;
    pub const HOME: u16 = 0x0223;
    pub const BACK: u16 = 0x0224;
}
