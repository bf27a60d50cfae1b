//! CAN-to-HID bridge for BMW iDrive controllers
//!
//! The controller ("puck") talks CAN: it needs an init handshake and periodic
//! keepalives, and reports buttons, the joystick, the rotary knob and the
//! touchpad as frames. This crate decodes those frames, keeps the link alive
//! and turns input into keyboard, consumer-key and mouse actions.
//!
//! ```text
//! can ──→ protocol ──→ controller (router, handshake) ──→ input (handler chain) ──→ hid
//!  ↑                                │
//!  └────── keepalives ──────────────┘            bridge: the tokio runtime around it
//! ```

pub mod bridge;
pub mod can;
pub mod config;
pub mod controller;
pub mod hid;
pub mod input;
pub mod protocol;
