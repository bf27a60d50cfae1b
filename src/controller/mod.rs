//! Controller protocol state
//!
//! - [`state`]: the shared [`ControllerState`] and its derived phase
//! - [`handshake`]: timer-driven init, retry and keepalive frames
//! - [`router`]: applies decoded frames to the state

pub mod handshake;
pub mod router;
pub mod state;

pub use handshake::{Handshake, HandshakeSettings};
pub use router::{rotary_delta, FrameRouter, RouteOutcome};
pub use state::{ControllerState, HandshakePhase};
