//! Touchpad gesture recognizer
//!
//! Turns the raw, noisy coordinate stream of the puck's touch surface into
//! pointer motion, clicks, drags and scrolling.
//!
//! ## Single finger
//!
//! Movement is reported relative to a reference point. Per-sample deltas below
//! the deadzone are ignored and the reference only moves when a motion was
//! actually emitted, so slow drifts accumulate until they clear the deadzone.
//! Whether a touch counts as "moved" for tap purposes is decided on the
//! cumulative displacement from where the finger landed: reaching
//! `tap_max_movement` on either axis rules out a click.
//!
//! ## Tap state machine
//!
//! ```text
//!              short, still lift
//!   ┌──────┐  (click emitted)   ┌─────────────────────┐
//!   │ Idle │───────────────────→│ WaitingForSecondTap │
//!   └──────┘←───────────────────└─────────────────────┘
//!      ↑     window expired,        │ finger down
//!      │     movement, or a         │ inside window
//!      │     second tap             ↓ (left button down)
//!      │                        ┌──────────┐
//!      └────────────────────────│ Dragging │
//!        finger up (left up)    └──────────┘
//! ```
//!
//! The first click is emitted optimistically on lift; a double-tap therefore
//! reads as click + press-and-hold, which hosts interpret as a drag.
//!
//! ## Two fingers
//!
//! The average vertical delta of both fingers scrolls once it reaches the
//! scroll threshold; a short two-finger touch without scrolling is a right
//! click.

use super::{clamp_axis, ActionBuffer, InputEvent, InputHandler, TouchPoint, TouchSample};
use crate::hid::{HidAction, MouseButton};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchpadSettings {
    /// Minimum per-sample travel before the pointer moves
    pub deadzone: u16,
    /// Pointer scaling, applied as `delta * multiplier / 10`
    pub x_multiplier: i32,
    pub y_multiplier: i32,
    pub tap_max_duration_ms: u64,
    /// Displacement beyond which a touch is no longer a tap
    pub tap_max_movement: u16,
    pub double_tap_window_ms: u64,
    /// Average vertical two-finger travel that starts a scroll
    pub scroll_threshold: u16,
    /// Scroll scaling, applied as `delta * multiplier / 10`
    pub scroll_multiplier: i32,
}

impl Default for TouchpadSettings {
    fn default() -> Self {
        Self {
            deadzone: 5,
            x_multiplier: 10,
            y_multiplier: 10,
            tap_max_duration_ms: 200,
            tap_max_movement: 15,
            double_tap_window_ms: 300,
            scroll_threshold: 15,
            scroll_multiplier: 10,
        }
    }
}

impl TouchpadSettings {
    pub fn tap_max_duration(&self) -> Duration {
        Duration::from_millis(self.tap_max_duration_ms)
    }

    pub fn double_tap_window(&self) -> Duration {
        Duration::from_millis(self.double_tap_window_ms)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TapState {
    #[default]
    Idle,
    WaitingForSecondTap,
    Dragging,
}

#[derive(Clone, Copy, Debug)]
struct TouchStart {
    at: Instant,
    origin: TouchPoint,
}

#[derive(Clone, Copy, Debug, Default)]
struct SingleFinger {
    tracking: bool,
    reference: TouchPoint,
}

#[derive(Clone, Copy, Debug, Default)]
struct TwoFingers {
    tracking: bool,
    first: TouchPoint,
    second: TouchPoint,
    tap_candidate: bool,
    started_at: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct GestureRecognizer {
    settings: TouchpadSettings,
    tap_state: TapState,
    single: SingleFinger,
    two: TwoFingers,
    touch_start: Option<TouchStart>,
    moved: bool,
    last_tap_at: Option<Instant>,
}

impl GestureRecognizer {
    pub fn new(settings: TouchpadSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn tap_state(&self) -> TapState {
        self.tap_state
    }

    pub fn settings(&self) -> &TouchpadSettings {
        &self.settings
    }

    pub fn process(&mut self, sample: &TouchSample, now: Instant, out: &mut ActionBuffer) {
        match *sample {
            TouchSample::FingerRemoved => self.finger_removed(now, out),
            TouchSample::Contact {
                finger,
                second_finger: Some(second),
                ..
            } => self.two_finger_sample(finger, second, now, out),
            TouchSample::Contact { finger, .. } => self.single_finger_sample(finger, now, out),
        }
    }

    fn finger_removed(&mut self, now: Instant, out: &mut ActionBuffer) {
        if self.two.tracking {
            self.two_fingers_up(now, out);
        } else if self.single.tracking {
            self.finger_up(now, out);
        }
        self.single.tracking = false;
        self.two.tracking = false;
    }

    fn single_finger_sample(&mut self, point: TouchPoint, now: Instant, out: &mut ActionBuffer) {
        if self.two.tracking {
            debug!("Two fingers -> one finger, restarting tracking");
            self.two.tracking = false;
            self.two.tap_candidate = false;
            self.single.tracking = false;
        }

        if !self.single.tracking {
            self.single = SingleFinger {
                tracking: true,
                reference: point,
            };
            self.finger_down(point, now, out);
            return;
        }

        if let Some(start) = self.touch_start {
            let limit = i32::from(self.settings.tap_max_movement);
            let total_x = i32::from(point.x) - i32::from(start.origin.x);
            let total_y = i32::from(point.y) - i32::from(start.origin.y);
            if !self.moved && (total_x.abs() >= limit || total_y.abs() >= limit) {
                self.moved = true;
                if self.tap_state == TapState::WaitingForSecondTap {
                    debug!("Movement cancelled pending double tap");
                    self.tap_state = TapState::Idle;
                }
            }
        }

        let deadzone = i32::from(self.settings.deadzone);
        let mut dx = i32::from(point.x) - i32::from(self.single.reference.x);
        let mut dy = i32::from(point.y) - i32::from(self.single.reference.y);
        if dx.abs() < deadzone {
            dx = 0;
        }
        if dy.abs() < deadzone {
            dy = 0;
        }
        if dx == 0 && dy == 0 {
            return;
        }

        let move_x = clamp_axis(dx * self.settings.x_multiplier / 10);
        // touch Y grows upwards on the puck, screen Y grows downwards
        let move_y = clamp_axis(-dy * self.settings.y_multiplier / 10);
        if move_x != 0 || move_y != 0 {
            out.push(HidAction::MouseMove {
                dx: move_x,
                dy: move_y,
            });
        }
        self.single.reference = point;
    }

    fn finger_down(&mut self, point: TouchPoint, now: Instant, out: &mut ActionBuffer) {
        self.touch_start = Some(TouchStart { at: now, origin: point });
        self.moved = false;

        if self.tap_state == TapState::WaitingForSecondTap {
            let within_window = self
                .last_tap_at
                .is_some_and(|at| now.duration_since(at) < self.settings.double_tap_window());
            if within_window {
                info!("Tap-tap-hold: drag started");
                self.tap_state = TapState::Dragging;
                out.push(HidAction::MouseButtonDown(MouseButton::Left));
            } else {
                debug!("Double tap window expired");
                self.tap_state = TapState::Idle;
            }
        }
    }

    fn finger_up(&mut self, now: Instant, out: &mut ActionBuffer) {
        if self.tap_state == TapState::Dragging {
            info!("Drag released");
            out.push(HidAction::MouseButtonUp(MouseButton::Left));
            self.tap_state = TapState::Idle;
            return;
        }

        let is_tap = self.touch_start.is_some_and(|start| {
            now.duration_since(start.at) < self.settings.tap_max_duration()
        }) && !self.moved;

        match (is_tap, self.tap_state) {
            (true, TapState::Idle) => {
                info!("Tap: left click");
                out.click(MouseButton::Left);
                self.last_tap_at = Some(now);
                self.tap_state = TapState::WaitingForSecondTap;
            }
            (true, TapState::WaitingForSecondTap) => {
                // second tap arrived too late to drag; it already clicked once
                self.tap_state = TapState::Idle;
            }
            _ => {}
        }
    }

    fn two_finger_sample(
        &mut self,
        first: TouchPoint,
        second: TouchPoint,
        now: Instant,
        out: &mut ActionBuffer,
    ) {
        if !self.two.tracking {
            self.single.tracking = false;
            if self.tap_state == TapState::Dragging {
                info!("Drag released by second finger");
                out.push(HidAction::MouseButtonUp(MouseButton::Left));
                self.tap_state = TapState::Idle;
            }
            self.two = TwoFingers {
                tracking: true,
                first,
                second,
                tap_candidate: true,
                started_at: Some(now),
            };
            debug!("Two finger touch started");
            return;
        }

        let dy_first = i32::from(first.y) - i32::from(self.two.first.y);
        let dy_second = i32::from(second.y) - i32::from(self.two.second.y);
        let average = (dy_first + dy_second) / 2;

        if average.abs() >= i32::from(self.settings.scroll_threshold) {
            self.two.tap_candidate = false;
            let amount = clamp_axis(average * self.settings.scroll_multiplier / 10);
            if amount != 0 {
                debug!("Two finger scroll {}", amount);
                out.push(HidAction::MouseScroll(amount));
            }
            self.two.first.y = first.y;
            self.two.second.y = second.y;
        }
        self.two.first.x = first.x;
        self.two.second.x = second.x;
    }

    fn two_fingers_up(&mut self, now: Instant, out: &mut ActionBuffer) {
        let short = self
            .two
            .started_at
            .is_some_and(|at| now.duration_since(at) < self.settings.tap_max_duration());
        if self.two.tap_candidate && short {
            info!("Two finger tap: right click");
            out.click(MouseButton::Right);
        }
        self.two.tap_candidate = false;
        self.two.started_at = None;
    }
}

pub struct TouchpadHandler {
    recognizer: GestureRecognizer,
}

impl TouchpadHandler {
    pub fn new(settings: TouchpadSettings) -> Self {
        Self {
            recognizer: GestureRecognizer::new(settings),
        }
    }

    pub fn recognizer(&self) -> &GestureRecognizer {
        &self.recognizer
    }
}

impl InputHandler for TouchpadHandler {
    fn name(&self) -> &'static str {
        "touchpad"
    }

    fn handle(&mut self, event: &InputEvent, now: Instant, out: &mut ActionBuffer) -> bool {
        let InputEvent::Touchpad(sample) = event else {
            return false;
        };
        self.recognizer.process(sample, now, out);
        true
    }
}
