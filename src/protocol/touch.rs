//! Touch coordinate layouts
//!
//! Newer pucks pack two fingers with 9-bit coordinates; older ones report a
//! single finger as signed bytes with the type in byte 1.

use super::touch_type;
use crate::input::{TouchKind, TouchPoint, TouchSample};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TouchLayout {
    /// Two fingers, 9-bit coordinates, type in byte 4
    #[default]
    #[serde(rename = "multi_touch_9bit")]
    MultiTouch9Bit,
    /// One finger, signed 8-bit coordinates, type in byte 1
    #[serde(rename = "legacy_8bit")]
    Legacy8Bit,
}

/// Decode eight touch bytes. `None` for unknown type bytes.
pub fn decode_touch(data: &[u8; 8], layout: TouchLayout) -> Option<TouchSample> {
    match layout {
        TouchLayout::MultiTouch9Bit => decode_multi_touch(data),
        TouchLayout::Legacy8Bit => decode_legacy(data),
    }
}

fn decode_multi_touch(data: &[u8; 8]) -> Option<TouchSample> {
    let kind = match data[4] {
        touch_type::FINGER_REMOVED => return Some(TouchSample::FingerRemoved),
        touch_type::SINGLE => TouchKind::Single,
        touch_type::MULTI => TouchKind::Multi,
        touch_type::TRIPLE => TouchKind::Triple,
        touch_type::QUAD => TouchKind::Quad,
        _ => return None,
    };

    let finger = unpack_point(data[1], data[2], data[3]);
    let second_finger = match kind {
        TouchKind::Multi => Some(unpack_point(data[5], data[6], data[7])),
        _ => None,
    };

    Some(TouchSample::Contact {
        kind,
        finger,
        second_finger,
    })
}

fn decode_legacy(data: &[u8; 8]) -> Option<TouchSample> {
    match data[1] {
        touch_type::FINGER_REMOVED => Some(TouchSample::FingerRemoved),
        touch_type::SINGLE => Some(TouchSample::single(recenter(data[4]), recenter(data[5]))),
        _ => None,
    }
}

/// Signed byte around zero to 0..=255
fn recenter(raw: u8) -> u16 {
    (i16::from(raw as i8) + 128) as u16
}

/// `x = lo + 256 * (mid & 1)`, `y = (hi << 4) | (mid >> 4)`
pub fn unpack_point(lo: u8, mid: u8, hi: u8) -> TouchPoint {
    let x = u16::from(lo) + 256 * u16::from(mid & 0x01);
    let y = (u16::from(hi) << 4) | u16::from(mid >> 4);
    TouchPoint { x, y: y & TouchPoint::MAX }
}

/// Inverse of [`unpack_point`] for coordinates in 0..=511
pub fn pack_point(point: TouchPoint) -> [u8; 3] {
    let lo = (point.x & 0xFF) as u8;
    let mid = ((point.x >> 8) & 0x01) as u8 | (((point.y & 0x0F) as u8) << 4);
    let hi = ((point.y >> 4) & 0x1F) as u8;
    [lo, mid, hi]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn multi_touch_frame(kind: u8, first: TouchPoint, second: TouchPoint) -> [u8; 8] {
        let [a, b, c] = pack_point(first);
        let [d, e, f] = pack_point(second);
        [0x00, a, b, c, kind, d, e, f]
    }

    #[test]
    fn decodes_single_finger() {
        // x = 0x23 + 256, y = (0x05 << 4) | 0x4
        let data = [0x00, 0x23, 0x41, 0x05, touch_type::SINGLE, 0, 0, 0];
        let sample = decode_touch(&data, TouchLayout::MultiTouch9Bit).unwrap();
        assert_eq!(sample, TouchSample::single(0x123, 0x54));
        assert!(!sample.has_two_fingers());
    }

    #[test]
    fn decodes_second_finger_only_for_multi() {
        let first = TouchPoint::new(100, 200);
        let second = TouchPoint::new(300, 400);

        let multi = multi_touch_frame(touch_type::MULTI, first, second);
        assert_eq!(
            decode_touch(&multi, TouchLayout::MultiTouch9Bit),
            Some(TouchSample::two_fingers(first, second))
        );

        let triple = multi_touch_frame(touch_type::TRIPLE, first, second);
        assert_eq!(
            decode_touch(&triple, TouchLayout::MultiTouch9Bit),
            Some(TouchSample::Contact {
                kind: TouchKind::Triple,
                finger: first,
                second_finger: None,
            })
        );
    }

    #[test]
    fn finger_removed_and_unknown_types() {
        let removed = [0, 0, 0, 0, touch_type::FINGER_REMOVED, 0, 0, 0];
        assert_eq!(
            decode_touch(&removed, TouchLayout::MultiTouch9Bit),
            Some(TouchSample::FingerRemoved)
        );
        let unknown = [0, 0, 0, 0, 0x42, 0, 0, 0];
        assert_eq!(decode_touch(&unknown, TouchLayout::MultiTouch9Bit), None);
    }

    #[test]
    fn legacy_layout_recenters_signed_bytes() {
        let data = [0x00, touch_type::SINGLE, 0, 0, 0x80, 0x7F, 0, 0];
        assert_eq!(
            decode_touch(&data, TouchLayout::Legacy8Bit),
            Some(TouchSample::single(0, 255))
        );
        let centre = [0x00, touch_type::SINGLE, 0, 0, 0x00, 0x00, 0, 0];
        assert_eq!(
            decode_touch(&centre, TouchLayout::Legacy8Bit),
            Some(TouchSample::single(128, 128))
        );
        let removed = [0x00, touch_type::FINGER_REMOVED, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            decode_touch(&removed, TouchLayout::Legacy8Bit),
            Some(TouchSample::FingerRemoved)
        );
    }

    proptest! {
        #[test]
        fn packing_preserves_nine_bit_coordinates(x in 0u16..=511, y in 0u16..=511) {
            let point = TouchPoint::new(x, y);
            let [lo, mid, hi] = pack_point(point);
            prop_assert_eq!(unpack_point(lo, mid, hi), point);
        }

        #[test]
        fn unpacked_coordinates_stay_in_range(lo: u8, mid: u8, hi: u8) {
            let point = unpack_point(lo, mid, hi);
            prop_assert!(point.x <= TouchPoint::MAX);
            prop_assert!(point.y <= TouchPoint::MAX);
        }
    }
}
