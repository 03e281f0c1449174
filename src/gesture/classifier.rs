//! Rule-based gesture classification
//!
//! A geometric finger-extension test, no learned model:
//!
//! - a finger is extended when its tip sits above its MCP joint by more than
//!   the margin (image coordinates, smaller `y` is higher);
//! - the thumb folds sideways rather than down, so it is extended when its
//!   tip is horizontally more than the margin away from its IP joint.
//!
//! Gestures are matched in priority order, first match wins.

use super::landmarks::{
    HandLandmarks, INDEX_MCP, INDEX_TIP, MIDDLE_MCP, MIDDLE_TIP, PINKY_MCP, PINKY_TIP, RING_MCP,
    RING_TIP, THUMB_IP, THUMB_TIP, WRIST,
};
use super::Gesture;

/// Finger flex margin in normalised units
pub const DEFAULT_EXTENSION_MARGIN: f32 = 0.05;

/// Extension state of each digit for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FingerStates {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingerStates {
    /// Measure which digits are extended
    pub fn measure(hand: &HandLandmarks, margin: f32) -> Self {
        let finger = |tip: usize, mcp: usize| hand.point(tip).y < hand.point(mcp).y - margin;

        Self {
            thumb: (hand.point(THUMB_TIP).x - hand.point(THUMB_IP).x).abs() > margin,
            index: finger(INDEX_TIP, INDEX_MCP),
            middle: finger(MIDDLE_TIP, MIDDLE_MCP),
            ring: finger(RING_TIP, RING_MCP),
            pinky: finger(PINKY_TIP, PINKY_MCP),
        }
    }

    fn all_fingers_curled(&self) -> bool {
        !self.index && !self.middle && !self.ring && !self.pinky
    }
}

/// Classify a hand pose
///
/// Returns `None` when no gesture matches. A curled hand with the thumb
/// sticking out is never a fist: it is a thumbs up when the thumb tip is
/// above the wrist, and unrecognised otherwise.
pub fn classify(hand: &HandLandmarks, margin: f32) -> Option<Gesture> {
    let fingers = FingerStates::measure(hand, margin);

    if fingers.thumb && fingers.index && fingers.middle && fingers.ring && fingers.pinky {
        return Some(Gesture::OpenPalm);
    }

    if fingers.all_fingers_curled() && !fingers.thumb {
        return Some(Gesture::Fist);
    }

    // Thumb state is irrelevant here
    if fingers.index && fingers.middle && !fingers.ring && !fingers.pinky {
        return Some(Gesture::TwoFingers);
    }

    let thumb_above_wrist = hand.point(THUMB_TIP).y < hand.point(WRIST).y;
    if fingers.thumb && fingers.all_fingers_curled() && thumb_above_wrist {
        return Some(Gesture::ThumbsUp);
    }

    None
}
