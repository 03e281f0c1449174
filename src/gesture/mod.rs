//! Hand gesture recognition
//!
//! Turns per-frame hand landmarks into committed gesture commands.
//!
//! ## Pipeline
//!
//! ```text
//! landmarks ──► classifier ──► debouncer ──► Commit { gesture, command }
//!   (21 pts)     (stateless)    (edge + cooldown)
//! ```
//!
//! The classifier answers "which pose is this frame showing", with no memory
//! of previous frames. The debouncer decides whether that answer is a new
//! gesture worth acting on.

pub mod classifier;
pub mod commands;
pub mod debouncer;
pub mod landmarks;

pub use classifier::{classify, FingerStates, DEFAULT_EXTENSION_MARGIN};
pub use commands::CommandMap;
pub use debouncer::{Commit, GestureDebouncer, DEFAULT_COOLDOWN_MS};
pub use landmarks::{HandLandmarks, Landmark, LANDMARK_COUNT};

use serde::{Deserialize, Serialize};

/// A recognised hand pose
///
/// "No gesture" is modelled as `Option::<Gesture>::None` rather than a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    /// All five digits extended
    OpenPalm,
    /// All four fingers curled
    Fist,
    /// Index and middle extended, ring and pinky curled
    TwoFingers,
    /// Only the thumb extended, pointing up
    ThumbsUp,
}

impl Gesture {
    /// All gestures in display order
    pub const ALL: [Gesture; 4] = [
        Gesture::OpenPalm,
        Gesture::Fist,
        Gesture::TwoFingers,
        Gesture::ThumbsUp,
    ];

    /// Wire name (matches the serde representation)
    pub fn as_str(&self) -> &'static str {
        match self {
            Gesture::OpenPalm => "open_palm",
            Gesture::Fist => "fist",
            Gesture::TwoFingers => "two_fingers",
            Gesture::ThumbsUp => "thumbs_up",
        }
    }

    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            Gesture::OpenPalm => "Open Palm",
            Gesture::Fist => "Fist",
            Gesture::TwoFingers => "Two Fingers",
            Gesture::ThumbsUp => "Thumbs Up",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Gesture::OpenPalm => "✋",
            Gesture::Fist => "✊",
            Gesture::TwoFingers => "✌️",
            Gesture::ThumbsUp => "👍",
        }
    }
}

impl std::fmt::Display for Gesture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
