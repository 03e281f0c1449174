//! Capture lifecycle state machine
//!
//! Defines the states and transitions for camera capture. Side effects
//! (spawning the detector, stopping it) are driven by the `CaptureManager`.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Capture lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// Camera off, nothing acquired
    #[default]
    Idle,
    /// Detector spawned, waiting for the camera to confirm
    Initializing,
    /// Frames are flowing into the classifier
    Running,
}

impl CaptureState {
    /// Returns a human-readable description of the state
    pub fn description(&self) -> &'static str {
        match self {
            CaptureState::Idle => "Gesture control off",
            CaptureState::Initializing => "Starting camera",
            CaptureState::Running => "Watching for gestures",
        }
    }

    /// Whether gesture control counts as enabled in this state
    pub fn is_enabled(&self) -> bool {
        !matches!(self, CaptureState::Idle)
    }

    /// Whether the camera is delivering frames in this state
    pub fn is_camera_active(&self) -> bool {
        matches!(self, CaptureState::Running)
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// User asked for gesture control
    Enable,
    /// Camera confirmed it started
    CameraStarted,
    /// Detector or camera could not be acquired
    AcquisitionFailed {
        /// Error message
        error: String,
    },
    /// User turned gesture control off
    Disable,
    /// Frame stream ended without being asked to
    CaptureLost,
}

/// Reason for entering a state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// User requested enable
    EnableRequested,
    /// Camera confirmed start
    CameraConfirmed,
    /// Acquisition failed
    AcquisitionFailed { message: String },
    /// User requested disable
    DisableRequested,
    /// Detector stopped on its own
    CaptureLost,
}

/// Result of a state transition
#[derive(Debug, Clone)]
pub struct TransitionResult {
    /// The new state after the transition
    pub new_state: CaptureState,
    /// Reason for the transition
    pub reason: TransitionReason,
}

/// Capture lifecycle state machine
pub struct CaptureStateMachine {
    /// Current state
    state: CaptureState,
    /// Timestamp when the current state was entered
    state_entered_at: Instant,
}

impl CaptureStateMachine {
    /// Creates a new state machine in the Idle state
    pub fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            state_entered_at: Instant::now(),
        }
    }

    /// Returns the current state
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Returns how long the machine has been in the current state
    pub fn time_in_state(&self) -> std::time::Duration {
        self.state_entered_at.elapsed()
    }

    /// Process an event and return the transition result if a transition occurred
    ///
    /// Returns `None` if the event does not apply to the current state, which
    /// is how repeated enables and disables become no-ops.
    pub fn process_event(&mut self, event: CaptureEvent) -> Option<TransitionResult> {
        let transition = match (&self.state, event) {
            (CaptureState::Idle, CaptureEvent::Enable) => Some(TransitionResult {
                new_state: CaptureState::Initializing,
                reason: TransitionReason::EnableRequested,
            }),

            (CaptureState::Initializing, CaptureEvent::CameraStarted) => Some(TransitionResult {
                new_state: CaptureState::Running,
                reason: TransitionReason::CameraConfirmed,
            }),
            (CaptureState::Initializing, CaptureEvent::AcquisitionFailed { error }) => {
                Some(TransitionResult {
                    new_state: CaptureState::Idle,
                    reason: TransitionReason::AcquisitionFailed { message: error },
                })
            }
            (CaptureState::Initializing, CaptureEvent::Disable) => Some(TransitionResult {
                new_state: CaptureState::Idle,
                reason: TransitionReason::DisableRequested,
            }),

            (CaptureState::Running, CaptureEvent::Disable) => Some(TransitionResult {
                new_state: CaptureState::Idle,
                reason: TransitionReason::DisableRequested,
            }),
            (CaptureState::Running, CaptureEvent::CaptureLost) => Some(TransitionResult {
                new_state: CaptureState::Idle,
                reason: TransitionReason::CaptureLost,
            }),

            _ => None,
        };

        if let Some(ref result) = transition {
            let previous_state = self.state;
            let held_for = self.time_in_state();
            self.state = result.new_state;
            self.state_entered_at = Instant::now();

            tracing::info!(
                "Capture state transition: {:?} -> {:?} after {:?} (reason: {:?})",
                previous_state,
                result.new_state,
                held_for,
                result.reason
            );
        }

        transition
    }
}

impl Default for CaptureStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
