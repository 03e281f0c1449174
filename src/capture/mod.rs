//! Camera capture and hand detection lifecycle
//!
//! The detector and camera are external collaborators behind
//! [`CaptureBackend`]. Starting a backend yields a [`CaptureStream`]: a frame
//! receiver plus a handle that stops the camera and releases everything the
//! start created.
//!
//! ## States
//!
//! ```text
//! ┌──────┐  enable   ┌──────────────┐  camera started  ┌─────────┐
//! │ IDLE │──────────►│ INITIALIZING │─────────────────►│ RUNNING │
//! └──────┘           └──────────────┘                  └─────────┘
//!    ▲                  │                                   │
//!    │  failure/disable │                   disable/lost    │
//!    │◄─────────────────┘◄──────────────────────────────────┘
//! ```
//!
//! Enable and disable are idempotent: requests that do not apply to the
//! current state are no-ops.

pub mod manager;
pub mod sidecar;
pub mod state;

pub use manager::{Acquisition, CaptureManager};
pub use sidecar::SidecarBackend;
pub use state::{CaptureEvent, CaptureState, CaptureStateMachine, TransitionReason};

use crate::gesture::HandLandmarks;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

/// Frames buffered between the detector and the classifier
///
/// Frames arriving while the queue is full are dropped, newer frames are
/// more useful than stale ones.
pub const FRAME_QUEUE_DEPTH: usize = 4;

/// One detector result
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DetectionFrame {
    /// Detected hands, most confident first
    #[serde(default)]
    pub hands: Vec<HandLandmarks>,
}

impl DetectionFrame {
    /// The hand used for classification
    pub fn primary_hand(&self) -> Option<&HandLandmarks> {
        self.hands.first()
    }
}

/// Capture errors
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Failed to start detector '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("Detector reported an error: {0}")]
    Detector(String),
    #[error("Detector exited before the camera started")]
    Exited,
    #[error("Camera did not start within {0:?}")]
    StartupTimeout(std::time::Duration),
    #[error("Detector I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Releases a running capture
///
/// Implementations must also release on drop, so an abandoned stream never
/// leaves the camera on.
pub trait CaptureHandle: Send {
    /// Stop the camera and release the detector
    fn stop(&mut self);
}

/// A started capture: frames plus the handle that stops them
pub struct CaptureStream {
    pub frames: mpsc::Receiver<DetectionFrame>,
    pub handle: Box<dyn CaptureHandle>,
}

impl CaptureStream {
    pub fn new(frames: mpsc::Receiver<DetectionFrame>, handle: Box<dyn CaptureHandle>) -> Self {
        Self { frames, handle }
    }

    /// Split into the frame receiver and the release handle
    pub fn into_parts(self) -> (mpsc::Receiver<DetectionFrame>, Box<dyn CaptureHandle>) {
        (self.frames, self.handle)
    }
}

impl std::fmt::Debug for CaptureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureStream").finish_non_exhaustive()
    }
}

/// Source of hand detections
///
/// `start` returns once the camera has confirmed it is running. On error
/// nothing it created may stay alive.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn start(&self) -> Result<CaptureStream, CaptureError>;
}
