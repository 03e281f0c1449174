//! Capture lifecycle manager
//!
//! Couples the state machine to the resources it stands for. Acquisition is
//! asynchronous: `begin_enable` hands out a generation number, the caller
//! starts the backend in the background and reports back through
//! `complete`. A disable in between bumps the generation, so a result that
//! arrives late is recognised as stale and released on the spot. The last
//! transition wins and no half-started capture survives.

use super::state::{CaptureEvent, CaptureState, CaptureStateMachine};
use super::{CaptureError, CaptureHandle, CaptureStream, DetectionFrame};
use tokio::sync::mpsc;

/// Outcome of a background `CaptureBackend::start`
#[derive(Debug)]
pub struct Acquisition {
    /// Generation handed out by `begin_enable`
    pub generation: u64,
    pub result: Result<CaptureStream, CaptureError>,
}

/// Owns the capture state and the running capture, if any
pub struct CaptureManager {
    machine: CaptureStateMachine,
    generation: u64,
    handle: Option<Box<dyn CaptureHandle>>,
}

impl CaptureManager {
    pub fn new() -> Self {
        Self {
            machine: CaptureStateMachine::new(),
            generation: 0,
            handle: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.machine.state()
    }

    /// Request capture
    ///
    /// Returns the generation to acquire under, or `None` when already
    /// initializing or running.
    pub fn begin_enable(&mut self) -> Option<u64> {
        self.machine.process_event(CaptureEvent::Enable)?;
        self.generation += 1;
        Some(self.generation)
    }

    /// Apply the result of a background acquisition
    ///
    /// Returns the frame receiver when the capture is now running.
    pub fn complete(&mut self, acquisition: Acquisition) -> Option<mpsc::Receiver<DetectionFrame>> {
        let Acquisition { generation, result } = acquisition;

        if generation != self.generation || self.state() != CaptureState::Initializing {
            match result {
                Ok(stream) => {
                    tracing::info!(
                        "Releasing capture from superseded request (generation {})",
                        generation
                    );
                    let (_, mut handle) = stream.into_parts();
                    handle.stop();
                }
                Err(e) => {
                    tracing::debug!("Ignoring failure from superseded request: {}", e);
                }
            }
            return None;
        }

        match result {
            Ok(stream) => {
                let (frames, handle) = stream.into_parts();
                self.machine.process_event(CaptureEvent::CameraStarted);
                self.handle = Some(handle);
                tracing::info!("Camera started");
                Some(frames)
            }
            Err(e) => {
                tracing::error!("Failed to initialise gesture capture: {}", e);
                self.machine.process_event(CaptureEvent::AcquisitionFailed {
                    error: e.to_string(),
                });
                None
            }
        }
    }

    /// Stop capture
    ///
    /// Returns false when already idle.
    pub fn disable(&mut self) -> bool {
        if self.machine.process_event(CaptureEvent::Disable).is_none() {
            return false;
        }
        // Any acquisition still in flight is now stale
        self.generation += 1;
        self.release();
        true
    }

    /// The frame stream ended while running
    pub fn capture_lost(&mut self) -> bool {
        if self.machine.process_event(CaptureEvent::CaptureLost).is_none() {
            return false;
        }
        tracing::warn!("Detector stopped unexpectedly, gesture control disabled");
        self.release();
        true
    }

    fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.stop();
            tracing::info!("Capture released");
        }
    }
}

impl Default for CaptureManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        self.release();
    }
}
