//! Per-page session state
//!
//! Owned by exactly one agent task. Everything the panel sees is a snapshot
//! taken from here; nothing else mutates it.

use crate::bus::{StatusReport, ToggleReport};
use crate::capture::{Acquisition, CaptureManager, CaptureState, DetectionFrame};
use crate::gesture::{classify, Commit, GestureDebouncer};
use std::time::Instant;
use tokio::sync::mpsc;

/// What a toggle asked the caller to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    /// Start the capture backend under this generation
    Acquire(u64),
    /// Capture was stopped
    Disabled,
}

pub struct SessionState {
    capture: CaptureManager,
    debouncer: GestureDebouncer,
    extension_margin: f32,
    last_command: Option<String>,
}

impl SessionState {
    pub fn new(debouncer: GestureDebouncer, extension_margin: f32) -> Self {
        Self {
            capture: CaptureManager::new(),
            debouncer,
            extension_margin,
            last_command: None,
        }
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    /// Flip gesture control
    pub fn toggle(&mut self) -> ToggleAction {
        if self.capture_state().is_enabled() {
            self.disable();
            ToggleAction::Disabled
        } else {
            match self.capture.begin_enable() {
                Some(generation) => ToggleAction::Acquire(generation),
                None => ToggleAction::Disabled,
            }
        }
    }

    /// Stop capture and clear the per-run fields
    ///
    /// The cooldown clock is kept, so re-enabling cannot fire early.
    pub fn disable(&mut self) {
        if self.capture.disable() {
            self.reset();
        }
    }

    pub fn complete(&mut self, acquisition: Acquisition) -> Option<mpsc::Receiver<DetectionFrame>> {
        self.capture.complete(acquisition)
    }

    pub fn capture_lost(&mut self) {
        if self.capture.capture_lost() {
            self.reset();
        }
    }

    /// Run one detector frame through the classifier and debouncer
    pub fn observe(&mut self, frame: &DetectionFrame, now: Instant) -> Option<Commit> {
        if !self.capture_state().is_camera_active() {
            return None;
        }
        let gesture = frame
            .primary_hand()
            .and_then(|hand| classify(hand, self.extension_margin));

        let commit = self.debouncer.on_frame(gesture, now)?;
        self.last_command = Some(commit.command.clone());
        Some(commit)
    }

    pub fn status_report(&self) -> StatusReport {
        let state = self.capture_state();
        StatusReport {
            enabled: state.is_enabled(),
            camera_active: state.is_camera_active(),
            last_gesture: self.debouncer.last_gesture(),
            last_command: self.last_command.clone(),
        }
    }

    pub fn toggle_report(&self) -> ToggleReport {
        let state = self.capture_state();
        ToggleReport {
            enabled: state.is_enabled(),
            camera_active: state.is_camera_active(),
        }
    }

    fn reset(&mut self) {
        self.debouncer.rearm();
        self.last_command = None;
    }
}
