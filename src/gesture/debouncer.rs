//! Edge-triggered gesture debouncing
//!
//! The classifier reports the same gesture on every frame while a pose is
//! held. The debouncer turns that level signal into discrete commits:
//!
//! - a commit only happens on a change of gesture (rising edge);
//! - at most one commit per cooldown window;
//! - losing the hand (no gesture) re-arms the edge, so showing the same
//!   gesture again fires again once the cooldown allows it;
//! - the edge is tracked even while the cooldown suppresses a commit, so a
//!   pose that was held through the cooldown never fires late.

use super::{CommandMap, Gesture};
use std::time::{Duration, Instant};

/// Minimum time between two commits
pub const DEFAULT_COOLDOWN_MS: u64 = 2000;

/// A committed gesture and the command it maps to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub gesture: Gesture,
    pub command: String,
}

/// Stateful per-frame gesture filter
#[derive(Debug, Clone)]
pub struct GestureDebouncer {
    commands: CommandMap,
    cooldown: Duration,
    last_gesture: Option<Gesture>,
    /// Only ever moves forward
    last_command_at: Option<Instant>,
}

impl GestureDebouncer {
    pub fn new(commands: CommandMap, cooldown: Duration) -> Self {
        Self {
            commands,
            cooldown,
            last_gesture: None,
            last_command_at: None,
        }
    }

    /// Gesture seen on the most recent frame
    pub fn last_gesture(&self) -> Option<Gesture> {
        self.last_gesture
    }

    /// When the last command was committed
    pub fn last_command_at(&self) -> Option<Instant> {
        self.last_command_at
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn commands(&self) -> &CommandMap {
        &self.commands
    }

    /// Feed one frame's classification
    ///
    /// Returns the commit when this frame fires a command.
    pub fn on_frame(&mut self, gesture: Option<Gesture>, now: Instant) -> Option<Commit> {
        let Some(gesture) = gesture else {
            self.last_gesture = None;
            return None;
        };

        if self.last_gesture == Some(gesture) {
            return None;
        }
        self.last_gesture = Some(gesture);

        if !self.cooldown_elapsed(now) {
            tracing::debug!("Gesture {} suppressed by cooldown", gesture);
            return None;
        }

        let command = self.commands.command_for(gesture)?.to_string();
        self.last_command_at = Some(match self.last_command_at {
            Some(previous) => previous.max(now),
            None => now,
        });

        tracing::info!("Gesture committed: {} -> {:?}", gesture, command);
        Some(Commit { gesture, command })
    }

    /// Forget the current edge without touching the cooldown clock
    pub fn rearm(&mut self) {
        self.last_gesture = None;
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_command_at {
            Some(at) => now.saturating_duration_since(at) >= self.cooldown,
            None => true,
        }
    }
}
