//! Gesture to command mapping
//!
//! Static configuration: loaded once with the config file, never edited at
//! runtime.

use super::Gesture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from gesture to the instruction typed into the agent UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandMap(BTreeMap<Gesture, String>);

impl CommandMap {
    pub fn new(entries: impl IntoIterator<Item = (Gesture, String)>) -> Self {
        Self(entries.into_iter().collect())
    }

    /// Command for a gesture, if one is configured
    pub fn command_for(&self, gesture: Gesture) -> Option<&str> {
        self.0
            .get(&gesture)
            .map(String::as_str)
            .filter(|c| !c.trim().is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Gesture, &str)> {
        self.0.iter().map(|(g, c)| (*g, c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for CommandMap {
    fn default() -> Self {
        Self::new([
            (Gesture::OpenPalm, "Pause current task".to_string()),
            (Gesture::Fist, "Stop immediately".to_string()),
            (Gesture::TwoFingers, "Execute the next task".to_string()),
            (Gesture::ThumbsUp, "Confirm and proceed".to_string()),
        ])
    }
}
