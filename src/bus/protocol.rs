//! Message bus wire types
//!
//! Requests are JSON objects tagged by `type`; replies are flat camelCase
//! objects. Readers ignore fields they do not know and default the ones that
//! are missing, so the schema only ever grows.

use crate::gesture::Gesture;
use serde::{Deserialize, Serialize};

/// Requests the panel can make
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusRequest {
    /// Snapshot of the session, no side effects
    GetStatus,
    /// Flip gesture control on or off
    ToggleGesture,
}

/// Reply to `GET_STATUS`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusReport {
    pub enabled: bool,
    pub camera_active: bool,
    pub last_gesture: Option<Gesture>,
    pub last_command: Option<String>,
}

impl StatusReport {
    /// What the panel shows when no agent answers
    pub fn rest() -> Self {
        Self::default()
    }
}

/// Reply to `TOGGLE_GESTURE`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToggleReport {
    pub enabled: bool,
    pub camera_active: bool,
}

impl From<ToggleReport> for StatusReport {
    fn from(report: ToggleReport) -> Self {
        Self {
            enabled: report.enabled,
            camera_active: report.camera_active,
            ..Self::default()
        }
    }
}

/// Any reply on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BusResponse {
    Status(StatusReport),
    Toggle(ToggleReport),
}

impl BusResponse {
    /// Rest-state reply for a request nobody answered
    pub fn rest_for(request: BusRequest) -> Self {
        match request {
            BusRequest::GetStatus => Self::Status(StatusReport::rest()),
            BusRequest::ToggleGesture => Self::Toggle(ToggleReport::default()),
        }
    }

    /// Flatten into the status shape the panel renders
    pub fn into_status(self) -> StatusReport {
        match self {
            Self::Status(status) => status,
            Self::Toggle(toggle) => toggle.into(),
        }
    }
}

/// Error reply for lines that are not a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusError {
    pub error: String,
}
