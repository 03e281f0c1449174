//! The page surface the injector drives
//!
//! Kept as a trait so the injection logic can be exercised against an
//! in-memory page in tests.

use crate::cdp::CdpError;
use crate::gesture::Gesture;
use async_trait::async_trait;
use std::time::Duration;

/// A located element: the selector that found it and its position among
/// that selector's matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    pub selector: String,
    pub index: usize,
}

/// Page surface errors
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error(transparent)]
    Cdp(#[from] CdpError),
    #[error("Element is no longer attached: {0}")]
    Detached(String),
    #[error("Unexpected page reply: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Gesture,
    Error,
}

/// A transient on-page notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub icon: String,
    pub text: String,
    pub duration: Duration,
}

impl Notice {
    pub fn gesture(gesture: Gesture, command: &str, duration: Duration) -> Self {
        Self {
            kind: NoticeKind::Gesture,
            icon: gesture.emoji().to_string(),
            text: command.to_string(),
            duration,
        }
    }

    pub fn error(message: &str, duration: Duration) -> Self {
        Self {
            kind: NoticeKind::Error,
            icon: "⚠️".to_string(),
            text: message.to_string(),
            duration,
        }
    }
}

/// Operations the injector needs from a page
#[async_trait]
pub trait PageSurface: Send + Sync {
    /// First match of `selector` that has a layout box
    async fn find_visible(&self, selector: &str) -> Result<Option<ElementRef>, PageError>;

    /// Focus, set the value and fire `input` and `change`
    async fn fill(&self, element: &ElementRef, text: &str) -> Result<(), PageError>;

    /// Fire Enter keydown, keypress and keyup
    async fn press_enter(&self, element: &ElementRef) -> Result<(), PageError>;

    async fn click(&self, element: &ElementRef) -> Result<(), PageError>;

    /// Current value of a text entry
    async fn read_value(&self, element: &ElementRef) -> Result<String, PageError>;

    async fn notify(&self, notice: &Notice) -> Result<(), PageError>;

    /// Tag the current document with an agent session token
    async fn mark_session(&self, token: &str) -> Result<(), PageError>;

    /// Whether the current document still carries `token`
    ///
    /// A reload or navigation replaces the document and drops the mark.
    async fn has_session(&self, token: &str) -> Result<bool, PageError>;
}
