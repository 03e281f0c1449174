//! Control panel
//!
//! Renders the session status as text and polls for updates. The panel only
//! displays what it is told; a poll nobody answers is skipped and the next
//! one is tried on schedule.

use crate::bus::{ipc, BusRequest, Coordinator, StatusReport};
use crate::gesture::CommandMap;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Where the panel gets its status from
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// `None` when nothing answered
    async fn status(&self) -> Option<StatusReport>;

    async fn toggle(&self) -> Option<StatusReport>;
}

/// In-process panel talking straight to the coordinator
#[async_trait]
impl StatusSource for Coordinator {
    async fn status(&self) -> Option<StatusReport> {
        Some(self.dispatch(BusRequest::GetStatus).await.into_status())
    }

    async fn toggle(&self) -> Option<StatusReport> {
        Some(self.dispatch(BusRequest::ToggleGesture).await.into_status())
    }
}

/// Panel in another process, talking to the daemon socket
#[derive(Debug, Clone)]
pub struct IpcStatusSource {
    socket: PathBuf,
    timeout: Duration,
}

impl IpcStatusSource {
    pub fn new(socket: PathBuf, timeout: Duration) -> Self {
        Self { socket, timeout }
    }

    async fn send(&self, request: BusRequest) -> Option<StatusReport> {
        match ipc::send_request(&self.socket, request, self.timeout).await {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::debug!("No reply to {:?}: {:#}", request, e);
                None
            }
        }
    }
}

#[async_trait]
impl StatusSource for IpcStatusSource {
    async fn status(&self) -> Option<StatusReport> {
        self.send(BusRequest::GetStatus).await
    }

    async fn toggle(&self) -> Option<StatusReport> {
        self.send(BusRequest::ToggleGesture).await
    }
}

/// Display labels for one status snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelView {
    pub enabled: bool,
    pub camera: &'static str,
    pub gesture: String,
    pub command: String,
}

impl From<&StatusReport> for PanelView {
    fn from(status: &StatusReport) -> Self {
        Self {
            enabled: status.enabled,
            camera: if status.camera_active { "Active" } else { "Off" },
            gesture: status
                .last_gesture
                .map(|g| format!("{} {}", g.emoji(), g.label()))
                .unwrap_or_else(|| "None".to_string()),
            command: status
                .last_command
                .clone()
                .unwrap_or_else(|| "None".to_string()),
        }
    }
}

impl fmt::Display for PanelView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Gesture control: {} | Camera: {} | Gesture: {} | Command: {}",
            if self.enabled { "On" } else { "Off" },
            self.camera,
            self.gesture,
            self.command
        )
    }
}

/// One line per mapped gesture, e.g. `✋ Open Palm → Pause current task`
pub fn gesture_guide(commands: &CommandMap) -> String {
    commands
        .iter()
        .map(|(gesture, command)| format!("{} {} → {}", gesture.emoji(), gesture.label(), command))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Poll `source` forever, handing each answered snapshot to `render`
pub async fn poll<F>(source: &dyn StatusSource, interval: Duration, mut render: F)
where
    F: FnMut(PanelView) + Send,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match source.status().await {
            Some(status) => render(PanelView::from(&status)),
            None => tracing::trace!("Status poll unanswered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::Gesture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_rest_view() {
        let view = PanelView::from(&StatusReport::rest());
        assert!(!view.enabled);
        assert_eq!(view.camera, "Off");
        assert_eq!(view.gesture, "None");
        assert_eq!(view.command, "None");
    }

    #[test]
    fn test_active_view_labels() {
        let cases = [
            (Gesture::OpenPalm, "✋ Open Palm"),
            (Gesture::Fist, "✊ Fist"),
            (Gesture::TwoFingers, "✌️ Two Fingers"),
            (Gesture::ThumbsUp, "👍 Thumbs Up"),
        ];
        for (gesture, label) in cases {
            let view = PanelView::from(&StatusReport {
                enabled: true,
                camera_active: true,
                last_gesture: Some(gesture),
                last_command: Some("Stop immediately".to_string()),
            });
            assert_eq!(view.camera, "Active");
            assert_eq!(view.gesture, label);
            assert_eq!(view.command, "Stop immediately");
        }
    }

    #[test]
    fn test_view_display() {
        let view = PanelView::from(&StatusReport {
            enabled: true,
            camera_active: false,
            last_gesture: None,
            last_command: None,
        });
        assert_eq!(
            view.to_string(),
            "Gesture control: On | Camera: Off | Gesture: None | Command: None"
        );
    }

    #[test]
    fn test_gesture_guide_lists_defaults() {
        let guide = gesture_guide(&CommandMap::default());
        let lines: Vec<&str> = guide.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines.contains(&"✋ Open Palm → Pause current task"));
        assert!(lines.contains(&"👍 Thumbs Up → Confirm and proceed"));
    }

    /// Answers every other poll
    struct Flaky {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StatusSource for Flaky {
        async fn status(&self) -> Option<StatusReport> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            (n % 2 == 0).then(StatusReport::rest)
        }

        async fn toggle(&self) -> Option<StatusReport> {
            None
        }
    }

    #[tokio::test]
    async fn test_poll_skips_unanswered_and_keeps_going() {
        let source = Flaky {
            calls: AtomicUsize::new(0),
        };
        let rendered = Arc::new(AtomicUsize::new(0));
        let counter = rendered.clone();

        let _ = tokio::time::timeout(
            Duration::from_millis(200),
            poll(&source, Duration::from_millis(10), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await;

        let calls = source.calls.load(Ordering::SeqCst);
        assert!(calls >= 4, "polled {} times", calls);
        assert_eq!(rendered.load(Ordering::SeqCst), (calls + 1) / 2);
    }

    #[tokio::test]
    async fn test_coordinator_source_without_agents() {
        let coordinator = Coordinator::new();
        assert_eq!(coordinator.status().await, Some(StatusReport::rest()));
        assert_eq!(coordinator.toggle().await.map(|s| s.enabled), Some(false));
    }
}
