//! Shared fakes for integration tests: an in-memory page and a scripted
//! capture backend, behind the same traits the daemon uses.

#![allow(dead_code)]

use async_trait::async_trait;
use gesturelink_lib::capture::{
    CaptureBackend, CaptureError, CaptureHandle, CaptureStream, DetectionFrame,
};
use gesturelink_lib::gesture::{Gesture, HandLandmarks, Landmark};
use gesturelink_lib::injector::{ElementRef, Notice, PageError, PageSurface};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// =============================================================================
// Fake page
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
    Fill { selector: String, index: usize, text: String },
    Enter { selector: String },
    Click { selector: String },
    Notify { icon: String, text: String },
}

#[derive(Debug, Clone)]
struct FakeElement {
    selector: String,
    visible: bool,
    value: String,
}

/// A page made of `(selector, visible)` elements
#[derive(Default)]
pub struct FakePage {
    elements: Mutex<Vec<FakeElement>>,
    actions: Mutex<Vec<PageAction>>,
    clears_on_enter: bool,
    fail_fill: bool,
    session: Mutex<Option<String>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element matched by `selector`
    pub fn with(self, selector: &str, visible: bool) -> Self {
        self.elements.lock().push(FakeElement {
            selector: selector.to_string(),
            visible,
            value: String::new(),
        });
        self
    }

    /// The page submits on Enter and empties the input
    pub fn clearing_on_enter(mut self) -> Self {
        self.clears_on_enter = true;
        self
    }

    pub fn failing_fill(mut self) -> Self {
        self.fail_fill = true;
        self
    }

    /// Replace the document, dropping any session mark
    pub fn reload(&self) {
        self.session.lock().take();
    }

    pub fn actions(&self) -> Vec<PageAction> {
        self.actions.lock().clone()
    }

    pub fn filled(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                PageAction::Fill { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<(String, String)> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                PageAction::Notify { icon, text } => Some((icon, text)),
                _ => None,
            })
            .collect()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                PageAction::Click { selector } => Some(selector),
                _ => None,
            })
            .collect()
    }

    /// Position of the element among the elements sharing its selector
    fn position(&self, element: &ElementRef) -> Option<usize> {
        self.elements
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.selector == element.selector)
            .nth(element.index)
            .map(|(i, _)| i)
    }

    fn record(&self, action: PageAction) {
        self.actions.lock().push(action);
    }
}

#[async_trait]
impl PageSurface for FakePage {
    async fn find_visible(&self, selector: &str) -> Result<Option<ElementRef>, PageError> {
        let index = self
            .elements
            .lock()
            .iter()
            .filter(|e| e.selector == selector)
            .position(|e| e.visible);
        Ok(index.map(|index| ElementRef {
            selector: selector.to_string(),
            index,
        }))
    }

    async fn fill(&self, element: &ElementRef, text: &str) -> Result<(), PageError> {
        if self.fail_fill {
            return Err(PageError::Detached(element.selector.clone()));
        }
        let i = self
            .position(element)
            .ok_or_else(|| PageError::Detached(element.selector.clone()))?;
        self.elements.lock()[i].value = text.to_string();
        self.record(PageAction::Fill {
            selector: element.selector.clone(),
            index: element.index,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn press_enter(&self, element: &ElementRef) -> Result<(), PageError> {
        if self.clears_on_enter {
            if let Some(i) = self.position(element) {
                self.elements.lock()[i].value.clear();
            }
        }
        self.record(PageAction::Enter {
            selector: element.selector.clone(),
        });
        Ok(())
    }

    async fn click(&self, element: &ElementRef) -> Result<(), PageError> {
        self.record(PageAction::Click {
            selector: element.selector.clone(),
        });
        Ok(())
    }

    async fn read_value(&self, element: &ElementRef) -> Result<String, PageError> {
        let i = self
            .position(element)
            .ok_or_else(|| PageError::Detached(element.selector.clone()))?;
        Ok(self.elements.lock()[i].value.clone())
    }

    async fn notify(&self, notice: &Notice) -> Result<(), PageError> {
        self.record(PageAction::Notify {
            icon: notice.icon.clone(),
            text: notice.text.clone(),
        });
        Ok(())
    }

    async fn mark_session(&self, token: &str) -> Result<(), PageError> {
        *self.session.lock() = Some(token.to_string());
        Ok(())
    }

    async fn has_session(&self, token: &str) -> Result<bool, PageError> {
        Ok(self.session.lock().as_deref() == Some(token))
    }
}

// =============================================================================
// Fake capture backend
// =============================================================================

#[derive(Debug, Clone)]
pub enum StartPlan {
    Succeed,
    Fail(String),
}

type FrameSlot = Arc<Mutex<Option<mpsc::Sender<DetectionFrame>>>>;

/// Capture backend whose starts follow a script
///
/// Starts not covered by the script succeed. The frame sender of the latest
/// successful start is kept so the test can feed frames.
pub struct FakeBackend {
    plans: Mutex<VecDeque<StartPlan>>,
    start_delay: Duration,
    starts: AtomicUsize,
    stops: Arc<AtomicUsize>,
    frames: FrameSlot,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            plans: Mutex::new(VecDeque::new()),
            start_delay: Duration::ZERO,
            starts: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
            frames: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_plan(self, plan: StartPlan) -> Self {
        self.plans.lock().push_back(plan);
        self
    }

    /// Camera takes this long to come up
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Whether a capture is currently delivering
    pub fn is_streaming(&self) -> bool {
        self.frames.lock().is_some()
    }

    /// Feed one frame; false when no capture is running
    pub async fn send(&self, frame: DetectionFrame) -> bool {
        let tx = self.frames.lock().clone();
        match tx {
            Some(tx) => tx.send(frame).await.is_ok(),
            None => false,
        }
    }

    /// Simulate the detector dying
    pub fn end_stream(&self) {
        self.frames.lock().take();
    }
}

#[async_trait]
impl CaptureBackend for FakeBackend {
    async fn start(&self) -> Result<CaptureStream, CaptureError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }

        let plan = self.plans.lock().pop_front().unwrap_or(StartPlan::Succeed);
        match plan {
            StartPlan::Succeed => {
                let (tx, rx) = mpsc::channel(32);
                *self.frames.lock() = Some(tx);
                Ok(CaptureStream::new(
                    rx,
                    Box::new(FakeHandle {
                        stops: self.stops.clone(),
                        frames: self.frames.clone(),
                        stopped: false,
                    }),
                ))
            }
            StartPlan::Fail(message) => Err(CaptureError::Detector(message)),
        }
    }
}

struct FakeHandle {
    stops: Arc<AtomicUsize>,
    frames: FrameSlot,
    stopped: bool,
}

impl CaptureHandle for FakeHandle {
    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.frames.lock().take();
        }
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Poses
// =============================================================================

/// A single-hand frame the classifier reads as `gesture`
pub fn pose(gesture: Gesture) -> DetectionFrame {
    let (thumb, fingers) = match gesture {
        Gesture::OpenPalm => (true, [true, true, true, true]),
        Gesture::Fist => (false, [false, false, false, false]),
        Gesture::TwoFingers => (false, [true, true, false, false]),
        Gesture::ThumbsUp => (true, [false, false, false, false]),
    };

    let mut hand = HandLandmarks::default();
    let points = hand.points_mut();
    points[0] = Landmark::new(0.5, 0.9, 0.0);
    points[3] = Landmark::new(0.4, 0.6, 0.0);
    points[4] = if thumb {
        Landmark::new(0.3, 0.5, 0.0)
    } else {
        Landmark::new(0.42, 0.6, 0.0)
    };
    for ((mcp, tip), extended) in [(5, 8), (9, 12), (13, 16), (17, 20)].into_iter().zip(fingers) {
        points[mcp] = Landmark::new(0.5, 0.6, 0.0);
        points[tip] = Landmark::new(0.5, if extended { 0.3 } else { 0.7 }, 0.0);
    }
    DetectionFrame { hands: vec![hand] }
}

/// A frame with no hand in view
pub fn empty_frame() -> DetectionFrame {
    DetectionFrame::default()
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
