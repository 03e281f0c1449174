//! In-page agent
//!
//! One tokio task per permitted browser tab. The task owns the tab's
//! `SessionState` and is the only thing that touches it:
//!
//! ```text
//!  bus requests ─┐
//!  acquisitions ─┼─► select! ─► SessionState ─► commit ─► spawn(announce + inject)
//!  frames ───────┘
//! ```
//!
//! Frames are handled strictly in order. Each commit gets its own detached
//! injection task so a slow page never stalls the frame pipeline. The task
//! ends when every `AgentHandle` is dropped, which releases the capture.

use crate::bus::{BusRequest, BusResponse};
use crate::capture::{Acquisition, CaptureBackend, DetectionFrame};
use crate::config::GestureConfig;
use crate::gesture::{Commit, CommandMap, GestureDebouncer};
use crate::injector::{CommandInjector, InjectOutcome};
use crate::session::{SessionState, ToggleAction};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Pending bus requests per agent
const REQUEST_QUEUE_DEPTH: usize = 16;

pub(crate) struct AgentRequest {
    pub(crate) request: BusRequest,
    pub(crate) reply: oneshot::Sender<BusResponse>,
}

/// Sending side of an agent
#[derive(Clone, Debug)]
pub struct AgentHandle {
    page_id: String,
    tx: mpsc::Sender<AgentRequest>,
}

impl AgentHandle {
    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    /// Whether the agent task has ended
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Send a request and wait for the reply
    ///
    /// `None` when the agent is gone or dropped the request.
    pub async fn request(&self, request: BusRequest) -> Option<BusResponse> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(AgentRequest { request, reply }).await.ok()?;
        rx.await.ok()
    }
}

#[cfg(test)]
impl AgentHandle {
    /// A handle with the receiving end handed to the test
    pub(crate) fn detached(page_id: &str) -> (Self, mpsc::Receiver<AgentRequest>) {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        (
            Self {
                page_id: page_id.to_string(),
                tx,
            },
            rx,
        )
    }
}

/// Everything an agent needs for one page
pub struct AgentContext {
    pub page_id: String,
    pub backend: Arc<dyn CaptureBackend>,
    pub injector: CommandInjector,
    pub commands: CommandMap,
    pub gestures: GestureConfig,
}

/// Start the agent task for a page
pub fn spawn_agent(context: AgentContext) -> (AgentHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    let handle = AgentHandle {
        page_id: context.page_id.clone(),
        tx,
    };
    let task = tokio::spawn(run_agent(context, rx));
    (handle, task)
}

async fn run_agent(context: AgentContext, mut requests: mpsc::Receiver<AgentRequest>) {
    let AgentContext {
        page_id,
        backend,
        injector,
        commands,
        gestures,
    } = context;

    let session_id = Uuid::new_v4();
    tracing::info!("Agent started for page {} (session {})", page_id, session_id);

    let debouncer = GestureDebouncer::new(commands, gestures.cooldown());
    let mut session = SessionState::new(debouncer, gestures.extension_margin);

    let (acquired_tx, mut acquired_rx) = mpsc::channel::<Acquisition>(4);
    let mut frames: Option<mpsc::Receiver<DetectionFrame>> = None;

    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(AgentRequest { request, reply }) = request else {
                    break;
                };
                let response = match request {
                    BusRequest::GetStatus => BusResponse::Status(session.status_report()),
                    BusRequest::ToggleGesture => {
                        match session.toggle() {
                            ToggleAction::Acquire(generation) => {
                                tracing::info!("Gesture control enabled (session {})", session_id);
                                spawn_acquisition(backend.clone(), generation, acquired_tx.clone());
                            }
                            ToggleAction::Disabled => {
                                tracing::info!("Gesture control disabled (session {})", session_id);
                                frames = None;
                            }
                        }
                        BusResponse::Toggle(session.toggle_report())
                    }
                };
                // The requester may have given up waiting
                let _ = reply.send(response);
            }

            Some(acquisition) = acquired_rx.recv() => {
                if let Some(rx) = session.complete(acquisition) {
                    frames = Some(rx);
                }
            }

            frame = next_frame(&mut frames) => match frame {
                Some(frame) => {
                    if let Some(commit) = session.observe(&frame, Instant::now()) {
                        spawn_injection(injector.clone(), commit);
                    }
                }
                None => {
                    frames = None;
                    session.capture_lost();
                }
            },
        }
    }

    session.disable();
    tracing::info!("Agent stopped for page {} (session {})", page_id, session_id);
}

async fn next_frame(frames: &mut Option<mpsc::Receiver<DetectionFrame>>) -> Option<DetectionFrame> {
    match frames {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// A result that can no longer be delivered is dropped, which releases it
fn spawn_acquisition(
    backend: Arc<dyn CaptureBackend>,
    generation: u64,
    acquired: mpsc::Sender<Acquisition>,
) {
    tokio::spawn(async move {
        let result = backend.start().await;
        if acquired.send(Acquisition { generation, result }).await.is_err() {
            tracing::debug!("Agent gone before capture started, releasing");
        }
    });
}

fn spawn_injection(injector: CommandInjector, commit: Commit) {
    tokio::spawn(async move {
        injector.announce(commit.gesture, &commit.command).await;
        match injector.inject(&commit.command).await {
            InjectOutcome::Delivered(_) => {}
            InjectOutcome::NoTarget => {
                tracing::warn!("No input on page for command {:?}", commit.command)
            }
            InjectOutcome::Failed(e) => {
                tracing::warn!("Failed to inject {:?}: {}", commit.command, e)
            }
        }
    });
}
