//! Detector sidecar backend
//!
//! Spawns the external hand detector and reads its JSON-lines output:
//!
//! ```text
//! {"event":"ready"}                                   camera started
//! {"event":"frame","hands":[[{"x":..,"y":..,"z":..}, ...21]]}
//! {"event":"error","message":"..."}                   fatal during startup
//! ```
//!
//! Killing the process stops the camera.

use super::{
    CaptureBackend, CaptureError, CaptureHandle, CaptureStream, DetectionFrame, FRAME_QUEUE_DEPTH,
};
use crate::config::DetectorConfig;
use crate::gesture::HandLandmarks;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One line of detector output
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SidecarEvent {
    Ready,
    Frame {
        #[serde(default)]
        hands: Vec<HandLandmarks>,
    },
    Error {
        message: String,
    },
    /// Events added by newer detectors
    #[serde(other)]
    Unknown,
}

impl SidecarEvent {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Arguments for the detector: configured extras first, then the options
/// derived from the detector settings
pub fn detector_args(config: &DetectorConfig) -> Vec<String> {
    let mut args = config.args.clone();
    args.extend([
        "--max-hands".to_string(),
        config.max_hands.to_string(),
        "--min-detection-confidence".to_string(),
        config.min_detection_confidence.to_string(),
        "--min-tracking-confidence".to_string(),
        config.min_tracking_confidence.to_string(),
        "--model-complexity".to_string(),
        config.model_complexity.to_string(),
        "--width".to_string(),
        config.frame_width.to_string(),
        "--height".to_string(),
        config.frame_height.to_string(),
    ]);
    args
}

/// Capture backend that runs the detector as a child process
pub struct SidecarBackend {
    config: DetectorConfig,
}

impl SidecarBackend {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    fn spawn(&self) -> Result<Child, CaptureError> {
        let args = detector_args(&self.config);
        tracing::info!("Starting detector: {} {}", self.config.command, args.join(" "));

        Command::new(&self.config.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CaptureError::Spawn {
                command: self.config.command.clone(),
                source,
            })
    }
}

#[async_trait]
impl CaptureBackend for SidecarBackend {
    async fn start(&self) -> Result<CaptureStream, CaptureError> {
        let mut child = self.spawn()?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("detector: {}", line);
                }
            });
        }

        let stdout = child.stdout.take().ok_or(CaptureError::Exited)?;
        let mut lines = BufReader::new(stdout).lines();

        // On error `child` is dropped here and killed
        match self.config.startup_timeout() {
            Some(limit) => tokio::time::timeout(limit, wait_ready(&mut lines))
                .await
                .map_err(|_| CaptureError::StartupTimeout(limit))??,
            None => wait_ready(&mut lines).await?,
        }

        let (tx, rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let reader = tokio::spawn(forward_frames(lines, tx));

        Ok(CaptureStream::new(
            rx,
            Box::new(SidecarHandle {
                child: Some(child),
                reader,
            }),
        ))
    }
}

async fn wait_ready(lines: &mut Lines<BufReader<ChildStdout>>) -> Result<(), CaptureError> {
    while let Some(line) = lines.next_line().await? {
        match SidecarEvent::parse(&line) {
            Ok(SidecarEvent::Ready) => return Ok(()),
            Ok(SidecarEvent::Error { message }) => return Err(CaptureError::Detector(message)),
            Ok(_) => {}
            Err(e) => tracing::warn!("Skipping unreadable detector line: {}", e),
        }
    }
    Err(CaptureError::Exited)
}

/// Runs until the detector closes stdout or the receiver goes away.
/// Returning drops `tx`, which is how the agent learns the capture ended.
async fn forward_frames(
    mut lines: Lines<BufReader<ChildStdout>>,
    tx: mpsc::Sender<DetectionFrame>,
) {
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Detector output error: {}", e);
                break;
            }
        };

        match SidecarEvent::parse(&line) {
            Ok(SidecarEvent::Frame { hands }) => {
                match tx.try_send(DetectionFrame { hands }) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::trace!("Frame queue full, dropping frame");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            Ok(SidecarEvent::Error { message }) => {
                tracing::warn!("Detector error: {}", message);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Skipping unreadable detector line: {}", e),
        }
    }
    tracing::debug!("Detector output closed");
}

struct SidecarHandle {
    child: Option<Child>,
    reader: JoinHandle<()>,
}

impl CaptureHandle for SidecarHandle {
    fn stop(&mut self) {
        self.reader.abort();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                tracing::warn!("Failed to kill detector: {}", e);
            } else {
                tracing::info!("Detector stopped");
            }
        }
    }
}

impl Drop for SidecarHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
