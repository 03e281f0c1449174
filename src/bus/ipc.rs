//! Unix socket transport for the bus
//!
//! Newline-delimited JSON: one request object per line in, one reply object
//! per line out. Lets `gesturelink status` and `gesturelink toggle` talk to
//! a running daemon.

use super::{BusError, BusRequest, Coordinator, StatusReport};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Bind the daemon socket, replacing a stale one
pub fn bind(path: &Path) -> Result<UnixListener> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
    }
    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind {}", path.display()))?;

    // Owner only: the socket can switch the camera on
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Failed to restrict {}", path.display()))?;
    }
    tracing::info!("IPC listening on {}", path.display());
    Ok(listener)
}

/// Accept clients until the listener fails
pub async fn serve(listener: UnixListener, coordinator: Arc<Coordinator>) {
    let mut next_client_id: u64 = 1;
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let id = next_client_id;
                next_client_id += 1;
                tracing::debug!("IPC client {} connected", id);
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, coordinator).await {
                        tracing::debug!("IPC client {} error: {}", id, e);
                    }
                    tracing::debug!("IPC client {} disconnected", id);
                });
            }
            Err(e) => {
                tracing::error!("IPC accept failed: {}", e);
                break;
            }
        }
    }
}

async fn handle_client(stream: UnixStream, coordinator: Arc<Coordinator>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = reply_for_line(&line, &coordinator).await?;
        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

async fn reply_for_line(line: &str, coordinator: &Coordinator) -> Result<String> {
    let reply = match serde_json::from_str::<BusRequest>(line) {
        Ok(request) => serde_json::to_string(&coordinator.dispatch(request).await)?,
        Err(e) => {
            tracing::debug!("Malformed IPC request {:?}: {}", line, e);
            serde_json::to_string(&BusError {
                error: e.to_string(),
            })?
        }
    };
    Ok(reply)
}

/// Send one request to a running daemon
///
/// Toggle replies are widened to a status with no gesture or command.
pub async fn send_request(
    path: &Path,
    request: BusRequest,
    timeout: Duration,
) -> Result<StatusReport> {
    tokio::time::timeout(timeout, exchange(path, request))
        .await
        .with_context(|| format!("No reply from {} within {:?}", path.display(), timeout))?
}

async fn exchange(path: &Path, request: BusRequest) -> Result<StatusReport> {
    let stream = UnixStream::connect(path)
        .await
        .with_context(|| format!("Is the daemon running? Cannot connect to {}", path.display()))?;
    let (reader, mut writer) = stream.into_split();

    let mut line = serde_json::to_string(&request)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;

    let reply = BufReader::new(reader)
        .lines()
        .next_line()
        .await?
        .context("Daemon closed the connection without replying")?;

    if let Ok(error) = serde_json::from_str::<BusError>(&reply) {
        anyhow::bail!("Daemon rejected request: {}", error.error);
    }
    Ok(serde_json::from_str(&reply)?)
}
