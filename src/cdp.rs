//! Minimal Chrome DevTools Protocol client
//!
//! Talks to one page target over its own WebSocket
//! (`webSocketDebuggerUrl`), so no target attachment or session ids are
//! involved. Tabs are discovered through the HTTP `/json/list` endpoint.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, CdpError>>>>>;

/// How long a single protocol call may take
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// CDP errors
#[derive(Debug, thiserror::Error)]
pub enum CdpError {
    #[error("Chrome not available at {0}. Start Chrome with: chrome --remote-debugging-port=9222")]
    ChromeNotAvailable(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("CDP error: {message} (code: {code})")]
    Protocol { code: i64, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("JavaScript error: {0}")]
    JavaScript(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Page closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for CdpError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        CdpError::WebSocket(e.to_string())
    }
}

/// Tab entry from `/json/list`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTarget {
    pub id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
    pub web_socket_debugger_url: Option<String>,
}

impl PageTarget {
    /// Regular tabs only, not workers or extension pages
    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }
}

/// List the browser's targets
pub async fn list_targets(endpoint: &str) -> Result<Vec<PageTarget>, CdpError> {
    let url = format!("{}/json/list", endpoint.trim_end_matches('/'));
    tracing::trace!("Listing targets from {}", url);

    let unavailable = |e: reqwest::Error| CdpError::ChromeNotAvailable(format!("{}: {}", endpoint, e));
    reqwest::get(&url)
        .await
        .map_err(unavailable)?
        .json()
        .await
        .map_err(unavailable)
}

#[derive(Serialize)]
struct CdpRequest<'a> {
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Deserialize)]
struct CdpResponse {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<CdpErrorBody>,
}

#[derive(Deserialize)]
struct CdpErrorBody {
    code: i64,
    message: String,
}

/// Connection to one page
pub struct CdpPage {
    ws_tx: tokio::sync::Mutex<WsSink>,
    request_id: AtomicU64,
    pending: Pending,
    closed: Arc<AtomicBool>,
    recv_task: tokio::task::JoinHandle<()>,
}

impl CdpPage {
    pub async fn connect(ws_url: &str) -> Result<Self, CdpError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| CdpError::ConnectionFailed(format!("{}: {}", ws_url, e)))?;

        let (ws_sink, ws_source) = ws_stream.split();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let recv_task = tokio::spawn(receive_loop(ws_source, pending.clone(), closed.clone()));
        tracing::debug!("CDP connected to {}", ws_url);

        Ok(Self {
            ws_tx: tokio::sync::Mutex::new(ws_sink),
            request_id: AtomicU64::new(1),
            pending,
            closed,
            recv_task,
        })
    }

    /// Whether the page's socket has gone away
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a protocol command and wait for its result
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CdpError> {
        if self.is_closed() {
            return Err(CdpError::Closed);
        }

        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let text = serde_json::to_string(&CdpRequest { id, method, params })?;
        tracing::trace!("CDP send: {}", text);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let sent = {
            let mut ws = self.ws_tx.lock().await;
            ws.send(Message::Text(text.into())).await
        };
        if let Err(e) = sent {
            self.pending.lock().remove(&id);
            return Err(e.into());
        }

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CdpError::Closed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(CdpError::Timeout(format!("{} timed out", method)))
            }
        }
    }

    /// Evaluate an expression in the page and return its value
    pub async fn evaluate(&self, expression: &str) -> Result<Value, CdpError> {
        let result = self
            .call(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let text = exception["text"].as_str().unwrap_or("Unknown error");
            return Err(CdpError::JavaScript(text.to_string()));
        }

        Ok(result["result"]["value"].clone())
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

async fn receive_loop(mut ws_source: WsSource, pending: Pending, closed: Arc<AtomicBool>) {
    while let Some(msg) = ws_source.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                tracing::trace!("CDP recv: {}", text);
                let response: CdpResponse = match serde_json::from_str(&text) {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!("Failed to parse CDP message: {}", e);
                        continue;
                    }
                };
                // Events carry no id and are not needed here
                let Some(id) = response.id else { continue };
                if let Some(tx) = pending.lock().remove(&id) {
                    let result = match response.error {
                        Some(error) => Err(CdpError::Protocol {
                            code: error.code,
                            message: error.message,
                        }),
                        None => Ok(response.result.unwrap_or(Value::Null)),
                    };
                    let _ = tx.send(result);
                }
            }
            Ok(Message::Close(_)) => {
                tracing::debug!("CDP socket closed");
                break;
            }
            Err(e) => {
                tracing::warn!("CDP socket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    closed.store(true, Ordering::SeqCst);
    // Dropping the senders wakes every waiting call with `Closed`
    pending.lock().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_target_parsing() {
        let json = r#"[
            {
                "description": "",
                "devtoolsFrontendUrl": "/devtools/inspector.html?ws=127.0.0.1:9222/devtools/page/ABC",
                "id": "ABC",
                "title": "Agent",
                "type": "page",
                "url": "http://127.0.0.1:50080/chat",
                "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/ABC"
            },
            {
                "id": "SW1",
                "type": "service_worker",
                "url": "http://127.0.0.1:50080/sw.js"
            }
        ]"#;

        let targets: Vec<PageTarget> = serde_json::from_str(json).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets[0].is_page());
        assert_eq!(targets[0].title, "Agent");
        assert_eq!(
            targets[0].web_socket_debugger_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/page/ABC")
        );
        assert!(!targets[1].is_page());
        assert_eq!(targets[1].web_socket_debugger_url, None);
    }

    #[test]
    fn test_request_serialisation() {
        let request = CdpRequest {
            id: 7,
            method: "Runtime.evaluate",
            params: Some(json!({"expression": "1"})),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"id": 7, "method": "Runtime.evaluate", "params": {"expression": "1"}})
        );

        let bare = CdpRequest {
            id: 8,
            method: "Page.enable",
            params: None,
        };
        assert_eq!(
            serde_json::to_value(&bare).unwrap(),
            json!({"id": 8, "method": "Page.enable"})
        );
    }

    #[test]
    fn test_error_response_parsing() {
        let response: CdpResponse = serde_json::from_str(
            r#"{"id":3,"error":{"code":-32000,"message":"Cannot find context"}}"#,
        )
        .unwrap();
        assert_eq!(response.id, Some(3));
        let error = response.error.unwrap();
        assert_eq!(error.code, -32000);
        assert_eq!(error.message, "Cannot find context");
    }

    #[tokio::test]
    async fn test_list_targets_without_chrome() {
        // Port 9 (discard) is never a DevTools endpoint
        let err = list_targets("http://127.0.0.1:9").await.unwrap_err();
        assert!(matches!(err, CdpError::ChromeNotAvailable(_)));
    }
}
