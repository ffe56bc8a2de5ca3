use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot, Mutex, RwLock},
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

use crate::AutomationError;

#[derive(Debug, thiserror::Error)]
pub enum ExtensionBridgeError {
    #[error("Failed to bind to {addr}: {source}")]
    BindError {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<ExtensionBridgeError> for AutomationError {
    fn from(e: ExtensionBridgeError) -> Self {
        AutomationError::Bridge(e.to_string())
    }
}

pub const DEFAULT_WS_ADDR: &str = "127.0.0.1:17373";
/// Overrides [`DEFAULT_WS_ADDR`] for the global bridge.
pub const ADDR_ENV: &str = "OPERATOR_BRIDGE_ADDR";

const CLIENT_WAIT: Duration = Duration::from_secs(10);
const CLIENT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

type BridgeResult = Result<serde_json::Value, String>;
type PendingMap = HashMap<String, oneshot::Sender<BridgeResult>>;
type Pending = Arc<Mutex<PendingMap>>;
type Clients = Arc<Mutex<Vec<Client>>>;

#[derive(Debug, Serialize, Deserialize)]
struct EvalRequest {
    id: String,
    action: String,
    code: String,
    #[serde(default)]
    await_promise: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum BridgeIncoming {
    EvalResult {
        id: String,
        ok: bool,
        result: Option<serde_json::Value>,
        error: Option<String>,
    },
    Typed(TypedIncoming),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum TypedIncoming {
    #[serde(rename = "hello")]
    Hello {
        from: Option<String>,
        url: Option<String>,
    },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "console_event")]
    ConsoleEvent {
        level: Option<String>,
        args: Option<serde_json::Value>,
    },
    #[serde(rename = "exception_event")]
    ExceptionEvent { details: Option<serde_json::Value> },
}

struct Client {
    sender: mpsc::UnboundedSender<Message>,
    connected_at: std::time::Instant,
}

/// WebSocket server the browser extension connects to.
///
/// The extension evaluates each request's script in the clinical
/// application's tab and answers with an `EvalResult` carrying the same id.
pub struct ExtensionBridge {
    server_task: JoinHandle<()>,
    addr: SocketAddr,
    clients: Clients,
    pending: Pending,
}

// Supervised bridge that is recreated if the server task dies
static BRIDGE_SUPERVISOR: OnceCell<Arc<RwLock<Option<Arc<ExtensionBridge>>>>> = OnceCell::new();

impl ExtensionBridge {
    /// The process-wide bridge, started on first use.
    pub async fn global() -> Result<Arc<ExtensionBridge>, AutomationError> {
        let supervisor = BRIDGE_SUPERVISOR.get_or_init(|| Arc::new(RwLock::new(None)));

        {
            let guard = supervisor.read().await;
            if let Some(bridge) = guard.as_ref().filter(|b| !b.server_task.is_finished()) {
                return Ok(bridge.clone());
            }
        }

        let mut guard = supervisor.write().await;
        // Another task may have started it while we waited for the lock
        if let Some(bridge) = guard.as_ref().filter(|b| !b.server_task.is_finished()) {
            return Ok(bridge.clone());
        }
        if guard.is_some() {
            tracing::warn!("Extension bridge server task died, recreating...");
        } else {
            tracing::info!("Creating extension bridge...");
        }

        let addr = std::env::var(ADDR_ENV).unwrap_or_else(|_| DEFAULT_WS_ADDR.to_string());
        match ExtensionBridge::start(&addr).await {
            Ok(bridge) => {
                let bridge = Arc::new(bridge);
                *guard = Some(bridge.clone());
                Ok(bridge)
            }
            Err(e) => {
                tracing::error!("Failed to create extension bridge: {}", e);
                *guard = None;
                Err(e.into())
            }
        }
    }

    pub async fn start(addr: &str) -> Result<ExtensionBridge, ExtensionBridgeError> {
        let clients: Clients = Arc::new(Mutex::new(Vec::new()));
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ExtensionBridgeError::BindError {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Operator extension bridge listening on {}", local_addr);

        let clients_clone = clients.clone();
        let pending_clone = pending.clone();
        let server_task = tokio::spawn(async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!("ws accept error: {}", e);
                        continue;
                    }
                };
                let ws_clients = clients_clone.clone();
                let ws_pending = pending_clone.clone();
                tokio::spawn(async move {
                    let ws_stream = match accept_async(stream).await {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!(%peer, "ws handshake error: {}", e);
                            return;
                        }
                    };
                    let (mut sink, mut stream) = ws_stream.split();
                    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

                    let writer = tokio::spawn(async move {
                        while let Some(msg) = rx.recv().await {
                            if let Err(e) = sink.send(msg).await {
                                tracing::warn!("ws send error: {}", e);
                                break;
                            }
                        }
                    });

                    ws_clients.lock().await.push(Client {
                        sender: tx.clone(),
                        connected_at: std::time::Instant::now(),
                    });

                    while let Some(Ok(msg)) = stream.next().await {
                        if !msg.is_text() {
                            continue;
                        }
                        let txt = msg.into_text().unwrap_or_default();
                        handle_incoming(&txt, &ws_pending).await;
                    }

                    {
                        let mut clients = ws_clients.lock().await;
                        clients.retain(|c| !c.sender.is_closed());
                        if clients.is_empty() {
                            let mut pending = ws_pending.lock().await;
                            if !pending.is_empty() {
                                tracing::warn!(
                                    "Last client disconnected with {} pending requests - clearing all",
                                    pending.len()
                                );
                                pending.clear();
                            } else {
                                tracing::info!("Last client disconnected, extension bridge idle");
                            }
                        } else {
                            tracing::info!(
                                "Client disconnected, {} client(s) remaining",
                                clients.len()
                            );
                        }
                    }

                    writer.abort();
                });
            }
        });

        Ok(ExtensionBridge {
            server_task,
            addr: local_addr,
            clients,
            pending,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn is_client_connected(&self) -> bool {
        !self.clients.lock().await.is_empty()
    }

    /// Health of the bridge for status reporting.
    pub async fn health(&self) -> serde_json::Value {
        let alive = !self.server_task.is_finished();
        let client_count = self.clients.lock().await.len();
        serde_json::json!({
            "address": self.addr.to_string(),
            "connected": alive && client_count > 0,
            "status": if !alive { "dead" } else if client_count > 0 { "healthy" } else { "waiting_for_clients" },
            "clients": client_count,
        })
    }

    /// Evaluates `code` in the active tab and returns its JSON result.
    ///
    /// Waits a bounded time for an extension to connect. A script that
    /// throws comes back as `Bridge` error carrying the thrown message.
    pub async fn eval_in_active_tab(
        &self,
        code: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, AutomationError> {
        let start_time = tokio::time::Instant::now();
        loop {
            let client_count = self.clients.lock().await.len();
            if client_count > 0 {
                tracing::trace!("ExtensionBridge: {} client(s) connected", client_count);
                break;
            }
            if start_time.elapsed() >= CLIENT_WAIT {
                return Err(AutomationError::Bridge(format!(
                    "no extension connected to {} after {:?}",
                    self.addr, CLIENT_WAIT
                )));
            }
            tracing::info!(
                "ExtensionBridge: no clients connected, retrying in {}ms... (elapsed: {:.1}s)",
                CLIENT_RETRY_INTERVAL.as_millis(),
                start_time.elapsed().as_secs_f32()
            );
            tokio::time::sleep(CLIENT_RETRY_INTERVAL).await;
        }

        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel::<BridgeResult>();
        self.pending.lock().await.insert(id.clone(), tx);
        let req = EvalRequest {
            id: id.clone(),
            action: "eval".into(),
            code: code.to_string(),
            await_promise: true,
        };
        let payload = serde_json::to_string(&req)
            .map_err(|e| AutomationError::Internal(format!("bridge serialize: {e}")))?;

        let mut sent = false;
        {
            let mut clients = self.clients.lock().await;
            clients.retain(|c| !c.sender.is_closed());
            // The most recently connected client owns the active tab
            if let Some(c) = clients.last() {
                sent = c.sender.send(Message::Text(payload)).is_ok();
                if sent {
                    tracing::trace!(id = %id, connected_at = ?c.connected_at, "Sent eval to extension");
                }
            }
        }
        if !sent {
            self.pending.lock().await.remove(&id);
            return Err(AutomationError::Bridge(
                "no active extension client to send to".to_string(),
            ));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(val))) => Ok(val),
            Ok(Ok(Err(err))) => Err(AutomationError::Bridge(err)),
            Ok(Err(_canceled)) => Err(AutomationError::Bridge(
                "extension disconnected before answering".to_string(),
            )),
            Err(_elapsed) => {
                self.pending.lock().await.remove(&id);
                Err(AutomationError::Timeout(format!(
                    "no answer from extension within {timeout:?} (id={id})"
                )))
            }
        }
    }
}

async fn handle_incoming(txt: &str, pending: &Pending) {
    match serde_json::from_str::<BridgeIncoming>(txt) {
        Ok(BridgeIncoming::EvalResult {
            id,
            ok,
            result,
            error,
        }) => {
            if ok {
                tracing::debug!(id = %id, "Bridge received EvalResult");
            } else {
                let head: String = error.as_deref().unwrap_or("unknown error").chars().take(400).collect();
                tracing::debug!(id = %id, error = %head, "Bridge received EvalResult error");
            }
            if let Some(tx) = pending.lock().await.remove(&id) {
                let _ = tx.send(if ok {
                    Ok(result.unwrap_or(serde_json::Value::Null))
                } else {
                    Err(error.unwrap_or_else(|| "unknown error".into()))
                });
            }
        }
        Ok(BridgeIncoming::Typed(TypedIncoming::ConsoleEvent { level, args })) => {
            let args_str = args.map(|v| v.to_string()).unwrap_or_else(|| "[]".into());
            match level.as_deref().unwrap_or("log") {
                "error" => tracing::error!(args = %args_str, "Page console error"),
                "warning" | "warn" => tracing::warn!(args = %args_str, "Page console warning"),
                _ => tracing::debug!(args = %args_str, "Page console"),
            }
        }
        Ok(BridgeIncoming::Typed(TypedIncoming::ExceptionEvent { details })) => {
            let details = details.unwrap_or(serde_json::Value::Null);
            tracing::error!(details = %details, "Page runtime exception");
        }
        Ok(BridgeIncoming::Typed(TypedIncoming::Hello { from, url })) => {
            tracing::info!(from = ?from, url = ?url, "Extension connected");
        }
        Ok(BridgeIncoming::Typed(TypedIncoming::Pong)) => {}
        Err(e) => tracing::warn!("Invalid incoming JSON: {}", e),
    }
}
