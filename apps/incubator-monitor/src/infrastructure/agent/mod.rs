//! Signing Agent Bridge
//!
//! WebSocket JSON-RPC client for the operator's signing agent. The
//! bridge dials lazily on the first call and keeps one socket task that
//! owns the connection, correlates responses by request id, and fans
//! agent notifications out over a broadcast channel. A dead socket is
//! dropped and the next call redials, so an agent restart never forces
//! a monitor restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{AgentError, AgentEvent, SigningAgentPort};
use crate::domain::connection::{AccountAddress, ChainId};
use crate::infrastructure::config::AgentSettings;
use crate::infrastructure::ledger::messages::{
    RpcErrorObject, RpcFrame, RpcNotification, RpcRequest, parse_frame,
};

/// Silent identity probe, answered without operator interaction.
const METHOD_ACCOUNTS: &str = "eth_accounts";

/// Interactive grant request. Blocks until the operator decides.
const METHOD_REQUEST_ACCOUNTS: &str = "eth_requestAccounts";

/// Ledger network the agent is currently bound to.
const METHOD_CHAIN_ID: &str = "eth_chainId";

/// Notification method for account set changes.
const NOTIFY_ACCOUNTS_CHANGED: &str = "accountsChanged";

/// Notification method for network switches.
const NOTIFY_CHAIN_CHANGED: &str = "chainChanged";

/// Agent error code for an operator-rejected request.
const CODE_USER_REJECTED: i64 = 4001;

/// How long the dial gets before the agent counts as unreachable.
const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Requests queued towards the socket task.
const OUTBOUND_BUFFER: usize = 16;

/// Notification fan-out capacity.
const EVENT_BUFFER: usize = 32;

type ReplySender = oneshot::Sender<Result<serde_json::Value, RpcErrorObject>>;

/// One queued call on its way to the socket task.
struct Outbound {
    request: RpcRequest,
    reply: ReplySender,
}

// =============================================================================
// Bridge
// =============================================================================

/// JSON-RPC bridge to the signing agent.
#[derive(Debug)]
pub struct WalletBridge {
    settings: AgentSettings,
    events: broadcast::Sender<AgentEvent>,
    link: Mutex<Option<mpsc::Sender<Outbound>>>,
    next_id: AtomicU64,
}

impl WalletBridge {
    /// Create a bridge for the configured agent endpoint. No connection
    /// is opened until the first call.
    #[must_use]
    pub fn new(settings: AgentSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            settings,
            events,
            link: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Hand out the live link, dialing a fresh one if the previous
    /// socket task has exited.
    async fn ensure_link(&self) -> Result<mpsc::Sender<Outbound>, AgentError> {
        let mut link = self.link.lock().await;
        if let Some(sender) = link.as_ref()
            && !sender.is_closed()
        {
            return Ok(sender.clone());
        }

        tracing::info!(url = %self.settings.ws_url, "Connecting to signing agent");
        let dialed = tokio::time::timeout(
            DIAL_TIMEOUT,
            tokio_tungstenite::connect_async(&self.settings.ws_url),
        )
        .await;
        let connected = match dialed {
            Ok(result) => result,
            Err(_) => {
                return Err(AgentError::Unavailable {
                    message: format!("agent did not accept the connection within {DIAL_TIMEOUT:?}"),
                });
            }
        };
        let (ws_stream, _response) = connected.map_err(|e| AgentError::Unavailable {
            message: e.to_string(),
        })?;

        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        tokio::spawn(run_link(ws_stream, rx, self.events.clone()));
        *link = Some(tx.clone());
        Ok(tx)
    }

    /// Forget the current link so the next call redials.
    async fn drop_link(&self) {
        *self.link.lock().await = None;
    }

    /// Issue one call and wait for its answer.
    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, AgentError> {
        let sender = self.ensure_link().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        let outbound = Outbound {
            request: RpcRequest::new(id, method, params),
            reply: reply_tx,
        };
        if sender.send(outbound).await.is_err() {
            self.drop_link().await;
            return Err(AgentError::Unavailable {
                message: "agent connection lost".to_string(),
            });
        }

        let answered = tokio::time::timeout(self.settings.call_timeout, reply_rx).await;
        match answered {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(error))) => Err(classify_rejection(method, &error)),
            Ok(Err(_)) => {
                self.drop_link().await;
                Err(AgentError::Unavailable {
                    message: "agent connection lost".to_string(),
                })
            }
            // The link stays up: an unanswered call usually means the
            // approval popup is still open on the operator's side.
            Err(_) => Err(AgentError::Unavailable {
                message: format!(
                    "agent did not answer {method} within {:?}",
                    self.settings.call_timeout
                ),
            }),
        }
    }
}

#[async_trait]
impl SigningAgentPort for WalletBridge {
    async fn current_accounts(&self) -> Result<Vec<AccountAddress>, AgentError> {
        let value = self.call(METHOD_ACCOUNTS, serde_json::json!([])).await?;
        decode_accounts(value)
    }

    async fn request_accounts(&self) -> Result<Vec<AccountAddress>, AgentError> {
        let value = self
            .call(METHOD_REQUEST_ACCOUNTS, serde_json::json!([]))
            .await?;
        decode_accounts(value)
    }

    async fn chain_id(&self) -> Result<ChainId, AgentError> {
        let value = self.call(METHOD_CHAIN_ID, serde_json::json!([])).await?;
        serde_json::from_value(value).map_err(|e| AgentError::Protocol {
            message: format!("chain id undecodable: {e}"),
        })
    }

    fn notifications(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }
}

fn decode_accounts(value: serde_json::Value) -> Result<Vec<AccountAddress>, AgentError> {
    serde_json::from_value(value).map_err(|e| AgentError::Protocol {
        message: format!("account list undecodable: {e}"),
    })
}

fn classify_rejection(method: &str, error: &RpcErrorObject) -> AgentError {
    if error.code == CODE_USER_REJECTED {
        return AgentError::Denied;
    }
    AgentError::Protocol {
        message: format!("{method} failed ({}): {}", error.code, error.message),
    }
}

// =============================================================================
// Socket Task
// =============================================================================

/// Own the socket: send queued calls, route answers back by id, fan
/// notifications out. Exits when the socket dies or every bridge handle
/// is gone; dropping the pending map fails all in-flight calls.
async fn run_link(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::Receiver<Outbound>,
    events: broadcast::Sender<AgentEvent>,
) {
    let (mut write, mut read) = ws_stream.split();
    let mut pending: HashMap<u64, ReplySender> = HashMap::new();

    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(Outbound { request, reply }) => {
                    let json = match serde_json::to_string(&request) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!(error = %e, "Unserializable agent request");
                            drop(reply);
                            continue;
                        }
                    };
                    if write.send(Message::Text(json.into())).await.is_err() {
                        drop(reply);
                        break;
                    }
                    pending.insert(request.id, reply);
                }
                None => return,
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => dispatch(&text, &mut pending, &events),
                Some(Ok(Message::Ping(payload))) => {
                    let _ = write.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Agent socket error");
                    break;
                }
            }
        }
    }

    tracing::warn!("Agent connection closed");
}

/// Route one incoming frame.
fn dispatch(
    text: &str,
    pending: &mut HashMap<u64, ReplySender>,
    events: &broadcast::Sender<AgentEvent>,
) {
    let frame = match parse_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable agent frame");
            return;
        }
    };
    match frame {
        RpcFrame::Response(response) => {
            let Some(id) = response.id else {
                tracing::warn!("Agent response without id");
                return;
            };
            match pending.remove(&id) {
                Some(reply) => {
                    let _ = reply.send(response.into_result());
                }
                // The caller may have timed out and walked away.
                None => tracing::debug!(id, "Agent response with no caller waiting"),
            }
        }
        RpcFrame::Notification(notification) => dispatch_notification(notification, events),
    }
}

/// Decode and publish one agent notification. Payloads ride as the
/// first positional parameter.
fn dispatch_notification(notification: RpcNotification, events: &broadcast::Sender<AgentEvent>) {
    let payload = notification
        .params
        .get(0)
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    match notification.method.as_str() {
        NOTIFY_ACCOUNTS_CHANGED => match serde_json::from_value::<Vec<AccountAddress>>(payload) {
            Ok(accounts) => {
                tracing::debug!(count = accounts.len(), "Agent account set changed");
                let _ = events.send(AgentEvent::AccountsChanged(accounts));
            }
            Err(e) => tracing::warn!(error = %e, "Malformed accountsChanged payload"),
        },
        NOTIFY_CHAIN_CHANGED => match serde_json::from_value::<ChainId>(payload) {
            Ok(chain) => {
                tracing::debug!(chain = %chain, "Agent network changed");
                let _ = events.send(AgentEvent::ChainChanged(chain));
            }
            Err(e) => tracing::warn!(error = %e, "Malformed chainChanged payload"),
        },
        other => tracing::debug!(method = %other, "Ignoring agent notification"),
    }
}
