//! Ledger Feed Channel
//!
//! WebSocket JSON-RPC adapter for the live reading push feed. Every
//! subscription opens its own socket, completes the subscribe handshake
//! inline, then hands the socket to a pump task that forwards pushes
//! into the caller's channel until cancellation or loss. The pump
//! reports `Lost` at most once and never reconnects on its own.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::messages::{
    EVENT_NEW_READING, METHOD_SUBSCRIBE, METHOD_UNSUBSCRIBE, NOTIFICATION_SUBSCRIPTION, RpcFrame,
    RpcRequest, SubscriptionParams, parse_frame,
};
use crate::application::ports::{FeedError, FeedEvent, FeedHandle, LiveFeedPort, ReadingRecord};

type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// How long the gateway gets to acknowledge a subscribe request.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Request id for the subscribe call on a fresh socket.
const SUBSCRIBE_REQUEST_ID: u64 = 1;

/// Request id for the best-effort unsubscribe on cancellation.
const UNSUBSCRIBE_REQUEST_ID: u64 = 2;

// =============================================================================
// Feed Channel
// =============================================================================

/// Live feed channel bound to one contract on one gateway.
#[derive(Debug)]
pub struct GatewayFeedChannel {
    ws_url: String,
    contract_address: String,
}

impl GatewayFeedChannel {
    /// Bind the channel to a gateway endpoint and contract address.
    #[must_use]
    pub fn new(ws_url: String, contract_address: String) -> Self {
        Self {
            ws_url,
            contract_address,
        }
    }
}

#[async_trait]
impl LiveFeedPort for GatewayFeedChannel {
    async fn subscribe(&self, sink: mpsc::Sender<FeedEvent>) -> Result<FeedHandle, FeedError> {
        tracing::info!(url = %self.ws_url, "Connecting to live reading feed");

        let connected = tokio_tungstenite::connect_async(&self.ws_url).await;
        let (ws_stream, _response) = connected.map_err(|e| FeedError::Connect {
            message: e.to_string(),
        })?;
        let (mut write, mut read) = ws_stream.split();

        let request = RpcRequest::new(
            SUBSCRIBE_REQUEST_ID,
            METHOD_SUBSCRIBE,
            serde_json::json!([EVENT_NEW_READING, self.contract_address]),
        );
        let json = serde_json::to_string(&request).map_err(|e| FeedError::Handshake {
            message: format!("failed to serialize subscribe request: {e}"),
        })?;
        write
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| FeedError::Handshake {
                message: format!("failed to send subscribe request: {e}"),
            })?;

        let acknowledged = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            await_acknowledgement(&mut write, &mut read),
        )
        .await;
        let subscription_id = match acknowledged {
            Ok(result) => result?,
            Err(_) => {
                return Err(FeedError::Handshake {
                    message: format!(
                        "gateway did not acknowledge subscription within {HANDSHAKE_TIMEOUT:?}"
                    ),
                });
            }
        };

        tracing::info!(subscription = %subscription_id, "Live reading feed established");

        let token = CancellationToken::new();
        tokio::spawn(pump(write, read, subscription_id, sink, token.clone()));
        Ok(FeedHandle::new(token))
    }
}

// =============================================================================
// Handshake
// =============================================================================

/// Read frames until the gateway answers the subscribe request.
async fn await_acknowledgement(write: &mut WsWrite, read: &mut WsRead) -> Result<String, FeedError> {
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                Ok(RpcFrame::Response(response)) => {
                    let result = response.into_result().map_err(|e| FeedError::Handshake {
                        message: format!("gateway refused subscription: {} (code {})", e.message, e.code),
                    })?;
                    return result.as_str().map(ToOwned::to_owned).ok_or_else(|| {
                        FeedError::Handshake {
                            message: "subscription acknowledgement carried no id".to_string(),
                        }
                    });
                }
                // A push cannot be matched before its subscription id exists.
                Ok(RpcFrame::Notification(_)) => {
                    tracing::debug!("Notification before acknowledgement, skipping");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Unparseable frame during feed handshake");
                }
            },
            Some(Ok(Message::Ping(payload))) => {
                let _ = write.send(Message::Pong(payload)).await;
            }
            Some(Ok(Message::Close(_))) => {
                return Err(FeedError::Handshake {
                    message: "gateway closed the socket during handshake".to_string(),
                });
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                return Err(FeedError::Handshake {
                    message: e.to_string(),
                });
            }
            None => {
                return Err(FeedError::Handshake {
                    message: "socket ended during handshake".to_string(),
                });
            }
        }
    }
}

// =============================================================================
// Pump Task
// =============================================================================

/// Forward pushes into the sink until cancellation or loss.
async fn pump(
    mut write: WsWrite,
    mut read: WsRead,
    subscription_id: String,
    sink: mpsc::Sender<FeedEvent>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = token.cancelled() => {
                unsubscribe(&mut write, &subscription_id).await;
                tracing::debug!(subscription = %subscription_id, "Live feed cancelled");
                return;
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(record) = decode_push(&text, &subscription_id)
                        && sink.send(FeedEvent::Reading(record)).await.is_err()
                    {
                        tracing::debug!("Feed consumer dropped, stopping pump");
                        return;
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = write.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    report_lost(&sink, "gateway closed the live feed".to_string()).await;
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    report_lost(&sink, e.to_string()).await;
                    return;
                }
                None => {
                    report_lost(&sink, "live feed socket ended".to_string()).await;
                    return;
                }
            }
        }
    }
}

/// Decode a text frame into a reading push for our subscription.
fn decode_push(text: &str, subscription_id: &str) -> Option<ReadingRecord> {
    let frame = match parse_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable frame on live feed");
            return None;
        }
    };
    let notification = match frame {
        RpcFrame::Notification(notification) => notification,
        // Late replies to handshake retransmits carry nothing for us.
        RpcFrame::Response(_) => return None,
    };
    if notification.method != NOTIFICATION_SUBSCRIPTION {
        tracing::debug!(method = %notification.method, "Ignoring unrelated notification");
        return None;
    }
    let params: SubscriptionParams = match serde_json::from_value(notification.params) {
        Ok(params) => params,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed subscription notification");
            return None;
        }
    };
    if params.subscription != subscription_id {
        tracing::debug!(subscription = %params.subscription, "Push for another subscription");
        return None;
    }
    match serde_json::from_value(params.result) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(error = %e, "Malformed reading on live feed");
            None
        }
    }
}

/// Tell the gateway we are done and close the socket. Best effort.
async fn unsubscribe(write: &mut WsWrite, subscription_id: &str) {
    let request = RpcRequest::new(
        UNSUBSCRIBE_REQUEST_ID,
        METHOD_UNSUBSCRIBE,
        serde_json::json!([subscription_id]),
    );
    if let Ok(json) = serde_json::to_string(&request) {
        let _ = write.send(Message::Text(json.into())).await;
    }
    let _ = write.send(Message::Close(None)).await;
}

/// Report feed loss to the consumer. The pump exits right after, so the
/// event fires at most once per subscription.
async fn report_lost(sink: &mpsc::Sender<FeedEvent>, reason: String) {
    tracing::warn!(reason = %reason, "Live reading feed lost");
    let _ = sink.send(FeedEvent::Lost { reason }).await;
}
