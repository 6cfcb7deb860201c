//! RPC over WebSocket.
//!
//! [`WsChannel`] owns one socket. A writer task drains outbound frames; a
//! reader task routes responses to their pending callers by request ID and
//! forwards server pushes as [`Push`] values. When the socket goes away every
//! pending caller gets [`ClientError::Closed`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use parley_core::RequestId;
use parley_rpc::methods::{
    ChatMessageData, ConnectionEstablishedData, EVENT_CHAT_MESSAGE, EVENT_CONNECTION_ESTABLISHED,
};
use parley_rpc::types::{RpcEvent, RpcRequest, RpcResponse, ServerFrame};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::ClientError;

/// Outbound frames buffered before `call` waits.
const OUTBOUND_CAPACITY: usize = 64;

/// Something the server sent without being asked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Push {
    /// The server accepted the connection.
    Established {
        /// Server-assigned connection identity.
        client_id: String,
    },
    /// A chat message fanned out by the server.
    Chat(ChatMessageData),
    /// The socket closed. Always the last push from a channel.
    Closed,
}

/// A request/response channel to the server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RpcChannel: Send + Sync {
    /// Call `method` and wait for its result.
    async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError>;

    /// Close the channel. Pending and later calls fail.
    fn close(&self);

    /// Whether the channel can still carry calls.
    fn is_open(&self) -> bool;
}

/// Opens [`RpcChannel`]s. Pushes from the new channel go to `pushes`.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Human-readable target, for status messages.
    fn target(&self) -> &str;

    /// Open a fresh channel.
    async fn connect(&self, pushes: mpsc::Sender<Push>) -> Result<Arc<dyn RpcChannel>, ClientError>;
}

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<RpcResponse>>>>;

/// [`RpcChannel`] over a tokio-tungstenite socket.
pub struct WsChannel {
    outbound: mpsc::Sender<String>,
    pending: Pending,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
    timeout: Duration,
}

impl WsChannel {
    /// Connect to `url`. Both the handshake and each call are bounded by
    /// `timeout`.
    pub async fn connect(
        url: &str,
        timeout: Duration,
        pushes: mpsc::Sender<Push>,
    ) -> Result<Self, ClientError> {
        let connect_err = |message: String| ClientError::Connect {
            url: url.to_owned(),
            message,
        };
        let (ws, _) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| connect_err(format!("timed out after {timeout:?}")))?
            .map_err(|e| connect_err(e.to_string()))?;

        let (mut sink, mut stream) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
        let pending: Pending = Arc::default();
        let open = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let writer_cancel = cancel.clone();
        drop(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = writer_cancel.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    frame = outbound_rx.recv() => {
                        let Some(frame) = frame else { break };
                        if let Err(e) = sink.send(Message::text(frame)).await {
                            debug!(error = %e, "socket write failed");
                            writer_cancel.cancel();
                            break;
                        }
                    }
                }
            }
        }));

        let reader_pending = Arc::clone(&pending);
        let reader_open = Arc::clone(&open);
        let reader_cancel = cancel.clone();
        drop(tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    () = reader_cancel.cancelled() => break,
                    msg = stream.next() => msg,
                };
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        route_frame(text.as_str(), &reader_pending, &pushes).await;
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            reader_open.store(false, Ordering::Release);
            reader_pending.lock().clear();
            reader_cancel.cancel();
            let _ = pushes.send(Push::Closed).await;
        }));

        Ok(Self {
            outbound,
            pending,
            open,
            cancel,
            timeout,
        })
    }
}

async fn route_frame(text: &str, pending: &Pending, pushes: &mpsc::Sender<Push>) {
    let frame = match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "unparseable frame from server");
            return;
        }
    };
    match frame {
        ServerFrame::Response(resp) => {
            let waiter = pending.lock().remove(&resp.id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(resp);
                }
                None => warn!(id = resp.id, "response for unknown or abandoned request"),
            }
        }
        ServerFrame::Event(event) => {
            if let Some(push) = decode_event(event) {
                let _ = pushes.send(push).await;
            }
        }
    }
}

fn decode_event(event: RpcEvent) -> Option<Push> {
    let data = event.data.unwrap_or(Value::Null);
    match event.event_type.as_str() {
        EVENT_CHAT_MESSAGE => serde_json::from_value::<ChatMessageData>(data).ok().map(Push::Chat),
        EVENT_CONNECTION_ESTABLISHED => serde_json::from_value::<ConnectionEstablishedData>(data)
            .ok()
            .map(|d| Push::Established {
                client_id: d.client_id,
            }),
        other => {
            debug!(event_type = other, "ignoring unknown event");
            None
        }
    }
}

#[async_trait]
impl RpcChannel for WsChannel {
    async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        if !self.is_open() {
            return Err(ClientError::NotConnected);
        }
        let id = RequestId::new().into_inner();
        let frame = serde_json::to_string(&RpcRequest::new(id.clone(), method, Some(params)))?;

        let (tx, rx) = oneshot::channel();
        let _ = self.pending.lock().insert(id.clone(), tx);

        let exchange = async {
            self.outbound
                .send(frame)
                .await
                .map_err(|_| ClientError::Closed)?;
            rx.await.map_err(|_| ClientError::Closed)
        };

        let response = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let _ = self.pending.lock().remove(&id);
                return Err(e);
            }
            Err(_elapsed) => {
                let _ = self.pending.lock().remove(&id);
                return Err(ClientError::Timeout {
                    method: method.to_owned(),
                    timeout: self.timeout,
                });
            }
        };

        if response.success {
            Ok(response.result.unwrap_or(Value::Null))
        } else {
            let (code, message) = response
                .error
                .map_or_else(|| ("UNKNOWN".to_owned(), String::new()), |e| (e.code, e.message));
            Err(ClientError::Rpc { code, message })
        }
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.cancel.cancel();
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.cancel.is_cancelled()
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Opens [`WsChannel`]s to a fixed URL.
pub struct WsConnector {
    url: String,
    timeout: Duration,
}

impl WsConnector {
    /// Connector for `url` with a per-call timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    fn target(&self) -> &str {
        &self.url
    }

    async fn connect(&self, pushes: mpsc::Sender<Push>) -> Result<Arc<dyn RpcChannel>, ClientError> {
        let channel = WsChannel::connect(&self.url, self.timeout, pushes).await?;
        Ok(Arc::new(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn decode_chat_event() {
        let event = RpcEvent::new(
            EVENT_CHAT_MESSAGE,
            Some(json!({"text": "[A]: hi", "sequenceIndex": 3})),
        );
        assert_eq!(
            decode_event(event),
            Some(Push::Chat(ChatMessageData {
                text: "[A]: hi".into(),
                sequence_index: 3,
            }))
        );
    }

    #[test]
    fn decode_established_event() {
        let event = RpcEvent::new(EVENT_CONNECTION_ESTABLISHED, Some(json!({"clientId": "conn_1"})));
        assert_eq!(
            decode_event(event),
            Some(Push::Established {
                client_id: "conn_1".into()
            })
        );
    }

    #[test]
    fn decode_unknown_or_malformed_event() {
        assert_eq!(decode_event(RpcEvent::new("chat.typing", None)), None);
        assert_eq!(
            decode_event(RpcEvent::new(EVENT_CHAT_MESSAGE, Some(json!({"text": 1})))),
            None
        );
    }

    #[tokio::test]
    async fn route_response_to_pending_caller() {
        let pending: Pending = Arc::default();
        let (push_tx, _push_rx) = mpsc::channel(4);
        let (tx, rx) = oneshot::channel();
        let _ = pending.lock().insert("req_1".into(), tx);

        route_frame(r#"{"id":"req_1","success":true,"result":{"pong":true}}"#, &pending, &push_tx).await;

        let resp = rx.await.unwrap();
        assert!(resp.success);
        assert!(pending.lock().is_empty());
    }

    #[tokio::test]
    async fn route_event_to_pushes() {
        let pending: Pending = Arc::default();
        let (push_tx, mut push_rx) = mpsc::channel(4);
        let frame = serde_json::to_string(&RpcEvent::new(
            EVENT_CHAT_MESSAGE,
            Some(json!({"text": "[B]: yo", "sequenceIndex": 0})),
        ))
        .unwrap();

        route_frame(&frame, &pending, &push_tx).await;
        assert_matches!(push_rx.recv().await, Some(Push::Chat(data)) if data.text == "[B]: yo");
    }

    #[tokio::test]
    async fn stale_response_is_dropped() {
        let pending: Pending = Arc::default();
        let (push_tx, mut push_rx) = mpsc::channel(4);
        route_frame(r#"{"id":"req_gone","success":true}"#, &pending, &push_tx).await;
        assert!(push_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn connect_refused_is_connect_error() {
        let (push_tx, _push_rx) = mpsc::channel(4);
        // Port 1 on loopback is reserved and not listening.
        let err = WsChannel::connect("ws://127.0.0.1:1/ws", Duration::from_secs(2), push_tx)
            .await
            .err()
            .unwrap();
        assert_matches!(err, ClientError::Connect { .. });
    }
}
