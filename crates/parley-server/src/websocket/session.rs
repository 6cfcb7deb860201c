//! WebSocket session: handles a single connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use parley_core::ConnectionId;
use parley_rpc::methods::{ConnectionEstablishedData, EVENT_CONNECTION_ESTABLISHED};
use parley_rpc::types::RpcEvent;
use tokio::sync::{OwnedSemaphorePermit, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::handler::handle_message;
use crate::config::SessionSettings;
use crate::lifecycle::ReplayOutcome;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::rpc::context::RpcContext;
use crate::rpc::registry::MethodRegistry;

/// How long the writer gets to flush a Close frame after the session ends.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

fn established_frame(client_id: &ConnectionId) -> Option<String> {
    let data = serde_json::to_value(ConnectionEstablishedData {
        client_id: client_id.to_string(),
    })
    .ok()?;
    serde_json::to_string(&RpcEvent::new(EVENT_CONNECTION_ESTABLISHED, Some(data))).ok()
}

/// Write one frame, giving up after `deadline`. A write that times out marks
/// the connection so every later push to it fails. Returns `false` once the
/// writer should stop.
async fn write_frame<S>(sink: &mut S, frame: Message, deadline: Duration, connection: &ClientConnection) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    match tokio::time::timeout(deadline, sink.send(frame)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "socket write failed");
            false
        }
        Err(_elapsed) => {
            warn!(timeout = ?deadline, "socket write timed out, disconnecting");
            connection.mark_timed_out();
            false
        }
    }
}

/// Run a WebSocket session for a connected client.
///
/// 1. Sends a `connection.established` event with the client ID
/// 2. Registers the client and replays the message log to it
/// 3. Dispatches incoming text frames as RPC requests
/// 4. Forwards outbound frames, bounding each socket write by the push timeout
/// 5. Sends periodic Ping frames and disconnects unresponsive clients
/// 6. Unregisters on disconnect or when `session_token` is cancelled
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    client_id: ConnectionId,
    registry: Arc<MethodRegistry>,
    ctx: Arc<RpcContext>,
    settings: SessionSettings,
    session_token: CancellationToken,
    permit: OwnedSemaphorePermit,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let chat = Arc::clone(&ctx.chat);
    let handle = chat.lifecycle().begin(client_id.clone());

    // Room for a full history replay plus the steady-state buffer.
    let capacity = settings.send_queue_capacity + chat.log().len();
    let (send_tx, mut send_rx) = mpsc::channel::<String>(capacity);
    let connection = Arc::new(ClientConnection::new(send_tx));

    let connection_start = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    if let Some(json) = established_frame(&client_id) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    // Outbound forwarder with periodic Ping frames.
    let outbound_conn = Arc::clone(&connection);
    let outbound_token = session_token.clone();
    let mut outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(settings.heartbeat_interval);
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                () = outbound_token.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if !write_frame(&mut ws_tx, Message::Text(text.into()), settings.push_timeout, &outbound_conn).await {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > settings.heartbeat_timeout
                    {
                        warn!("client unresponsive for {:?}, disconnecting", settings.heartbeat_timeout);
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        // Writer gone: stop the reader too.
        outbound_token.cancel();
    });

    match chat.lifecycle().on_connect(&handle, Arc::clone(&connection) as _) {
        ReplayOutcome::Replayed { replayed, skipped } => debug!(replayed, skipped, "history replayed"),
        ReplayOutcome::Ignored => {}
    }

    loop {
        let msg = tokio::select! {
            () = session_token.cancelled() => break,
            msg = ws_rx.next() => msg,
        };
        let Some(Ok(msg)) = msg else { break };

        connection.mark_alive();
        let text = match msg {
            Message::Text(ref t) => Some(t.to_string()),
            Message::Binary(ref data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    Some(s.to_owned())
                } else {
                    info!(len = data.len(), "received non-UTF8 binary frame");
                    None
                }
            }
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => None,
        };

        let Some(text) = text else { continue };

        let result = handle_message(&text, &registry, &ctx).await;
        if !connection.send(result.response_json) {
            info!(method = result.method, "failed to enqueue response (channel full or closed)");
        }
    }

    let _ = chat.lifecycle().on_disconnect(&handle);

    session_token.cancel();
    if tokio::time::timeout(WRITER_DRAIN, &mut outbound).await.is_err() {
        outbound.abort();
    }

    info!(dropped = connection.drop_count(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
    drop(permit);
}
