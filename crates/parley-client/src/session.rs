//! Client-side chat session.
//!
//! `ChatSession` owns the connection, the catch-up cursor and the connection
//! state. It never touches the terminal; everything the user should see is
//! emitted as a [`SessionEvent`].
//!
//! The cursor doubles as a display filter: a message is shown only when its
//! index moves the cursor forward. A push-only client therefore shows each
//! message once, and a poll after pushes returns nothing new. A reconnect
//! resets the cursor to `-1`, so the replayed history is shown again.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicU64, Ordering};

use parking_lot::Mutex;
use parley_core::Cursor;
use parley_rpc::methods::{
    CHAT_GET_MESSAGES, CHAT_SEND, GetMessagesParams, GetMessagesResult, SendMessageParams,
    SendMessageResult,
};
use parley_settings::ClientSettings;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::ClientError;
use crate::transport::{Connector, Push, RpcChannel};

/// Pushes buffered between the reader task and the session.
const PUSH_CAPACITY: usize = 256;

/// Connection state as seen by the UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No usable channel.
    Disconnected = 0,
    /// A connect attempt is in flight.
    Connecting = 1,
    /// Calls and pushes flow.
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            2 => Self::Connected,
            1 => Self::Connecting,
            _ => Self::Disconnected,
        }
    }
}

/// Something the UI should show.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// A chat line (`[sender]: text`), from a push or a poll.
    Received(String),
    /// The server acknowledged one of our messages.
    Ack(String),
    /// Connected; carries the server-assigned ID once known.
    Connected {
        /// Server-assigned connection identity, if announced.
        client_id: Option<String>,
    },
    /// The connection was lost or closed.
    Disconnected {
        /// Why.
        reason: String,
    },
    /// Progress or diagnostic text.
    Status(String),
}

/// State shared with the push forwarder.
struct Shared {
    cursor: AtomicI64,
    /// Serializes advance-and-emit so lines reach the UI in index order.
    display: Mutex<()>,
    state: AtomicU8,
    generation: AtomicU64,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Show `text` if `index` is past the cursor. Returns whether it was shown.
    fn accept(&self, index: i64, text: String) -> bool {
        let _order = self.display.lock();
        let advanced = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| (cur < index).then_some(index))
            .is_ok();
        if advanced {
            self.emit(SessionEvent::Received(text));
        }
        advanced
    }

    /// Mark the channel of `generation` as lost, unless a newer one replaced it.
    fn lost(&self, generation: u64, reason: &str) {
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        let prev = self.state.swap(ConnectionState::Disconnected as u8, Ordering::AcqRel);
        if ConnectionState::from_u8(prev) != ConnectionState::Disconnected {
            warn!(reason, "connection lost");
            self.emit(SessionEvent::Disconnected {
                reason: reason.to_owned(),
            });
        }
    }
}

/// A user's chat session against one server.
pub struct ChatSession {
    name: String,
    connector: Arc<dyn Connector>,
    settings: ClientSettings,
    channel: Mutex<Option<Arc<dyn RpcChannel>>>,
    shared: Arc<Shared>,
}

impl ChatSession {
    /// Create a disconnected session. The receiver yields everything the UI
    /// should display.
    pub fn new(
        name: impl Into<String>,
        connector: Arc<dyn Connector>,
        settings: ClientSettings,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            name: name.into(),
            connector,
            settings,
            channel: Mutex::new(None),
            shared: Arc::new(Shared {
                cursor: AtomicI64::new(Cursor::NONE.value()),
                display: Mutex::new(()),
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
                generation: AtomicU64::new(0),
                events,
            }),
        });
        (session, rx)
    }

    /// Display name used as `sender`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Client settings in effect.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Last index shown to the user.
    pub fn cursor(&self) -> Cursor {
        Cursor::from(self.shared.cursor.load(Ordering::Acquire))
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Emit an event to the UI.
    pub fn notify(&self, event: SessionEvent) {
        self.shared.emit(event);
    }

    /// Whether calls can be made.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Open a new channel, replacing any existing one.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.shared.set_state(ConnectionState::Connecting);
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let (push_tx, push_rx) = mpsc::channel(PUSH_CAPACITY);
        let channel = match self.connector.connect(push_tx).await {
            Ok(channel) => channel,
            Err(e) => {
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        if let Some(old) = self.channel.lock().replace(channel) {
            old.close();
        }
        self.shared.set_state(ConnectionState::Connected);
        drop(tokio::spawn(forward_pushes(Arc::clone(&self.shared), generation, push_rx)));

        info!(target = self.connector.target(), "connected");
        Ok(())
    }

    /// Connect, retrying up to the configured budget with the configured
    /// delay between attempts.
    pub async fn connect_with_retry(&self) -> Result<(), ClientError> {
        let attempts = self.settings.connect_retries.max(1);
        for attempt in 1..=attempts {
            self.shared.emit(SessionEvent::Status(format!(
                "Connecting to {} (attempt {attempt}/{attempts})",
                self.connector.target()
            )));
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, error = %e, "connect attempt failed");
                    self.shared.emit(SessionEvent::Status(format!("Connection failed: {e}")));
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_delay()).await;
                    }
                }
            }
        }
        self.shared.emit(SessionEvent::Status("Could not connect to server".into()));
        Err(ClientError::RetriesExhausted { attempts })
    }

    /// Submit a chat message. Returns the server's acknowledgment.
    pub async fn submit(&self, text: &str) -> Result<String, ClientError> {
        let params = serde_json::to_value(SendMessageParams {
            sender: self.name.clone(),
            text: text.to_owned(),
        })?;
        let result = self.call(CHAT_SEND, params).await?;
        let result: SendMessageResult = serde_json::from_value(result)?;
        debug!(sequence_index = result.sequence_index, "message acknowledged");
        self.shared.emit(SessionEvent::Ack(result.ack.clone()));
        Ok(result.ack)
    }

    /// Fetch messages after the cursor and show the new ones. Returns how
    /// many were shown.
    pub async fn poll_once(&self) -> Result<usize, ClientError> {
        let params = serde_json::to_value(GetMessagesParams {
            last_index: self.cursor(),
        })?;
        let result = self.call(CHAT_GET_MESSAGES, params).await?;
        let result: GetMessagesResult = serde_json::from_value(result)?;
        Ok(self.apply(result))
    }

    fn apply(&self, result: GetMessagesResult) -> usize {
        if result.resync {
            info!(new_last_index = %result.new_last_index, "server log is behind our cursor, resyncing");
            self.shared.emit(SessionEvent::Status("Server history reset, resyncing".into()));
            self.shared.cursor.store(Cursor::NONE.value(), Ordering::Release);
        }
        let count = result.messages.len() as i64;
        let first = result.new_last_index.value() - count + 1;
        result
            .messages
            .into_iter()
            .zip(first..)
            .filter(|(text, index)| self.shared.accept(*index, text.clone()))
            .count()
    }

    /// Drop the current channel, reset the cursor to `-1`, and connect again.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        self.close_channel();
        self.shared.cursor.store(Cursor::NONE.value(), Ordering::Release);
        self.shared.emit(SessionEvent::Status("Reconnecting".into()));
        self.connect().await
    }

    /// Close the channel and mark the session disconnected.
    pub fn close(&self) {
        self.close_channel();
        if self.state() != ConnectionState::Disconnected {
            self.shared.set_state(ConnectionState::Disconnected);
            self.shared.emit(SessionEvent::Disconnected {
                reason: "closed".into(),
            });
        }
    }

    fn close_channel(&self) {
        // Invalidate the old push forwarder before closing its channel.
        let _ = self.shared.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(channel) = self.channel.lock().take() {
            channel.close();
        }
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, ClientError> {
        let channel = self.channel.lock().clone();
        let Some(channel) = channel.filter(|_| self.is_connected()) else {
            return Err(ClientError::NotConnected);
        };
        let generation = self.shared.generation.load(Ordering::Acquire);
        let result = channel.call(method, params).await;
        if let Err(e) = &result {
            if e.is_connection_loss() {
                self.shared.lost(generation, &e.to_string());
            }
        }
        result
    }
}

async fn forward_pushes(shared: Arc<Shared>, generation: u64, mut pushes: mpsc::Receiver<Push>) {
    while let Some(push) = pushes.recv().await {
        if shared.generation.load(Ordering::Acquire) != generation {
            break;
        }
        match push {
            Push::Established { client_id } => {
                debug!(client_id, "connection established");
                shared.emit(SessionEvent::Connected {
                    client_id: Some(client_id),
                });
            }
            Push::Chat(data) => {
                let _ = shared.accept(data.sequence_index as i64, data.text);
            }
            Push::Closed => {
                shared.lost(generation, "server closed the connection");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeConnector, channel_returning, drain, received, refused, settings};
    use crate::transport::MockRpcChannel;
    use assert_matches::assert_matches;
    use parley_rpc::methods::ChatMessageData;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn submit_returns_ack_and_emits_it() {
        let mut mock = MockRpcChannel::new();
        let _ = mock
            .expect_call()
            .withf(|method, params| method == "chat.send" && params["sender"] == "A" && params["text"] == "hi")
            .times(1)
            .returning(|_, _| Ok(json!({"ack": "Message from A received", "sequenceIndex": 0})));
        let connector = FakeConnector::with(vec![Ok(Arc::new(mock))]);
        let (session, mut rx) = ChatSession::new("A", connector, settings());

        session.connect().await.unwrap();
        let ack = session.submit("hi").await.unwrap();
        assert_eq!(ack, "Message from A received");
        assert!(drain(&mut rx).contains(&SessionEvent::Ack(ack)));
    }

    #[tokio::test]
    async fn submit_when_disconnected_fails() {
        let (session, _rx) = ChatSession::new("A", FakeConnector::with(vec![]), settings());
        assert_matches!(session.submit("hi").await, Err(ClientError::NotConnected));
    }

    #[tokio::test]
    async fn failed_submit_marks_disconnected() {
        let mut mock = MockRpcChannel::new();
        let _ = mock.expect_call().returning(|_, _| Err(ClientError::Closed));
        let _ = mock.expect_close().return_const(());
        let connector = FakeConnector::with(vec![Ok(Arc::new(mock))]);
        let (session, mut rx) = ChatSession::new("A", connector, settings());

        session.connect().await.unwrap();
        assert_matches!(session.submit("hi").await, Err(ClientError::Closed));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(
            drain(&mut rx)
                .iter()
                .any(|e| matches!(e, SessionEvent::Disconnected { .. }))
        );
    }

    #[tokio::test]
    async fn rpc_error_keeps_connection() {
        let mut mock = MockRpcChannel::new();
        let _ = mock.expect_call().returning(|_, _| {
            Err(ClientError::Rpc {
                code: "INVALID_PARAMS".into(),
                message: "bad".into(),
            })
        });
        let connector = FakeConnector::with(vec![Ok(Arc::new(mock))]);
        let (session, _rx) = ChatSession::new("A", connector, settings());

        session.connect().await.unwrap();
        assert_matches!(session.submit("hi").await, Err(ClientError::Rpc { .. }));
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn poll_advances_cursor_and_shows_new_messages() {
        let mut mock = MockRpcChannel::new();
        let mut seq = mockall::Sequence::new();
        let _ = mock
            .expect_call()
            .withf(|m, p| m == "chat.getMessages" && p["lastIndex"] == -1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(json!({"messages": ["[A]: hi"], "newLastIndex": 0, "resync": false})));
        let _ = mock
            .expect_call()
            .withf(|m, p| m == "chat.getMessages" && p["lastIndex"] == 0)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(json!({"messages": ["[B]: hello"], "newLastIndex": 1, "resync": false})));
        let connector = FakeConnector::with(vec![Ok(Arc::new(mock))]);
        let (session, mut rx) = ChatSession::new("A", connector, settings());

        session.connect().await.unwrap();
        assert_eq!(session.poll_once().await.unwrap(), 1);
        assert_eq!(session.cursor(), Cursor::at(0));
        assert_eq!(session.poll_once().await.unwrap(), 1);
        assert_eq!(session.cursor(), Cursor::at(1));
        assert_eq!(received(&drain(&mut rx)), vec!["[A]: hi", "[B]: hello"]);
    }

    #[tokio::test]
    async fn poll_on_empty_log_shows_nothing() {
        let connector = FakeConnector::with(vec![Ok(channel_returning(
            json!({"messages": [], "newLastIndex": -1, "resync": false}),
        ))]);
        let (session, _rx) = ChatSession::new("A", connector, settings());
        session.connect().await.unwrap();
        assert_eq!(session.poll_once().await.unwrap(), 0);
        assert!(session.cursor().is_none());
    }

    #[tokio::test]
    async fn pushes_are_shown_once_and_poll_skips_them() {
        let connector = FakeConnector::with(vec![Ok(channel_returning(
            json!({"messages": ["[A]: hi", "[B]: hello"], "newLastIndex": 1, "resync": false}),
        ))]);
        let (session, mut rx) = ChatSession::new("C", Arc::clone(&connector) as _, settings());
        session.connect().await.unwrap();

        let pushes = connector.last_pushes();
        for (i, text) in ["[A]: hi", "[B]: hello"].into_iter().enumerate() {
            pushes
                .send(Push::Chat(ChatMessageData {
                    text: text.into(),
                    sequence_index: i as u64,
                }))
                .await
                .unwrap();
        }
        // Duplicate push of an already-shown index.
        pushes
            .send(Push::Chat(ChatMessageData {
                text: "[A]: hi".into(),
                sequence_index: 0,
            }))
            .await
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while session.cursor() != Cursor::at(1) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(session.poll_once().await.unwrap(), 0);
        tokio::task::yield_now().await;
        assert_eq!(received(&drain(&mut rx)), vec!["[A]: hi", "[B]: hello"]);
    }

    #[tokio::test]
    async fn resync_resets_cursor_and_shows_full_history() {
        let connector = FakeConnector::with(vec![Ok(channel_returning(
            json!({"messages": ["[A]: hi"], "newLastIndex": 0, "resync": true}),
        ))]);
        let (session, mut rx) = ChatSession::new("A", connector, settings());
        session.connect().await.unwrap();
        session.shared.cursor.store(7, Ordering::Release);

        assert_eq!(session.poll_once().await.unwrap(), 1);
        assert_eq!(session.cursor(), Cursor::at(0));
        assert_eq!(received(&drain(&mut rx)), vec!["[A]: hi"]);
    }

    #[tokio::test]
    async fn reconnect_resets_cursor_and_duplicates_history() {
        let history = json!({"messages": ["[A]: a", "[A]: b", "[A]: c", "[A]: d"], "newLastIndex": 3, "resync": false});
        let connector = FakeConnector::with(vec![
            Ok(channel_returning(history.clone())),
            Ok(channel_returning(history)),
        ]);
        let (session, mut rx) = ChatSession::new("A", connector, settings());

        session.connect().await.unwrap();
        assert_eq!(session.poll_once().await.unwrap(), 4);
        assert_eq!(session.cursor(), Cursor::at(3));

        session.reconnect().await.unwrap();
        assert!(session.cursor().is_none());
        assert_eq!(session.poll_once().await.unwrap(), 4);
        assert_eq!(received(&drain(&mut rx)).len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_with_retry_succeeds_on_later_attempt() {
        let connector = FakeConnector::with(vec![
            Err(refused()),
            Ok(channel_returning(Value::Null)),
        ]);
        let (session, mut rx) = ChatSession::new("A", Arc::clone(&connector) as _, settings());

        session.connect_with_retry().await.unwrap();
        assert!(session.is_connected());
        assert_eq!(connector.attempts(), 2);
        let statuses: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Status(_)))
            .collect();
        assert_eq!(statuses[0], SessionEvent::Status("Connecting to fake (attempt 1/3)".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_with_retry_gives_up_after_budget() {
        let connector = FakeConnector::with(vec![Err(refused()), Err(refused()), Err(refused())]);
        let (session, mut rx) = ChatSession::new("A", Arc::clone(&connector) as _, settings());

        let start = tokio::time::Instant::now();
        assert_matches!(
            session.connect_with_retry().await,
            Err(ClientError::RetriesExhausted { attempts: 3 })
        );
        assert_eq!(connector.attempts(), 3);
        // Two delays between three attempts.
        assert!(start.elapsed() >= std::time::Duration::from_secs(10));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(
            drain(&mut rx).last(),
            Some(&SessionEvent::Status("Could not connect to server".into()))
        );
    }

    #[tokio::test]
    async fn server_close_push_marks_disconnected() {
        let connector = FakeConnector::with(vec![Ok(channel_returning(Value::Null))]);
        let (session, _rx) = ChatSession::new("A", Arc::clone(&connector) as _, settings());
        session.connect().await.unwrap();

        connector.last_pushes().send(Push::Closed).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while session.is_connected() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn close_of_stale_channel_does_not_affect_new_one() {
        let connector = FakeConnector::with(vec![
            Ok(channel_returning(Value::Null)),
            Ok(channel_returning(Value::Null)),
        ]);
        let (session, _rx) = ChatSession::new("A", Arc::clone(&connector) as _, settings());
        session.connect().await.unwrap();
        let old_pushes = connector.last_pushes();

        session.reconnect().await.unwrap();
        let _ = old_pushes.send(Push::Closed).await;
        tokio::task::yield_now().await;
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let connector = FakeConnector::with(vec![Ok(channel_returning(Value::Null))]);
        let (session, mut rx) = ChatSession::new("A", connector, settings());
        session.connect().await.unwrap();

        session.close();
        session.close();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        let disconnects = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Disconnected { .. }))
            .count();
        assert_eq!(disconnects, 1);
    }
}
