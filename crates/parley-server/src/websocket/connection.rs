//! Outbound side of one WebSocket client: the frame queue and liveness flags.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use parley_core::Message;
use parley_rpc::methods::{ChatMessageData, EVENT_CHAT_MESSAGE};
use parley_rpc::types::RpcEvent;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::notifier::{Notifier, PushError};

/// Represents a connected WebSocket client.
pub struct ClientConnection {
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<String>,
    /// Whether the client has responded to the last ping.
    is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to full or closed channel.
    dropped_messages: AtomicU64,
    /// A socket write exceeded the push timeout.
    timed_out: AtomicBool,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            tx,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            timed_out: AtomicBool::new(false),
        }
    }

    /// Queue a text frame for the writer task without waiting.
    pub fn enqueue(&self, frame: String) -> Result<(), PushError> {
        if self.timed_out.load(Ordering::Acquire) {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            return Err(PushError::Timeout);
        }
        self.tx.try_send(frame).map_err(|err| {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            match err {
                TrySendError::Full(_) => PushError::QueueFull,
                TrySendError::Closed(_) => PushError::Closed,
            }
        })
    }

    /// Send a text frame. Returns `false` if it could not be queued.
    pub fn send(&self, frame: String) -> bool {
        self.enqueue(frame).is_ok()
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record that a socket write exceeded its deadline. Every later push
    /// fails with [`PushError::Timeout`].
    pub fn mark_timed_out(&self) {
        self.timed_out.store(true, Ordering::Release);
    }

    /// Mark the connection as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }
}

impl Notifier for ClientConnection {
    fn push(&self, message: &Message) -> Result<(), PushError> {
        let data = ChatMessageData {
            text: message.formatted(),
            sequence_index: message.sequence_index,
        };
        let event = serde_json::to_value(data)
            .map(|data| RpcEvent::new(EVENT_CHAT_MESSAGE, Some(data)))
            .and_then(|event| serde_json::to_string(&event))
            .map_err(|e| PushError::Encode(e.to_string()))?;
        self.enqueue(event)
    }
}
