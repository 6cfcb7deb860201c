//! Registry of connected client sessions.
//!
//! Membership is guarded by one mutex. [`ClientRegistry::snapshot`] copies the
//! member list and releases the lock before returning, so fan-out never holds
//! the registry lock while talking to a client.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use parley_core::{ConnectionId, Cursor, MessageLog};
use tracing::debug;

use crate::notifier::{Notifier, PushError};

/// One registered client.
pub struct ClientSession {
    id: ConnectionId,
    serial: u64,
    joined_at: DateTime<Utc>,
    notifier: Arc<dyn Notifier>,
    /// Highest log index pushed to this client.
    delivered: Mutex<Cursor>,
}

impl ClientSession {
    /// Connection identity.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Registration order within the registry.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// When the session was registered.
    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    /// Highest index pushed so far (`-1` before the first push).
    pub fn delivered(&self) -> Cursor {
        *self.delivered.lock()
    }

    /// Push every message after the delivery watermark up to and including
    /// `upto`, in log order.
    ///
    /// Concurrent callers are serialized on the watermark, so the client sees
    /// a gapless, strictly increasing sequence no matter which broadcast gets
    /// here first. Returns how many messages this call pushed. On error the
    /// watermark stays on the last message that went through.
    pub fn deliver_through(&self, log: &MessageLog, upto: u64) -> Result<usize, PushError> {
        let mut delivered = self.delivered.lock();
        let pending = log.between(*delivered, upto);
        for message in &pending {
            self.notifier.push(message)?;
            *delivered = Cursor::at(message.sequence_index);
        }
        Ok(pending.len())
    }

    /// Push history up to and including `upto`, one message at a time.
    ///
    /// Unlike [`deliver_through`](Self::deliver_through), a failed push does
    /// not stop the run: the watermark moves past the failed index and the
    /// remaining messages still go out. Returns the pushed count and the
    /// indices that failed.
    pub fn replay_through(&self, log: &MessageLog, upto: u64) -> (usize, Vec<(u64, PushError)>) {
        let mut delivered = self.delivered.lock();
        let mut pushed = 0;
        let mut failed = Vec::new();
        for message in log.between(*delivered, upto) {
            match self.notifier.push(&message) {
                Ok(()) => pushed += 1,
                Err(err) => failed.push((message.sequence_index, err)),
            }
            *delivered = Cursor::at(message.sequence_index);
        }
        (pushed, failed)
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("serial", &self.serial)
            .field("joined_at", &self.joined_at)
            .field("delivered", &self.delivered())
            .finish_non_exhaustive()
    }
}

/// Set of active sessions keyed by connection identity.
#[derive(Default)]
pub struct ClientRegistry {
    sessions: Mutex<HashMap<ConnectionId, Arc<ClientSession>>>,
    next_serial: AtomicU64,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client. Re-registering an ID replaces the previous session.
    pub fn register(&self, id: ConnectionId, notifier: Arc<dyn Notifier>) -> Arc<ClientSession> {
        let session = Arc::new(ClientSession {
            id: id.clone(),
            serial: self.next_serial.fetch_add(1, Ordering::Relaxed),
            joined_at: Utc::now(),
            notifier,
            delivered: Mutex::new(Cursor::NONE),
        });
        let total = {
            let mut sessions = self.sessions.lock();
            let _ = sessions.insert(id.clone(), session.clone());
            sessions.len()
        };
        debug!(client_id = %id, total, "client registered");
        session
    }

    /// Remove a client. Returns `false` if it was not registered.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let removed = self.sessions.lock().remove(id).is_some();
        if removed {
            debug!(client_id = %id, "client unregistered");
        }
        removed
    }

    /// Point-in-time copy of all sessions in registration order.
    pub fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        let mut sessions: Vec<Arc<ClientSession>> = self.sessions.lock().values().cloned().collect();
        sessions.sort_by_key(|s| s.serial);
        sessions
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.sessions.lock().contains_key(id)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
