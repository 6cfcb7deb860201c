//! Connect/disconnect handling for client sessions.
//!
//! Each connection moves `Connecting -> Connected -> Disconnected`. Disconnected
//! is terminal; a connection that fails before it connects may go straight
//! there. On connect the session is registered and the whole log is replayed
//! through the normal push path. A historical message that fails to push is
//! logged and skipped; it never aborts the replay or the connection.

use std::sync::Arc;

use metrics::gauge;
use parking_lot::Mutex;
use parley_core::{ConnectionId, MessageLog};
use tracing::{debug, info, warn};

use crate::metrics::SESSIONS_REGISTERED;
use crate::notifier::Notifier;
use crate::registry::ClientRegistry;

/// Where a connection is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is up, not yet registered.
    Connecting,
    /// Registered and receiving pushes.
    Connected,
    /// Gone. Terminal.
    Disconnected,
}

/// Per-connection lifecycle handle.
#[derive(Debug)]
pub struct SessionHandle {
    id: ConnectionId,
    state: Mutex<SessionState>,
}

impl SessionHandle {
    /// Connection identity.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }
}

/// Outcome of [`SessionLifecycle::on_connect`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Registered and history replayed.
    Replayed {
        /// Messages pushed by the replay.
        replayed: usize,
        /// Messages whose push failed and were skipped.
        skipped: usize,
    },
    /// The handle was not in `Connecting` state; nothing happened.
    Ignored,
}

/// Registers, replays, and unregisters sessions.
pub struct SessionLifecycle {
    log: Arc<MessageLog>,
    registry: Arc<ClientRegistry>,
}

impl SessionLifecycle {
    /// Create a lifecycle manager over a shared log and registry.
    pub fn new(log: Arc<MessageLog>, registry: Arc<ClientRegistry>) -> Self {
        Self { log, registry }
    }

    /// Start tracking a new connection in `Connecting` state.
    pub fn begin(&self, id: ConnectionId) -> SessionHandle {
        SessionHandle {
            id,
            state: Mutex::new(SessionState::Connecting),
        }
    }

    /// Register the connection and replay the current log to it in order.
    pub fn on_connect(&self, handle: &SessionHandle, notifier: Arc<dyn Notifier>) -> ReplayOutcome {
        {
            let mut state = handle.state.lock();
            if *state != SessionState::Connecting {
                debug!(client_id = %handle.id, state = ?*state, "on_connect ignored");
                return ReplayOutcome::Ignored;
            }
            *state = SessionState::Connected;
        }

        let session = self.registry.register(handle.id.clone(), notifier);
        gauge!(SESSIONS_REGISTERED).set(self.registry.len() as f64);

        let Ok(last) = u64::try_from(self.log.last_index().value()) else {
            info!(client_id = %handle.id, "client connected, log empty");
            return ReplayOutcome::Replayed { replayed: 0, skipped: 0 };
        };

        let (replayed, failed) = session.replay_through(&self.log, last);
        for (sequence_index, error) in &failed {
            warn!(client_id = %handle.id, sequence_index = *sequence_index, error = %error, "history replay push failed, skipping");
        }
        info!(client_id = %handle.id, replayed, skipped = failed.len(), "client connected, history replayed");
        ReplayOutcome::Replayed {
            replayed,
            skipped: failed.len(),
        }
    }

    /// Unregister the connection. Safe to call any number of times; returns
    /// `true` only for the call that performed the transition.
    pub fn on_disconnect(&self, handle: &SessionHandle) -> bool {
        {
            let mut state = handle.state.lock();
            if *state == SessionState::Disconnected {
                return false;
            }
            *state = SessionState::Disconnected;
        }
        let _ = self.registry.unregister(&handle.id);
        gauge!(SESSIONS_REGISTERED).set(self.registry.len() as f64);
        debug!(client_id = %handle.id, "client disconnected");
        true
    }
}
