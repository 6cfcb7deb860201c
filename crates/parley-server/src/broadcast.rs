//! Append-then-fan-out for submitted chat messages.
//!
//! A failed push never aborts delivery to the other clients and never fails
//! the submitter. The failing client is dropped from the registry once the
//! pass is over.

use std::sync::Arc;

use metrics::{counter, gauge};
use parley_core::{ConnectionId, Message, MessageLog};
use parley_rpc::methods::ack_for;
use tracing::{debug, info, warn};

use crate::metrics::{
    BROADCAST_PRUNED_TOTAL, BROADCAST_PUSHES_TOTAL, CHAT_MESSAGES_TOTAL, SESSIONS_REGISTERED,
};
use crate::registry::ClientRegistry;

/// Receipt returned to the submitter. Confirms the message is in the log, not
/// that anyone received it.
#[derive(Clone, Debug)]
pub struct Ack {
    /// `Message from {sender} received`.
    pub text: String,
    /// The stored message.
    pub message: Arc<Message>,
    /// Sessions that accepted the push.
    pub recipients: usize,
    /// Sessions dropped during this broadcast.
    pub pruned: Vec<ConnectionId>,
}

/// Appends messages to the log and pushes them to every registered client.
pub struct BroadcastEngine {
    log: Arc<MessageLog>,
    registry: Arc<ClientRegistry>,
}

impl BroadcastEngine {
    /// Create an engine over a shared log and registry.
    pub fn new(log: Arc<MessageLog>, registry: Arc<ClientRegistry>) -> Self {
        Self { log, registry }
    }

    /// Store `text` from `sender` and fan it out.
    pub fn submit(&self, sender: &str, text: &str) -> Ack {
        let message = self.log.append(sender, text);
        counter!(CHAT_MESSAGES_TOTAL).increment(1);

        let sessions = self.registry.snapshot();
        let mut recipients = 0;
        let mut failed = Vec::new();

        for session in &sessions {
            match session.deliver_through(&self.log, message.sequence_index) {
                Ok(pushed) => {
                    recipients += 1;
                    counter!(BROADCAST_PUSHES_TOTAL).increment(pushed as u64);
                }
                Err(err) => {
                    warn!(client_id = %session.id(), error = %err, "push failed, dropping client");
                    counter!(BROADCAST_PRUNED_TOTAL, "reason" => err.kind()).increment(1);
                    failed.push(session.id().clone());
                }
            }
        }

        let pruned: Vec<ConnectionId> = failed
            .into_iter()
            .filter(|id| self.registry.unregister(id))
            .collect();
        if !pruned.is_empty() {
            gauge!(SESSIONS_REGISTERED).set(self.registry.len() as f64);
            info!(pruned = pruned.len(), "pruned unreachable clients");
        }

        debug!(
            sender,
            sequence_index = message.sequence_index,
            recipients,
            pruned = pruned.len(),
            "message broadcast"
        );

        Ack {
            text: ack_for(sender),
            message,
            recipients,
            pruned,
        }
    }

    /// The log this engine appends to.
    pub fn log(&self) -> &Arc<MessageLog> {
        &self.log
    }

    /// The registry this engine fans out to.
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }
}
