//! The chat core: one log and one registry shared by the broadcast engine,
//! the lifecycle manager, and catch-up.

use std::sync::Arc;

use parley_core::MessageLog;

use crate::broadcast::BroadcastEngine;
use crate::catchup::CatchUp;
use crate::lifecycle::SessionLifecycle;
use crate::registry::ClientRegistry;

/// Shared chat state and the components that operate on it.
pub struct ChatService {
    log: Arc<MessageLog>,
    registry: Arc<ClientRegistry>,
    broadcast: BroadcastEngine,
    lifecycle: SessionLifecycle,
    catchup: CatchUp,
}

impl ChatService {
    /// Fresh service with an empty log and no clients.
    pub fn new() -> Self {
        let log = Arc::new(MessageLog::new());
        let registry = Arc::new(ClientRegistry::new());
        Self {
            broadcast: BroadcastEngine::new(log.clone(), registry.clone()),
            lifecycle: SessionLifecycle::new(log.clone(), registry.clone()),
            catchup: CatchUp::new(log.clone()),
            log,
            registry,
        }
    }

    /// Message log.
    pub fn log(&self) -> &Arc<MessageLog> {
        &self.log
    }

    /// Client registry.
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Broadcast engine.
    pub fn broadcast(&self) -> &BroadcastEngine {
        &self.broadcast
    }

    /// Session lifecycle manager.
    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.lifecycle
    }

    /// Catch-up protocol.
    pub fn catchup(&self) -> &CatchUp {
        &self.catchup
    }
}

impl Default for ChatService {
    fn default() -> Self {
        Self::new()
    }
}
