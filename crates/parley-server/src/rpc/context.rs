//! RPC dependency-injection context.

use std::sync::Arc;
use std::time::Instant;

use crate::limits::ConnectionLimiter;
use crate::service::ChatService;

/// Shared context passed to every RPC handler.
pub struct RpcContext {
    /// Message log, registry, broadcast, lifecycle, catch-up.
    pub chat: Arc<ChatService>,
    /// Open WebSocket connections.
    pub connections: Arc<ConnectionLimiter>,
    /// When the server started (for uptime calculation).
    pub server_start_time: Instant,
}

impl RpcContext {
    /// Build a context around an existing chat service.
    pub fn new(chat: Arc<ChatService>, connections: Arc<ConnectionLimiter>) -> Self {
        Self {
            chat,
            connections,
            server_start_time: Instant::now(),
        }
    }
}
