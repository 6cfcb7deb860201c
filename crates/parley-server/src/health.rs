//! `/health` endpoint body.

use std::time::Duration;

use serde::Serialize;

use crate::limits::ConnectionLimiter;
use crate::service::ChatService;

/// Point-in-time view of the server for `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server answers.
    pub status: &'static str,
    /// Whole seconds since startup.
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Connection cap.
    pub max_connections: usize,
    /// Sessions currently receiving pushes.
    pub registered: usize,
    /// Messages in the log.
    pub messages: usize,
}

impl HealthResponse {
    /// Read the live counters of `chat` and `connections`.
    pub fn snapshot(uptime: Duration, chat: &ChatService, connections: &ConnectionLimiter) -> Self {
        Self {
            status: "ok",
            uptime_secs: uptime.as_secs(),
            connections: connections.active(),
            max_connections: connections.max(),
            registered: chat.registry().len(),
            messages: chat.log().len(),
        }
    }
}
