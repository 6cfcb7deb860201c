//! Server configuration.

use std::time::Duration;

use parley_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the Parley server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Outbound frames buffered per connection on top of the replayed history.
    pub send_queue_capacity: usize,
    /// Time allowed for one outbound frame to reach the socket, in milliseconds.
    pub push_timeout_ms: u64,
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close a connection after this long without a pong, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let settings = ServerSettings::default();
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ..Self::from(&settings)
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            max_connections: s.max_connections,
            send_queue_capacity: s.send_queue_capacity,
            push_timeout_ms: s.push_timeout_ms,
            heartbeat_interval_ms: s.heartbeat_interval_ms,
            heartbeat_timeout_ms: s.heartbeat_timeout_ms,
            max_message_size: s.max_message_size,
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-connection settings handed to each WebSocket session.
    ///
    /// Zero queue capacity and zero durations are raised to one slot and one
    /// millisecond; the channel and the ping interval cannot be built from zero.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            send_queue_capacity: self.send_queue_capacity.max(1),
            push_timeout: Duration::from_millis(self.push_timeout_ms.max(1)),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms.max(1)),
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms),
        }
    }
}

/// Per-connection knobs.
#[derive(Clone, Copy, Debug)]
pub struct SessionSettings {
    /// Frames buffered beyond the history replay.
    pub send_queue_capacity: usize,
    /// Deadline for a single socket write.
    pub push_timeout: Duration,
    /// Interval between Ping frames.
    pub heartbeat_interval: Duration,
    /// Disconnect after this long without a Pong.
    pub heartbeat_timeout: Duration,
}
