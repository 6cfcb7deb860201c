//! Settings types.
//!
//! Every struct uses `#[serde(default)]` so a partial settings file only needs
//! the keys it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    /// Server listener and fan-out settings.
    pub server: ServerSettings,
    /// Chat client settings.
    pub client: ClientSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl ParleySettings {
    /// Reject values that would make the server or client misbehave.
    pub fn validate(&self) -> Result<()> {
        let checks: [(bool, &str); 7] = [
            (self.server.max_connections > 0, "server.maxConnections must be > 0"),
            (self.server.send_queue_capacity > 0, "server.sendQueueCapacity must be > 0"),
            (self.server.push_timeout_ms > 0, "server.pushTimeoutMs must be > 0"),
            (
                self.server.heartbeat_timeout_ms >= self.server.heartbeat_interval_ms,
                "server.heartbeatTimeoutMs must be >= server.heartbeatIntervalMs",
            ),
            (self.client.poll_interval_ms > 0, "client.pollIntervalMs must be > 0"),
            (self.client.request_timeout_ms > 0, "client.requestTimeoutMs must be > 0"),
            (self.client.connect_retries > 0, "client.connectRetries must be > 0"),
        ];
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, message)) => Err(SettingsError::InvalidValue((*message).to_owned())),
            None => Ok(()),
        }
    }
}

/// Server network and fan-out settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// WebSocket/HTTP port.
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Outbound frames buffered per connection before pushes start failing.
    pub send_queue_capacity: usize,
    /// Time allowed for one outbound frame to reach the socket.
    pub push_timeout_ms: u64,
    /// Interval between server Ping frames.
    pub heartbeat_interval_ms: u64,
    /// Close a connection that has not answered a ping for this long.
    pub heartbeat_timeout_ms: u64,
    /// Largest accepted inbound WebSocket message, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 18813,
            max_connections: 256,
            send_queue_capacity: 256,
            push_timeout_ms: 5_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            max_message_size: 64 * 1024,
        }
    }
}

/// Chat client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// WebSocket URL of the server.
    pub server_url: String,
    /// Delay between polls for missed messages.
    pub poll_interval_ms: u64,
    /// Overall timeout for one request.
    pub request_timeout_ms: u64,
    /// Attempts made by the initial connect before giving up.
    pub connect_retries: u32,
    /// Pause between connect attempts.
    pub retry_delay_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:18813/ws".to_string(),
            poll_interval_ms: 2_000,
            request_timeout_ms: 30_000,
            connect_retries: 3,
            retry_delay_ms: 5_000,
        }
    }
}

impl ClientSettings {
    /// [`Self::poll_interval_ms`] as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// [`Self::request_timeout_ms`] as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// [`Self::retry_delay_ms`] as a `Duration`.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level directive (`RUST_LOG` takes precedence).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
