//! Client error types.

use std::time::Duration;

/// Errors surfaced by client-initiated calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The WebSocket handshake failed or timed out.
    #[error("could not connect to {url}: {message}")]
    Connect {
        /// Target URL.
        url: String,
        /// Underlying failure.
        message: String,
    },

    /// Every connect attempt in the retry budget failed.
    #[error("could not connect after {attempts} attempts")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
    },

    /// No channel is open.
    #[error("not connected")]
    NotConnected,

    /// The channel closed before the response arrived.
    #[error("connection closed")]
    Closed,

    /// No response within the request timeout.
    #[error("{method} timed out after {timeout:?}")]
    Timeout {
        /// Method that was called.
        method: String,
        /// Configured timeout.
        timeout: Duration,
    },

    /// The server answered with an error body.
    #[error("{code}: {message}")]
    Rpc {
        /// Error code (e.g. `INVALID_PARAMS`).
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// A response payload did not have the expected shape.
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Whether this error means the connection is gone and should be
    /// re-established. RPC-level errors leave the connection usable.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::RetriesExhausted { .. }
                | Self::NotConnected
                | Self::Closed
                | Self::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}
