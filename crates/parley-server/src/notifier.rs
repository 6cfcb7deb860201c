//! Outbound push seam between the chat core and a client transport.

use parley_core::Message;

/// Why a push to a client did not go through.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    /// The connection's writer is gone.
    #[error("connection closed")]
    Closed,
    /// The connection's outbound queue is full.
    #[error("send queue full")]
    QueueFull,
    /// A previous frame did not reach the socket in time.
    #[error("push timed out")]
    Timeout,
    /// The frame could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl PushError {
    /// Short label used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::QueueFull => "queue_full",
            Self::Timeout => "timeout",
            Self::Encode(_) => "encode",
        }
    }
}

/// Delivers messages to one connected client.
///
/// `push` must not block: implementations enqueue and return. Any error means
/// the client should be dropped from fan-out.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Push one formatted message to the client.
    fn push(&self, message: &Message) -> Result<(), PushError>;
}
