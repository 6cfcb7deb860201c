//! A single chat message as stored in the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable chat message.
///
/// `sequence_index` is the message's zero-based position in the
/// [`MessageLog`](crate::MessageLog). It is assigned at append time and never
/// changes or gets reused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Display name supplied by the submitting client.
    pub sender: String,
    /// Message body.
    pub text: String,
    /// Position in the log.
    pub sequence_index: u64,
    /// When the server appended the message.
    pub received_at: DateTime<Utc>,
}

impl Message {
    /// Text form pushed to and polled by clients: `[sender]: text`.
    pub fn formatted(&self) -> String {
        format_line(&self.sender, &self.text)
    }
}

/// Render a sender/text pair in the wire display form.
pub fn format_line(sender: &str, text: &str) -> String {
    format!("[{sender}]: {text}")
}
