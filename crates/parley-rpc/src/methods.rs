//! Method names, event types, and their typed payloads.

use parley_core::Cursor;
use serde::{Deserialize, Serialize};

/// Submit a chat message for broadcast.
pub const CHAT_SEND: &str = "chat.send";
/// Fetch every message after a cursor.
pub const CHAT_GET_MESSAGES: &str = "chat.getMessages";
/// Liveness probe.
pub const SYSTEM_PING: &str = "system.ping";
/// Server version and counters.
pub const SYSTEM_GET_INFO: &str = "system.getInfo";

/// Pushed for every message the client should display.
pub const EVENT_CHAT_MESSAGE: &str = "chat.message";
/// First frame on a fresh connection.
pub const EVENT_CONNECTION_ESTABLISHED: &str = "connection.established";

/// Params for [`CHAT_SEND`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageParams {
    /// Display name of the submitting client.
    pub sender: String,
    /// Message body.
    pub text: String,
}

/// Result of [`CHAT_SEND`]. Confirms receipt, not delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResult {
    /// `Message from {sender} received`.
    pub ack: String,
    /// Index the message was stored at.
    pub sequence_index: u64,
}

/// Params for [`CHAT_GET_MESSAGES`]. A missing `lastIndex` means `-1`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesParams {
    /// Last index the client has consumed.
    #[serde(default)]
    pub last_index: Cursor,
}

/// Result of [`CHAT_GET_MESSAGES`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesResult {
    /// Formatted messages after the cursor, oldest first.
    pub messages: Vec<String>,
    /// Index of the newest message on the server (`-1` when empty).
    pub new_last_index: Cursor,
    /// The cursor was ahead of the server's log; `messages` is the full
    /// history.
    #[serde(default)]
    pub resync: bool,
}

/// Payload of [`EVENT_CHAT_MESSAGE`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageData {
    /// Formatted message (`[sender]: text`).
    pub text: String,
    /// Index of the message in the log.
    pub sequence_index: u64,
}

/// Payload of [`EVENT_CONNECTION_ESTABLISHED`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEstablishedData {
    /// Server-assigned connection identity.
    pub client_id: String,
}

/// Acknowledgment text returned to a submitter.
pub fn ack_for(sender: &str) -> String {
    format!("Message from {sender} received")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ack_text() {
        assert_eq!(ack_for("A"), "Message from A received");
    }

    #[test]
    fn get_messages_params_default_cursor() {
        let p: GetMessagesParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(p.last_index, Cursor::NONE);
        let p: GetMessagesParams = serde_json::from_value(json!({"lastIndex": 4})).unwrap();
        assert_eq!(p.last_index, Cursor::at(4));
    }

    #[test]
    fn get_messages_result_wire_names() {
        let r = GetMessagesResult {
            messages: vec!["[A]: hi".into()],
            new_last_index: Cursor::at(0),
            resync: false,
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v, json!({"messages": ["[A]: hi"], "newLastIndex": 0, "resync": false}));
    }

    #[test]
    fn send_params_require_both_fields() {
        assert!(serde_json::from_value::<SendMessageParams>(json!({"sender": "A"})).is_err());
        assert!(serde_json::from_value::<SendMessageParams>(json!({"sender": "A", "text": 5})).is_err());
    }

    #[test]
    fn chat_message_data_wire_names() {
        let d = ChatMessageData { text: "[A]: hi".into(), sequence_index: 3 };
        assert_eq!(serde_json::to_value(&d).unwrap(), json!({"text": "[A]: hi", "sequenceIndex": 3}));
    }
}
