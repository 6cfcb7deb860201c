//! RPC wire-format types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Incoming RPC request from a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    /// Unique request identifier.
    pub id: String,
    /// Method name (e.g. `chat.send`).
    pub method: String,
    /// Optional parameters object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Build a request.
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Outgoing RPC response to a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Echoed request identifier.
    pub id: String,
    /// Whether the call succeeded.
    pub success: bool,
    /// Result payload (present when `success == true`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload (present when `success == false`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

/// Structured error body inside an `RpcResponse`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Machine-readable error code (e.g. `INVALID_PARAMS`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Server-pushed event.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcEvent {
    /// Event type (e.g. `chat.message`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// ISO-8601 timestamp.
    pub timestamp: String,
    /// Event payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponse {
    /// Build a success response.
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error(id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(RpcErrorBody {
                code: code.into(),
                message: message.into(),
                details: None,
            }),
        }
    }
}

impl RpcEvent {
    /// Create a new event with the current UTC timestamp.
    pub fn new(event_type: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            data,
        }
    }
}

/// Any frame a client can receive from the server.
///
/// Responses carry `id`/`success`; events carry `type`. The untagged
/// representation tries `Response` first, so a frame must have both `id` and
/// `success` to be treated as one.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    /// Reply to a request.
    Response(RpcResponse),
    /// Unsolicited push.
    Event(RpcEvent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_roundtrip_with_params() {
        let req = RpcRequest::new("req_1", "chat.send", Some(json!({"sender": "A", "text": "hi"})));
        let json = serde_json::to_string(&req).unwrap();
        let back: RpcRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "req_1");
        assert_eq!(back.method, "chat.send");
        assert_eq!(back.params.unwrap()["text"], "hi");
    }

    #[test]
    fn request_without_params_omits_field() {
        let req = RpcRequest::new("req_2", "system.ping", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("params"));
        let back: RpcRequest = serde_json::from_str(r#"{"id":"x","method":"system.ping"}"#).unwrap();
        assert!(back.params.is_none());
    }

    #[test]
    fn response_success_serde() {
        let resp = RpcResponse::success("req_1", json!({"ack": "ok"}));
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["id"], "req_1");
        assert_eq!(v["success"], true);
        assert!(v["result"].is_object());
        assert!(v.get("error").is_none());
    }

    #[test]
    fn response_error_serde() {
        let resp = RpcResponse::error("req_9", "INVALID_PARAMS", "Missing sender");
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["error"]["code"], "INVALID_PARAMS");
        assert_eq!(v["error"]["message"], "Missing sender");
        assert!(v.get("result").is_none());
        assert!(v["error"].get("details").is_none());
    }

    #[test]
    fn event_uses_type_key_and_millis_timestamp() {
        let event = RpcEvent::new("chat.message", Some(json!({"text": "[A]: hi"})));
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "chat.message");
        let ts = v["timestamp"].as_str().unwrap();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn server_frame_distinguishes_response_and_event() {
        let resp: ServerFrame =
            serde_json::from_str(r#"{"id":"r1","success":true,"result":{"pong":true}}"#).unwrap();
        assert!(matches!(resp, ServerFrame::Response(ref r) if r.id == "r1"));

        let event: ServerFrame = serde_json::from_str(
            r#"{"type":"chat.message","timestamp":"2026-01-01T00:00:00.000Z","data":{"text":"[A]: hi","sequenceIndex":0}}"#,
        )
        .unwrap();
        assert!(matches!(event, ServerFrame::Event(ref e) if e.event_type == "chat.message"));
    }

    #[test]
    fn server_frame_rejects_garbage() {
        assert!(serde_json::from_str::<ServerFrame>(r#"{"hello":1}"#).is_err());
    }
}
