//! Parses incoming text as `RpcRequest` and routes it through the
//! `MethodRegistry`.

use parley_rpc::errors;
use parley_rpc::types::{RpcRequest, RpcResponse};
use tracing::{debug, instrument, warn};

use crate::rpc::context::RpcContext;
use crate::rpc::registry::MethodRegistry;

/// Result of handling a WebSocket message.
pub struct HandleResult {
    /// Serialized JSON response to send back.
    pub response_json: String,
    /// The RPC method that was called (empty if parse failed).
    pub method: String,
    /// Typed response.
    pub response: RpcResponse,
}

fn encode(response: RpcResponse, method: String) -> HandleResult {
    let json = serde_json::to_string(&response).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize response");
        String::new()
    });
    HandleResult {
        response_json: json,
        method,
        response,
    }
}

/// Handle an incoming WebSocket text message.
#[instrument(skip_all, fields(method))]
pub async fn handle_message(
    message: &str,
    registry: &MethodRegistry,
    ctx: &RpcContext,
) -> HandleResult {
    let request: RpcRequest = match serde_json::from_str(message) {
        Ok(r) => r,
        Err(e) => {
            warn!("invalid JSON received");
            let resp = RpcResponse::error("unknown", errors::INVALID_PARAMS, format!("Invalid JSON: {e}"));
            return encode(resp, String::new());
        }
    };

    let method = request.method.clone();
    let _ = tracing::Span::current().record("method", method.as_str());
    debug!(method, id = %request.id, "dispatching RPC");

    if !registry.has_method(&method) {
        warn!(method, "unknown RPC method");
    }

    let response = registry.dispatch(request, ctx).await;
    encode(response, method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::handlers::register_all;
    use crate::rpc::handlers::test_helpers::make_test_context;

    fn registry() -> MethodRegistry {
        let mut reg = MethodRegistry::new();
        register_all(&mut reg);
        reg
    }

    #[tokio::test]
    async fn valid_request_returns_success() {
        let ctx = make_test_context();
        let r = handle_message(r#"{"id":"r1","method":"system.ping"}"#, &registry(), &ctx).await;
        assert_eq!(r.method, "system.ping");
        assert!(r.response.success);
        let v: serde_json::Value = serde_json::from_str(&r.response_json).unwrap();
        assert_eq!(v["id"], "r1");
        assert_eq!(v["result"]["pong"], true);
    }

    #[tokio::test]
    async fn invalid_json_returns_invalid_params() {
        let ctx = make_test_context();
        let r = handle_message("not json{", &registry(), &ctx).await;
        assert!(r.method.is_empty());
        assert!(!r.response.success);
        assert_eq!(r.response.id, "unknown");
        assert_eq!(r.response.error.as_ref().unwrap().code, "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn unknown_method_returns_not_found() {
        let ctx = make_test_context();
        let r = handle_message(r#"{"id":"r2","method":"chat.shout"}"#, &registry(), &ctx).await;
        assert_eq!(r.method, "chat.shout");
        assert_eq!(r.response.error.as_ref().unwrap().code, "METHOD_NOT_FOUND");
    }

    #[tokio::test]
    async fn send_goes_through_broadcast() {
        let ctx = make_test_context();
        let r = handle_message(
            r#"{"id":"r3","method":"chat.send","params":{"sender":"A","text":"hi"}}"#,
            &registry(),
            &ctx,
        )
        .await;
        assert!(r.response.success);
        assert_eq!(ctx.chat.log().len(), 1);
    }
}
