//! Chat handlers: send and getMessages.

use async_trait::async_trait;
use parley_rpc::errors::RpcError;
use parley_rpc::methods::{GetMessagesParams, SendMessageParams, SendMessageResult};
use serde_json::Value;
use tracing::instrument;

use crate::rpc::context::RpcContext;
use crate::rpc::handlers::{optional_params, require_params};
use crate::rpc::registry::MethodHandler;

/// Appends a message and fans it out. Replies with an acknowledgment of
/// receipt.
pub struct SendMessageHandler;

#[async_trait]
impl MethodHandler for SendMessageHandler {
    #[instrument(skip_all, fields(method = "chat.send"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let params: SendMessageParams = require_params(params)?;
        let ack = ctx.chat.broadcast().submit(&params.sender, &params.text);
        Ok(serde_json::to_value(SendMessageResult {
            ack: ack.text,
            sequence_index: ack.message.sequence_index,
        })?)
    }
}

/// Returns every message after the caller's cursor.
pub struct GetMessagesHandler;

#[async_trait]
impl MethodHandler for GetMessagesHandler {
    #[instrument(skip_all, fields(method = "chat.getMessages"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let params: GetMessagesParams = optional_params(params)?;
        let result = ctx.chat.catchup().fetch_since(params.last_index);
        Ok(serde_json::to_value(result)?)
    }
}
