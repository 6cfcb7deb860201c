//! RPC handler modules and registration.

pub mod chat;
pub mod system;

use parley_rpc::errors::RpcError;
use parley_rpc::methods;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::rpc::registry::MethodRegistry;

/// Register all RPC handlers with the registry.
pub fn register_all(registry: &mut MethodRegistry) {
    // System
    registry.register(methods::SYSTEM_PING, system::PingHandler);
    registry.register(methods::SYSTEM_GET_INFO, system::GetInfoHandler);

    // Chat
    registry.register(methods::CHAT_SEND, chat::SendMessageHandler);
    registry.register(methods::CHAT_GET_MESSAGES, chat::GetMessagesHandler);
}

/// Deserialize a required params object.
pub(crate) fn require_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let params = params.ok_or_else(|| RpcError::InvalidParams {
        message: "Missing params".into(),
    })?;
    serde_json::from_value(params).map_err(|e| RpcError::InvalidParams {
        message: format!("Invalid params: {e}"),
    })
}

/// Deserialize an optional params object, falling back to `T::default()`.
pub(crate) fn optional_params<T: DeserializeOwned + Default>(
    params: Option<Value>,
) -> Result<T, RpcError> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(params) => require_params(Some(params)),
    }
}
