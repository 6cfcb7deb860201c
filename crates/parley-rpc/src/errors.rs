//! RPC error codes and error type.

use crate::types::{RpcErrorBody, RpcResponse};

// ── Error code constants ────────────────────────────────────────────

/// Invalid or missing parameters, or a frame that is not valid JSON.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Unexpected internal error (including handler timeouts).
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// Method not found in the registry.
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";

/// RPC error type returned by handlers.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Required parameter missing or wrong type.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// Internal server error.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl RpcError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> RpcErrorBody {
        RpcErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
            details: None,
        }
    }
}

impl RpcResponse {
    /// Error response for request `id` carrying `err`'s code and message.
    pub fn from_error(id: impl Into<String>, err: &RpcError) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(err.to_error_body()),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidParams {
            message: err.to_string(),
        }
    }
}
