//! # parley-rpc
//!
//! The Parley wire protocol: JSON requests, responses, and server-pushed
//! events exchanged over a WebSocket.
//!
//! - [`types`]: request/response/event envelopes
//! - [`errors`]: machine-readable error codes and the handler error type
//! - [`methods`]: method and event names plus typed params/results

#![deny(unsafe_code)]

pub mod errors;
pub mod methods;
pub mod types;

pub use errors::RpcError;
pub use types::{RpcErrorBody, RpcEvent, RpcRequest, RpcResponse, ServerFrame};
