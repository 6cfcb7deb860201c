//! # parley-server
//!
//! Broadcast chat server. Every accepted message is appended to a shared,
//! append-only [`MessageLog`](parley_core::MessageLog) and pushed to every
//! registered client in log order. Late joiners get the whole history
//! replayed on connect; polling clients catch up by cursor.
//!
//! - [`broadcast`]: append-then-fan-out with pruning of failed clients
//! - [`registry`]: live sessions and their per-client delivery watermark
//! - [`lifecycle`]: register and replay on connect, unregister on disconnect
//! - [`catchup`]: `chat.getMessages` cursor reads
//! - [`server`]: Axum router, WebSocket upgrade, `/health`, `/metrics`

#![deny(unsafe_code)]

pub mod broadcast;
pub mod catchup;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod limits;
pub mod metrics;
pub mod notifier;
pub mod registry;
pub mod rpc;
pub mod server;
pub mod service;
pub mod shutdown;
pub mod websocket;

#[cfg(test)]
mod test_support;

pub use config::ServerConfig;
pub use server::ParleyServer;
pub use service::ChatService;
