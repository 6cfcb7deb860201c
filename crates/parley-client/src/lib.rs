//! # parley-client
//!
//! Chat client for a Parley server.
//!
//! - [`transport`]: JSON-RPC over WebSocket ([`WsChannel`](transport::WsChannel))
//! - [`session`]: [`ChatSession`](session::ChatSession), the client's explicit
//!   state (channel, cursor, connection state) and its event stream
//! - [`tasks`]: the `poller` and `dispatcher` background tasks

#![deny(unsafe_code)]

pub mod errors;
pub mod session;
pub mod tasks;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use errors::ClientError;
pub use session::{ChatSession, ConnectionState, SessionEvent};
pub use tasks::{ClientTasks, Command};
pub use transport::{Connector, RpcChannel, WsChannel, WsConnector};
