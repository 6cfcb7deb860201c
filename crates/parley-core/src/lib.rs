//! # parley-core
//!
//! Shared domain types for the Parley broadcast chat server.
//!
//! - [`Message`]: an immutable chat line with its position in the log
//! - [`MessageLog`]: the append-only, ordered store every session reads from
//! - [`Cursor`]: a client-held position into the log (`-1` = nothing consumed)
//! - Branded ID newtypes for connections and requests

#![deny(unsafe_code)]

pub mod cursor;
pub mod ids;
pub mod log;
pub mod message;

pub use cursor::Cursor;
pub use ids::{ConnectionId, RequestId};
pub use log::{LogSlice, MessageLog};
pub use message::Message;
