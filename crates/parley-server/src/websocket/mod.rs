//! WebSocket connection management, heartbeat, and message dispatch.

pub mod connection;
pub mod handler;
pub mod session;
