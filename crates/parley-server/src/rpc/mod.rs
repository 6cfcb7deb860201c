//! RPC method registry, dispatch context, and handlers.

pub mod context;
pub mod handlers;
pub mod registry;
