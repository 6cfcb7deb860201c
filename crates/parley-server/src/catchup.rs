//! Cursor-based recovery of missed messages.
//!
//! Polling is the reliability backstop for push: a client that keeps polling
//! sees every message whether or not any push reached it.

use std::sync::Arc;

use metrics::counter;
use parley_core::{Cursor, MessageLog};
use parley_rpc::methods::GetMessagesResult;
use tracing::debug;

use crate::metrics::CATCHUP_POLLS_TOTAL;

/// Serves `get_messages` requests from the shared log.
pub struct CatchUp {
    log: Arc<MessageLog>,
}

impl CatchUp {
    /// Create over a shared log.
    pub fn new(log: Arc<MessageLog>) -> Self {
        Self { log }
    }

    /// Formatted messages after `cursor` and the new cursor to hold.
    ///
    /// A cursor ahead of the log returns the full history with `resync` set.
    pub fn fetch_since(&self, cursor: Cursor) -> GetMessagesResult {
        let slice = self.log.slice_after(cursor);
        counter!(CATCHUP_POLLS_TOTAL, "resync" => if slice.resync { "true" } else { "false" })
            .increment(1);
        debug!(
            %cursor,
            returned = slice.messages.len(),
            new_last_index = %slice.last_index,
            resync = slice.resync,
            "catch-up poll"
        );
        GetMessagesResult {
            messages: slice.formatted(),
            new_last_index: slice.last_index,
            resync: slice.resync,
        }
    }
}
