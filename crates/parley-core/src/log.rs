//! Append-only ordered message log.
//!
//! The log is the single source of truth for chat history. Every message gets
//! the next dense index under the write lock, so `log[i].sequence_index == i`
//! holds no matter how many sessions submit concurrently. The log only grows.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use crate::cursor::Cursor;
use crate::message::Message;

/// Result of reading the log after a cursor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogSlice {
    /// Messages after the cursor, ascending by index.
    pub messages: Vec<Arc<Message>>,
    /// Index of the newest message in the log (`-1` when empty).
    pub last_index: Cursor,
    /// The cursor was past the end of the log, so the full history was
    /// returned instead.
    pub resync: bool,
}

impl LogSlice {
    /// Formatted (`[sender]: text`) form of each message, in order.
    pub fn formatted(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.formatted()).collect()
    }
}

/// Shared, append-only message store.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: RwLock<Vec<Arc<Message>>>,
}

impl MessageLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return it with its assigned index.
    pub fn append(&self, sender: impl Into<String>, text: impl Into<String>) -> Arc<Message> {
        let sender = sender.into();
        let text = text.into();
        let mut entries = self.entries.write();
        let message = Arc::new(Message {
            sender,
            text,
            sequence_index: entries.len() as u64,
            received_at: Utc::now(),
        });
        entries.push(message.clone());
        message
    }

    /// Every message with index greater than `cursor`, plus the current last
    /// index.
    ///
    /// A negative cursor returns the whole log. A cursor beyond the newest
    /// index is stale (it was issued against a log that no longer exists, e.g.
    /// before a restart) and also returns the whole log, with
    /// [`LogSlice::resync`] set.
    pub fn slice_after(&self, cursor: Cursor) -> LogSlice {
        let entries = self.entries.read();
        let len = entries.len() as u64;
        let last_index = last_index_of(len);

        let stale = !cursor.is_none() && cursor > last_index;
        let start = if stale { 0 } else { cursor.next_index().min(len) };

        LogSlice {
            messages: entries[start as usize..].to_vec(),
            last_index,
            resync: stale,
        }
    }

    /// Messages with index in `(after, through]`, ascending. Indices beyond the
    /// end of the log are ignored.
    pub fn between(&self, after: Cursor, through: u64) -> Vec<Arc<Message>> {
        let entries = self.entries.read();
        let len = entries.len() as u64;
        let start = after.next_index().min(len);
        let end = through.saturating_add(1).min(len);
        if start >= end {
            return Vec::new();
        }
        entries[start as usize..end as usize].to_vec()
    }

    /// Message at `index`, if it exists.
    pub fn get(&self, index: u64) -> Option<Arc<Message>> {
        let entries = self.entries.read();
        usize::try_from(index).ok().and_then(|i| entries.get(i).cloned())
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the log has no messages.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Index of the newest message, `-1` when empty.
    pub fn last_index(&self) -> Cursor {
        last_index_of(self.entries.read().len() as u64)
    }
}

fn last_index_of(len: u64) -> Cursor {
    match len.checked_sub(1) {
        Some(last) => Cursor::at(last),
        None => Cursor::NONE,
    }
}
