//! Client-held position into the message log.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The index of the last message a client has consumed, or `-1` when it has
/// consumed nothing.
///
/// Cursors travel over the wire as plain integers. Values below `-1` are
/// accepted and treated the same as `-1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(i64);

impl Cursor {
    /// Nothing consumed yet.
    pub const NONE: Self = Self(-1);

    /// Cursor positioned on `index`.
    pub fn at(index: u64) -> Self {
        Self(i64::try_from(index).unwrap_or(i64::MAX))
    }

    /// Raw wire value.
    pub fn value(self) -> i64 {
        self.0
    }

    /// Whether the cursor points before the first message.
    pub fn is_none(self) -> bool {
        self.0 < 0
    }

    /// First log index the holder has not seen yet.
    pub fn next_index(self) -> u64 {
        u64::try_from(self.0.saturating_add(1)).unwrap_or(0)
    }

    /// Move forward to `other` if it is further along. Never moves backwards.
    #[must_use]
    pub fn advance_to(self, other: Self) -> Self {
        self.max(other)
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<i64> for Cursor {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
