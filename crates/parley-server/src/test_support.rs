//! Shared test doubles.

use std::sync::Arc;

use parking_lot::Mutex;
use parley_core::Message;

use crate::notifier::{Notifier, PushError};

/// Records every pushed message; optionally starts failing after a number of
/// successful pushes, or fails one log index only.
#[derive(Default)]
pub struct RecordingNotifier {
    pushed: Mutex<Vec<(u64, String)>>,
    fail_after: Option<(usize, PushError)>,
    fail_on: Option<(u64, PushError)>,
}

impl RecordingNotifier {
    /// A fresh notifier behind an `Arc<dyn Notifier>`.
    pub fn arc() -> Arc<dyn Notifier> {
        Arc::new(Self::default())
    }

    /// Accept `n` pushes, then fail every one after with `err`.
    pub fn failing_after(n: usize, err: PushError) -> Self {
        Self {
            fail_after: Some((n, err)),
            ..Self::default()
        }
    }

    /// Fail only the push of log index `index`.
    pub fn failing_on(index: u64, err: PushError) -> Self {
        Self {
            fail_on: Some((index, err)),
            ..Self::default()
        }
    }

    /// Fail every push with `err`.
    pub fn always_failing(err: PushError) -> Self {
        Self::failing_after(0, err)
    }

    /// Indices pushed so far, in push order.
    pub fn indices(&self) -> Vec<u64> {
        self.pushed.lock().iter().map(|(i, _)| *i).collect()
    }

    /// Formatted texts pushed so far, in push order.
    pub fn texts(&self) -> Vec<String> {
        self.pushed.lock().iter().map(|(_, t)| t.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn push(&self, message: &Message) -> Result<(), PushError> {
        let mut pushed = self.pushed.lock();
        if let Some((index, err)) = &self.fail_on {
            if message.sequence_index == *index {
                return Err(err.clone());
            }
        }
        if let Some((limit, err)) = &self.fail_after {
            if pushed.len() >= *limit {
                return Err(err.clone());
            }
        }
        pushed.push((message.sequence_index, message.formatted()));
        Ok(())
    }
}
