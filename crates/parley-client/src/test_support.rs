//! Shared test doubles.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_settings::ClientSettings;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::errors::ClientError;
use crate::session::SessionEvent;
use crate::transport::{Connector, MockRpcChannel, Push, RpcChannel};

/// Hands out pre-built channels in order and keeps each push sender.
#[derive(Default)]
pub struct FakeConnector {
    channels: Mutex<VecDeque<Result<Arc<dyn RpcChannel>, ClientError>>>,
    pushes: Mutex<Vec<mpsc::Sender<Push>>>,
    attempts: AtomicUsize,
}

impl FakeConnector {
    pub fn with(channels: Vec<Result<Arc<dyn RpcChannel>, ClientError>>) -> Arc<Self> {
        Arc::new(Self {
            channels: Mutex::new(channels.into()),
            ..Self::default()
        })
    }

    /// Push sender handed to the most recent `connect`.
    pub fn last_pushes(&self) -> mpsc::Sender<Push> {
        self.pushes.lock().last().cloned().unwrap()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    fn target(&self) -> &str {
        "fake"
    }

    async fn connect(&self, pushes: mpsc::Sender<Push>) -> Result<Arc<dyn RpcChannel>, ClientError> {
        let _ = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.pushes.lock().push(pushes);
        self.channels.lock().pop_front().unwrap_or(Err(ClientError::Closed))
    }
}

pub fn refused() -> ClientError {
    ClientError::Connect {
        url: "fake".into(),
        message: "refused".into(),
    }
}

pub fn settings() -> ClientSettings {
    ClientSettings {
        connect_retries: 3,
        retry_delay_ms: 5_000,
        poll_interval_ms: 2_000,
        ..ClientSettings::default()
    }
}

/// A channel whose every call returns `result`.
pub fn channel_returning(result: Value) -> Arc<dyn RpcChannel> {
    let mut mock = MockRpcChannel::new();
    let _ = mock.expect_call().returning(move |_, _| Ok(result.clone()));
    let _ = mock.expect_close().return_const(());
    let _ = mock.expect_is_open().return_const(true);
    Arc::new(mock)
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

pub fn received(events: &[SessionEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Received(t) => Some(t.as_str()),
            _ => None,
        })
        .collect()
}
