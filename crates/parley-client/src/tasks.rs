//! Background tasks driving a [`ChatSession`].
//!
//! - `poller`: every poll interval, catches up by cursor. While disconnected
//!   it waits one retry delay and reconnects instead.
//! - `dispatcher`: submits whatever the UI sends on the command channel.
//!
//! The two share nothing but the session's atomics and a `CancellationToken`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::session::{ChatSession, SessionEvent};

/// Input from the UI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Submit a chat message.
    Send(String),
    /// Stop both tasks.
    Quit,
}

/// Handles to the running tasks.
pub struct ClientTasks {
    session: Arc<ChatSession>,
    cancel: CancellationToken,
    poller: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl ClientTasks {
    /// Spawn the poller and the dispatcher for `session`.
    pub fn spawn(session: Arc<ChatSession>, commands: mpsc::Receiver<Command>) -> Self {
        let cancel = CancellationToken::new();
        let poller = tokio::spawn(
            run_poller(Arc::clone(&session), cancel.clone()).instrument(info_span!("poller")),
        );
        let dispatcher = tokio::spawn(
            run_dispatcher(Arc::clone(&session), commands, cancel.clone())
                .instrument(info_span!("dispatcher")),
        );
        Self {
            session,
            cancel,
            poller,
            dispatcher,
        }
    }

    /// Token cancelled when either task decides to stop.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel both tasks, wait for them, and close the session.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let (poller, dispatcher) = tokio::join!(self.poller, self.dispatcher);
        if let Err(e) = poller {
            warn!(error = %e, "poller task failed");
        }
        if let Err(e) = dispatcher {
            warn!(error = %e, "dispatcher task failed");
        }
        self.session.close();
        info!("client stopped");
    }
}

async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

async fn run_poller(session: Arc<ChatSession>, cancel: CancellationToken) {
    let settings = session.settings().clone();
    loop {
        if session.is_connected() {
            if !sleep_or_cancel(&cancel, settings.poll_interval()).await {
                break;
            }
            match session.poll_once().await {
                Ok(0) => {}
                Ok(shown) => debug!(shown, "poll caught up"),
                Err(e) => warn!(error = %e, "poll failed"),
            }
        } else {
            if !sleep_or_cancel(&cancel, settings.retry_delay()).await {
                break;
            }
            if let Err(e) = session.reconnect().await {
                warn!(error = %e, "reconnect failed");
            }
        }
    }
}

async fn run_dispatcher(
    session: Arc<ChatSession>,
    mut commands: mpsc::Receiver<Command>,
    cancel: CancellationToken,
) {
    loop {
        let command = tokio::select! {
            () = cancel.cancelled() => break,
            command = commands.recv() => command,
        };
        match command {
            Some(Command::Send(text)) => {
                if let Err(e) = session.submit(&text).await {
                    warn!(error = %e, "submit failed");
                    // Connection loss already emitted `Disconnected`; the
                    // poller reconnects on its next turn.
                    if !e.is_connection_loss() {
                        session.notify(SessionEvent::Status(format!("Error: {e}")));
                    }
                }
            }
            Some(Command::Quit) | None => {
                cancel.cancel();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectionState;
    use crate::test_support::{FakeConnector, channel_returning, drain, received, settings};
    use crate::transport::{MockRpcChannel, RpcChannel};
    use serde_json::json;

    fn chat_channel() -> Arc<dyn RpcChannel> {
        let mut mock = MockRpcChannel::new();
        let _ = mock
            .expect_call()
            .withf(|method, _| method == "chat.send")
            .returning(|_, _| Ok(json!({"ack": "Message from A received", "sequenceIndex": 0})));
        let _ = mock
            .expect_call()
            .withf(|method, _| method == "chat.getMessages")
            .returning(|_, _| Ok(json!({"messages": [], "newLastIndex": -1, "resync": false})));
        let _ = mock.expect_close().return_const(());
        Arc::new(mock)
    }

    #[tokio::test(start_paused = true)]
    async fn dispatcher_submits_and_quit_stops_both_tasks() {
        let connector = FakeConnector::with(vec![Ok(chat_channel())]);
        let (session, mut rx) = ChatSession::new("A", connector, settings());
        session.connect().await.unwrap();

        let (tx, commands) = mpsc::channel(8);
        let tasks = ClientTasks::spawn(Arc::clone(&session), commands);
        let token = tasks.token();

        tx.send(Command::Send("hi".into())).await.unwrap();
        tx.send(Command::Quit).await.unwrap();
        token.cancelled().await;
        tasks.shutdown().await;

        let events = drain(&mut rx);
        assert!(events.contains(&SessionEvent::Ack("Message from A received".into())));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_shows_messages_after_one_interval() {
        let connector = FakeConnector::with(vec![Ok(channel_returning(
            json!({"messages": ["[B]: hello"], "newLastIndex": 0, "resync": false}),
        ))]);
        let (session, mut rx) = ChatSession::new("A", connector, settings());
        session.connect().await.unwrap();

        let (_tx, commands) = mpsc::channel(8);
        let tasks = ClientTasks::spawn(Arc::clone(&session), commands);

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        tasks.shutdown().await;

        assert_eq!(received(&drain(&mut rx)), vec!["[B]: hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_reconnects_when_disconnected() {
        let connector = FakeConnector::with(vec![Ok(channel_returning(
            json!({"messages": [], "newLastIndex": -1, "resync": false}),
        ))]);
        let (session, _rx) = ChatSession::new("A", Arc::clone(&connector) as _, settings());
        assert!(!session.is_connected());

        let (_tx, commands) = mpsc::channel(8);
        let tasks = ClientTasks::spawn(Arc::clone(&session), commands);

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert!(session.is_connected());
        assert_eq!(connector.attempts(), 1);
        tasks.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_command_channel_stops_tasks() {
        let (session, _rx) = ChatSession::new("A", FakeConnector::with(vec![]), settings());
        let (tx, commands) = mpsc::channel(8);
        let tasks = ClientTasks::spawn(session, commands);
        let token = tasks.token();

        drop(tx);
        token.cancelled().await;
        tasks.shutdown().await;
    }
}
