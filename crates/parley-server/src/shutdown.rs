//! Server-wide stop signal.
//!
//! One root [`CancellationToken`] is held by the coordinator. The HTTP
//! listener watches the root; every WebSocket session gets its own child
//! token, so a session can end itself without touching the others while a
//! server shutdown still reaches all of them.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long [`ShutdownCoordinator::drain`] waits when no timeout is given.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the root stop signal for the listener and all sessions.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    root: CancellationToken,
}

impl ShutdownCoordinator {
    /// Coordinator with nothing cancelled yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token the listener stops on.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Fresh child token for one session. Cancelling it ends only that
    /// session; a server shutdown cancels it too.
    pub fn session_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Signal every session and the listener to stop. Idempotent.
    pub fn shutdown(&self) {
        if !self.root.is_cancelled() {
            info!("shutdown requested");
        }
        self.root.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Stop everything, then give `tasks` up to `timeout` to finish.
    ///
    /// Returns `false` if some task was still running when time ran out.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();

        let pending = tasks.len();
        match tokio::time::timeout(timeout, futures::future::join_all(tasks)).await {
            Ok(results) => {
                let panicked = results.iter().filter(|r| r.is_err()).count();
                if panicked > 0 {
                    warn!(panicked, "tasks ended abnormally during shutdown");
                }
                info!(tasks = pending, "drained");
                true
            }
            Err(_elapsed) => {
                warn!(tasks = pending, ?timeout, "drain timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_is_idempotent() {
        let coord = ShutdownCoordinator::default();
        assert!(!coord.is_shutting_down());
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
    }

    #[test]
    fn session_tokens_follow_root_but_not_each_other() {
        let coord = ShutdownCoordinator::new();
        let a = coord.session_token();
        let b = coord.session_token();

        a.cancel();
        assert!(!b.is_cancelled());
        assert!(!coord.is_shutting_down());

        coord.shutdown();
        assert!(b.is_cancelled());
    }

    #[tokio::test]
    async fn drain_waits_for_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.session_token();
        let task = tokio::spawn(async move { token.cancelled().await });

        assert!(coord.drain(vec![task], None).await);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_on_stuck_tasks() {
        let coord = ShutdownCoordinator::new();
        let stuck = tokio::spawn(tokio::time::sleep(Duration::from_secs(300)));

        assert!(!coord.drain(vec![stuck], Some(Duration::from_millis(100))).await);
        assert!(coord.is_shutting_down());
    }
}
