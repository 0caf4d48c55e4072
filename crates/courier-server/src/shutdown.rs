//! Shutdown: one token for the listener and every session, plus a
//! tracker so the process can wait for sessions to say goodbye.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{info, warn};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the server-wide cancellation token and the set of live sessions.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Fresh coordinator with no sessions.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// Clone of the token every session and the listener watch.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal everything to stop. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether [`Self::shutdown`] has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register a running session. The session counts as live until the
    /// returned guard is dropped.
    pub fn session_guard(&self) -> TaskTrackerToken {
        self.sessions.token()
    }

    /// Sessions currently holding a guard.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Cancel, then wait up to `timeout` (default 10s) for `handles` and for
    /// every live session to finish its teardown.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        let _ = self.sessions.close();
        info!(
            sessions = self.active_sessions(),
            tasks = handles.len(),
            "draining"
        );

        let drain = async {
            let _ = futures::future::join_all(handles).await;
            self.sessions.wait().await;
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                remaining = self.active_sessions(),
                "shutdown timed out after {timeout:?}"
            );
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_cancels_clones() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        assert!(!coord.is_shutting_down());
        coord.shutdown();
        coord.shutdown();
        assert!(token.is_cancelled());
        assert!(coord.is_shutting_down());
    }

    #[test]
    fn guards_count_sessions() {
        let coord = ShutdownCoordinator::new();
        let a = coord.session_guard();
        let b = coord.session_guard();
        assert_eq!(coord.active_sessions(), 2);
        drop(a);
        assert_eq!(coord.active_sessions(), 1);
        drop(b);
        assert_eq!(coord.active_sessions(), 0);
    }

    #[tokio::test]
    async fn waits_for_session_teardown() {
        let coord = ShutdownCoordinator::new();
        let guard = coord.session_guard();
        let token = coord.token();
        let session = tokio::spawn(async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });

        coord
            .graceful_shutdown(Vec::new(), Some(Duration::from_secs(5)))
            .await;
        assert_eq!(coord.active_sessions(), 0);
        session.await.unwrap();
    }

    #[tokio::test]
    async fn waits_for_handles() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let listener = tokio::spawn(async move { token.cancelled().await });
        coord
            .graceful_shutdown(vec![listener], Some(Duration::from_secs(1)))
            .await;
        assert!(coord.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_session_times_out() {
        let coord = ShutdownCoordinator::new();
        let _stuck = coord.session_guard();
        coord
            .graceful_shutdown(Vec::new(), Some(Duration::from_millis(50)))
            .await;
        assert_eq!(coord.active_sessions(), 1);
    }
}
