//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default bound on graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Coordinates graceful shutdown across server tasks.
#[derive(Clone, Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, then wait up to `timeout` for `handles`.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        info!(
            task_count = handles.len(),
            timeout_ms = timeout.as_millis(),
            "waiting for tasks to complete"
        );

        let drain = futures::future::join_all(handles);
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, some tasks may still be running");
            return false;
        }
        true
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
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let coord = ShutdownCoordinator::new();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
    }

    #[test]
    fn clones_share_token() {
        let coord = ShutdownCoordinator::new();
        let token = coord.clone().token();
        coord.shutdown();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_awaits_all_tasks() {
        let coord = ShutdownCoordinator::new();
        let t1 = coord.token();
        let t2 = coord.token();
        let handles = vec![
            tokio::spawn(async move { t1.cancelled().await }),
            tokio::spawn(async move { t2.cancelled().await }),
        ];

        assert!(coord.graceful_shutdown(handles, None).await);
        assert!(coord.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_times_out() {
        let coord = ShutdownCoordinator::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });

        let finished = coord
            .graceful_shutdown(vec![handle], Some(Duration::from_millis(100)))
            .await;
        assert!(!finished);
    }
}
