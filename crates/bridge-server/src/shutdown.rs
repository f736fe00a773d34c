//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use bridge_core::Bridge;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default timeout for graceful shutdown before giving up on tasks.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// What a graceful shutdown did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sessions closed by the shutdown.
    pub sessions_closed: usize,
    /// Whether some tasks were still running at the deadline.
    pub timed_out: bool,
}

/// Coordinates graceful shutdown across all server tasks.
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

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal every listener and background task to stop.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Perform a graceful shutdown.
    ///
    /// 1. Stop admission and close every session, which ends all event
    ///    streams and socket loops
    /// 2. Cancel the shutdown token (listeners and the reaper stop)
    /// 3. Wait up to `timeout` for `handles` to complete
    pub async fn graceful_shutdown(
        &self,
        bridge: &Bridge,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> ShutdownReport {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        let sessions_closed = bridge.shutdown().await;
        self.shutdown();
        info!(
            sessions_closed,
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to complete"
        );

        let drain = futures::future::join_all(handles);
        let timed_out = tokio::time::timeout(timeout, drain).await.is_err();
        if timed_out {
            warn!("shutdown timed out after {timeout:?}, some tasks may still be running");
        }
        ShutdownReport {
            sessions_closed,
            timed_out,
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
    use bridge_core::{BridgeConfig, ClientKind, CommandRegistry, TransportKind};

    fn bridge() -> Bridge {
        Bridge::new(&BridgeConfig::default(), CommandRegistry::with_builtins())
    }

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn token_propagation() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        assert!(!token.is_cancelled());
        coord.shutdown();
        coord.shutdown();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_closes_sessions_and_stops_admission() {
        let coord = ShutdownCoordinator::new();
        let bridge = bridge();
        let _ = bridge
            .open_session("a", ClientKind::Ide, TransportKind::Socket)
            .await
            .unwrap();
        let _ = bridge
            .open_session("b", ClientKind::Cli, TransportKind::Rpc)
            .await
            .unwrap();

        let report = coord.graceful_shutdown(&bridge, Vec::new(), None).await;
        assert_eq!(report.sessions_closed, 2);
        assert!(!report.timed_out);
        assert!(coord.is_shutting_down());
        assert_eq!(bridge.sessions().active_count(), 0);
        assert!(
            bridge
                .open_session("c", ClientKind::Cli, TransportKind::Socket)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn graceful_shutdown_awaits_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });
        let report = coord.graceful_shutdown(&bridge(), vec![handle], None).await;
        assert!(!report.timed_out);
    }

    #[tokio::test]
    async fn graceful_shutdown_times_out() {
        let coord = ShutdownCoordinator::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        let report = coord
            .graceful_shutdown(&bridge(), vec![handle], Some(Duration::from_millis(100)))
            .await;
        assert!(report.timed_out);
        assert!(coord.is_shutting_down());
    }
}
