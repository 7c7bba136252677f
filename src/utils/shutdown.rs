//! Graceful shutdown utilities for proxy-pool-manager

use log::{error, info};
use tokio::sync::broadcast;

/// Reason a shutdown was requested.
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    UserInterrupt,
    CriticalError(String),
}

/// Broadcasts a single shutdown signal to every subscriber (the health
/// manager's ticker loop, the API server, any other long-lived task).
#[derive(Debug, Clone)]
pub struct ShutdownManager {
    tx: broadcast::Sender<ShutdownReason>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Subscribe to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.tx.subscribe()
    }

    /// Trigger shutdown; subscribers that have already dropped their
    /// receiver are silently ignored.
    pub fn trigger(&self, reason: ShutdownReason) {
        info!("initiating graceful shutdown: {:?}", reason);
        let _ = self.tx.send(reason);
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for Ctrl+C or SIGTERM, then trigger shutdown.
pub async fn wait_for_signal(manager: ShutdownManager) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => error!("failed to install sigterm handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    manager.trigger(ShutdownReason::UserInterrupt);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_trigger() {
        let manager = ShutdownManager::new();
        let mut rx1 = manager.subscribe();
        let mut rx2 = manager.subscribe();

        manager.trigger(ShutdownReason::UserInterrupt);

        assert!(matches!(
            rx1.recv().await.unwrap(),
            ShutdownReason::UserInterrupt
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            ShutdownReason::UserInterrupt
        ));
    }
}
