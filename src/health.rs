//! Background ticker that drives periodic health-check cycles and
//! persists the resulting state.

use crate::pool::PoolHandle;
use crate::store::{ProxyRecord, StoreAdapter};
use crate::utils::shutdown::ShutdownManager;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Owns the ticker task driving [`PoolHandle::health_check`] at a fixed
/// interval and checkpointing the resulting state to the store.
pub struct HealthManager {
    handle: Option<JoinHandle<()>>,
    stop_tx: broadcast::Sender<()>,
}

impl HealthManager {
    /// Spawn the background loop. Ticks every `interval`, probing with
    /// `probe_timeout`; stops when `shutdown` fires or `stop()` is called.
    pub fn start(
        pool: Arc<dyn PoolHandle>,
        store: Arc<dyn StoreAdapter>,
        interval: Duration,
        probe_timeout: Duration,
        shutdown: &ShutdownManager,
    ) -> Self {
        log::info!("starting background health checks every {:?}", interval);
        let mut shutdown_rx = shutdown.subscribe();
        let (stop_tx, mut stop_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_cycle(pool.as_ref(), store.as_ref(), probe_timeout).await;
                    }
                    _ = shutdown_rx.recv() => {
                        log::info!("stopping background health checks");
                        return;
                    }
                    _ = stop_rx.recv() => {
                        log::info!("stopping background health checks");
                        return;
                    }
                }
            }
        });

        Self {
            handle: Some(handle),
            stop_tx,
        }
    }

    /// Signal the ticker loop to stop and wait for it to exit. An
    /// in-flight probe cycle runs to completion; no new cycle starts.
    /// Idempotent; never leaks the task.
    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    log::warn!("health check task panicked: {}", e);
                }
            }
        }
    }
}

impl Drop for HealthManager {
    fn drop(&mut self) {
        // Best-effort: `stop()` should be called explicitly for a
        // graceful, awaited shutdown. This is a hard-cancel safety net
        // for the case where the handle was never joined.
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run_cycle(pool: &dyn PoolHandle, store: &dyn StoreAdapter, probe_timeout: Duration) {
    let start = Instant::now();
    pool.health_check(probe_timeout).await;

    let stats = pool.snapshots();
    let alive = stats.iter().filter(|s| s.alive).count();
    let total = stats.len();

    let records: Vec<ProxyRecord> = stats
        .into_iter()
        .map(|s| ProxyRecord {
            url: s.url,
            score: s.score,
            alive: s.alive,
            last_test: s.last_test,
            usage_count: s.usage_count,
            fail_count: s.fail_count,
            success_count: s.success_count,
            latency_ms: s.latency_ms,
        })
        .collect();
    store.save_all(&records).await;

    log::info!(
        "health check complete — alive: {}/{}, duration: {:?}",
        alive,
        total,
        start.elapsed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;
    use crate::proxy::ProxyEntry;
    use crate::store::{FixtureStore, Store};
    use crate::utils::shutdown::ShutdownReason;

    #[tokio::test]
    async fn stop_joins_the_ticker_task() {
        let pool: Arc<dyn PoolHandle> = Arc::new(Pool::new(vec![ProxyEntry::new(
            "http://127.0.0.1:8080".to_string(),
            "https://example.com/".to_string(),
            Duration::from_millis(50),
        )]));
        let store: Arc<dyn StoreAdapter> = Arc::new(Store::connect(":memory:").await.unwrap());
        let shutdown = ShutdownManager::new();

        let mut manager = HealthManager::start(
            pool,
            store,
            Duration::from_millis(10),
            Duration::from_millis(50),
            &shutdown,
        );
        manager.stop().await;
        assert!(manager.handle.is_none());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let pool: Arc<dyn PoolHandle> = Arc::new(Pool::new(vec![]));
        let store: Arc<dyn StoreAdapter> = Arc::new(FixtureStore::new());
        let shutdown = ShutdownManager::new();

        let mut manager = HealthManager::start(
            pool,
            store,
            Duration::from_millis(10),
            Duration::from_millis(50),
            &shutdown,
        );
        manager.stop().await;
        manager.stop().await;
    }

    #[tokio::test]
    async fn shutdown_signal_stops_the_loop() {
        let pool: Arc<dyn PoolHandle> = Arc::new(Pool::new(vec![]));
        let store: Arc<dyn StoreAdapter> = Arc::new(FixtureStore::new());
        let shutdown = ShutdownManager::new();

        let manager = HealthManager::start(
            pool,
            store,
            Duration::from_millis(10),
            Duration::from_millis(50),
            &shutdown,
        );
        shutdown.trigger(ShutdownReason::UserInterrupt);
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(manager);
    }
}
