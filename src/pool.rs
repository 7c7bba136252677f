//! The proxy pool: entry sequence, allocation policy, and health-check
//! fan-out.

use crate::proxy::{ProxyEntry, ProxyStats};
use crate::utils::error::{ProxyError, ProxyResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A live reference to one pool entry, returned by `allocate` and
/// `alive_proxies`. Cheap to clone; all clones refer to the same entry.
pub type ProxyHandle = Arc<ProxyEntry>;

/// Capability set the rest of the core depends on, rather than the
/// concrete [`Pool`] directly — lets a test-double stand in for a live
/// pool in handler/health-manager tests.
#[async_trait]
pub trait PoolHandle: Send + Sync {
    /// Select the best alive entry and bump its `usage_count`.
    fn allocate(&self) -> ProxyResult<ProxyHandle>;

    /// Run one concurrent probe cycle over every entry.
    async fn health_check(&self, timeout: Duration);

    /// Live handles to every currently-alive entry.
    fn alive_proxies(&self) -> Vec<ProxyHandle>;

    /// Full stats for every entry, alive or not.
    fn snapshots(&self) -> Vec<ProxyStats>;

    /// Release every entry's idle transport.
    fn close(&self);
}

/// Owns the entry sequence behind a single pool-wide lock (`P`).
///
/// Mutating the sequence's length or order requires this lock; reading
/// it for a scan takes the lock only long enough to clone the `Arc`
/// handles, then releases it before touching any entry.
pub struct Pool {
    entries: Mutex<Vec<ProxyHandle>>,
}

impl Pool {
    pub fn new(entries: Vec<ProxyEntry>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().map(Arc::new).collect()),
        }
    }
}

#[async_trait]
impl PoolHandle for Pool {
    /// See module docs for the four-step selection policy.
    fn allocate(&self) -> ProxyResult<ProxyHandle> {
        let entries = self.entries.lock();

        let mut best: Option<(usize, f64, u64)> = None;
        for (idx, entry) in entries.iter().enumerate() {
            let (alive, score, usage_count) = entry.selection_key();
            if !alive {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, best_score, best_usage)) => {
                    score > best_score || (score == best_score && usage_count < best_usage)
                }
            };
            if better {
                best = Some((idx, score, usage_count));
            }
        }

        let (idx, ..) = best.ok_or(ProxyError::NoAliveProxies)?;
        let winner = entries[idx].clone();
        winner.bump_usage();
        Ok(winner)
    }

    /// Releases the pool lock before any I/O; waits for every probe to
    /// finish.
    async fn health_check(&self, timeout: Duration) {
        let entries: Vec<ProxyHandle> = { self.entries.lock().clone() };

        let tasks = entries.into_iter().map(|entry| {
            tokio::spawn(async move {
                entry.decay_score();
                let alive = entry.probe(timeout).await;
                log::debug!("health check: {} -> alive={}", entry.url(), alive);
            })
        });

        futures_util::future::join_all(tasks).await;
    }

    fn alive_proxies(&self) -> Vec<ProxyHandle> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.is_alive())
            .cloned()
            .collect()
    }

    fn snapshots(&self) -> Vec<ProxyStats> {
        self.entries.lock().iter().map(|e| e.stats()).collect()
    }

    fn close(&self) {
        for entry in self.entries.lock().iter() {
            entry.close();
        }
    }
}

/// [`PoolHandle`] test-double returning fixed data, with no entries and
/// no real probing. Used by handler/health-manager tests that only need
/// to observe how the caller reacts, not real allocation behavior.
#[cfg(test)]
pub struct FixturePool {
    pub fixed: Vec<ProxyStats>,
}

#[cfg(test)]
impl FixturePool {
    pub fn new(fixed: Vec<ProxyStats>) -> Self {
        Self { fixed }
    }
}

#[cfg(test)]
#[async_trait]
impl PoolHandle for FixturePool {
    fn allocate(&self) -> ProxyResult<ProxyHandle> {
        Err(ProxyError::NoAliveProxies)
    }

    async fn health_check(&self, _timeout: Duration) {}

    fn alive_proxies(&self) -> Vec<ProxyHandle> {
        Vec::new()
    }

    fn snapshots(&self) -> Vec<ProxyStats> {
        self.fixed.clone()
    }

    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn pool_of(urls: &[&str]) -> Pool {
        let entries = urls
            .iter()
            .map(|u| ProxyEntry::new(u.to_string(), "https://example.com/".to_string(), StdDuration::from_secs(2)))
            .collect();
        Pool::new(entries)
    }

    #[test]
    fn allocate_errors_on_empty_pool() {
        let pool = Pool::new(vec![]);
        assert!(matches!(pool.allocate(), Err(ProxyError::NoAliveProxies)));
    }

    #[test]
    fn allocate_skips_dead_entries() {
        let pool = pool_of(&["http://a", "http://b"]);
        {
            let entries = pool.entries.lock();
            entries[0].record_failure("seed dead");
        }
        let winner = pool.allocate().unwrap();
        assert_eq!(winner.url(), "http://b");
    }

    #[test]
    fn allocate_errors_when_all_dead() {
        let pool = pool_of(&["http://a", "http://b"]);
        for e in pool.entries.lock().iter() {
            e.record_failure("seed dead");
        }
        assert!(matches!(pool.allocate(), Err(ProxyError::NoAliveProxies)));
    }

    #[test]
    fn allocate_prefers_max_score() {
        let pool = pool_of(&["http://a", "http://b"]);
        {
            let entries = pool.entries.lock();
            entries[1].record_success(10);
        }
        let winner = pool.allocate().unwrap();
        assert_eq!(winner.url(), "http://b");
    }

    #[test]
    fn allocate_breaks_score_tie_by_min_usage() {
        let pool = pool_of(&["http://a", "http://b"]);
        {
            let entries = pool.entries.lock();
            entries[0].bump_usage();
        }
        let winner = pool.allocate().unwrap();
        assert_eq!(winner.url(), "http://b");
    }

    #[test]
    fn allocate_breaks_full_tie_by_configured_order() {
        let pool = pool_of(&["http://a", "http://b"]);
        let winner = pool.allocate().unwrap();
        assert_eq!(winner.url(), "http://a");
    }

    #[test]
    fn allocate_increments_usage_count_exactly_once() {
        let pool = pool_of(&["http://a"]);
        let winner = pool.allocate().unwrap();
        assert_eq!(winner.stats().usage_count, 1);
    }

    #[test]
    fn alive_proxies_excludes_dead_entries() {
        let pool = pool_of(&["http://a", "http://b"]);
        pool.entries.lock()[0].record_failure("seed dead");
        assert_eq!(pool.alive_proxies().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_allocations_sum_to_call_count() {
        let pool = Arc::new(pool_of(&["http://a", "http://b", "http://c"]));
        let mut handles = Vec::new();
        for _ in 0..100 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.allocate() }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let total: u64 = pool.snapshots().iter().map(|s| s.usage_count).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn fixture_pool_returns_fixed_snapshots() {
        let fixed_stats = pool_of(&["http://a"]).snapshots();
        let fixture = FixturePool::new(fixed_stats.clone());
        assert_eq!(fixture.snapshots().len(), fixed_stats.len());
        assert!(matches!(fixture.allocate(), Err(ProxyError::NoAliveProxies)));
    }
}
