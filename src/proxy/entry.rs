//! Per-proxy mutable state: score dynamics, counters, and the probe that
//! drives them.

use crate::store::ProxyRecord;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use url::Url;

const SCORE_MIN: f64 = -5.0;
const SCORE_MAX: f64 = 10.0;
const FRESH_SCORE: f64 = 6.0;
const DECAY_FACTOR: f64 = 0.995;
const SUCCESS_GAIN: f64 = 0.4;
const FAIL_PENALTY: f64 = 0.7;
const FAIL_PENALTY_SOFT_CAP: f64 = 0.35;
const SOFT_CAP_THRESHOLD: u64 = 3;
const DECAY_INTERVAL: ChronoDuration = ChronoDuration::minutes(10);
const DECAY_STEP: f64 = 0.5;

pub(crate) fn clamp(score: f64) -> f64 {
    score.clamp(SCORE_MIN, SCORE_MAX)
}

/// Read-only view of one entry: `{url, alive, last_test}`.
#[derive(Debug, Clone, Serialize)]
pub struct ProxySnapshot {
    pub url: String,
    pub alive: bool,
    pub last_test: DateTime<Utc>,
}

/// Full-stat export of one entry.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyStats {
    pub url: String,
    pub alive: bool,
    pub last_test: DateTime<Utc>,
    pub score: f64,
    pub usage_count: u64,
    pub fail_count: u64,
    pub success_count: u64,
    pub latency_ms: u64,
}

struct Inner {
    alive: bool,
    score: f64,
    usage_count: u64,
    success_count: u64,
    fail_count: u64,
    latency_ms: u64,
    last_test: DateTime<Utc>,
    client: Option<reqwest::Client>,
}

/// One configured upstream HTTP proxy and its mutable state.
///
/// All mutable fields live behind a single `parking_lot::Mutex` (the
/// entry lock `E_i`); `url`, `check_url` and `timeout` are set at
/// construction and never mutate, so readers can inspect them without
/// locking.
pub struct ProxyEntry {
    url: String,
    check_url: String,
    timeout: Duration,
    inner: Mutex<Inner>,
}

fn build_client(url: &str, timeout: Duration) -> Option<reqwest::Client> {
    let proxy = match reqwest::Proxy::all(url) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("failed to build proxy transport for {}: {}", url, e);
            return None;
        }
    };
    match reqwest::Client::builder().proxy(proxy).timeout(timeout).build() {
        Ok(client) => Some(client),
        Err(e) => {
            log::warn!("failed to build http client for {}: {}", url, e);
            None
        }
    }
}

impl ProxyEntry {
    /// Create a fresh entry: `alive=true, score=6.0`, zeroed counters.
    pub fn new(url: String, check_url: String, timeout: Duration) -> Self {
        let client = build_client(&url, timeout);
        Self {
            url,
            check_url,
            timeout,
            inner: Mutex::new(Inner {
                alive: true,
                score: FRESH_SCORE,
                usage_count: 0,
                success_count: 0,
                fail_count: 0,
                latency_ms: 0,
                last_test: Utc::now(),
                client,
            }),
        }
    }

    /// Rehydrate an entry from a persisted record; `check_url`/`timeout`
    /// still come from the current config, never from the store.
    pub fn from_record(record: ProxyRecord, check_url: String, timeout: Duration) -> Self {
        let client = build_client(&record.url, timeout);
        Self {
            url: record.url,
            check_url,
            timeout,
            inner: Mutex::new(Inner {
                alive: record.alive,
                score: record.score,
                usage_count: record.usage_count,
                success_count: record.success_count,
                fail_count: record.fail_count,
                latency_ms: record.latency_ms,
                last_test: record.last_test,
                client,
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_alive(&self) -> bool {
        self.inner.lock().alive
    }

    /// `(alive, score, usage_count)` taken atomically under the entry
    /// lock, for the pool's allocation scan.
    pub(crate) fn selection_key(&self) -> (bool, f64, u64) {
        let inner = self.inner.lock();
        (inner.alive, inner.score, inner.usage_count)
    }

    /// Increment `usage_count` and return the new value. Called by the
    /// pool exactly once per successful `allocate`.
    pub(crate) fn bump_usage(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.usage_count += 1;
        inner.usage_count
    }

    pub fn record_success(&self, latency_ms: u64) {
        let mut inner = self.inner.lock();
        inner.success_count += 1;
        inner.latency_ms = latency_ms;
        inner.score = clamp(inner.score * DECAY_FACTOR + SUCCESS_GAIN);
        inner.alive = true;
        inner.last_test = Utc::now();
    }

    pub fn record_failure(&self, reason: &str) {
        let mut inner = self.inner.lock();
        inner.fail_count += 1;
        let penalty = if inner.fail_count <= SOFT_CAP_THRESHOLD {
            FAIL_PENALTY_SOFT_CAP
        } else {
            FAIL_PENALTY
        };
        inner.score = clamp(inner.score * DECAY_FACTOR - penalty);
        inner.alive = false;
        inner.last_test = Utc::now();
        log::debug!("proxy {} recorded failure: {}", self.url, reason);
    }

    /// Inactivity decay, called once before each probe. A no-op while
    /// `elapsed < 10 minutes`; never updates `last_test`.
    pub fn decay_score(&self) {
        let mut inner = self.inner.lock();
        let elapsed = Utc::now() - inner.last_test;
        if elapsed < DECAY_INTERVAL {
            return;
        }
        let periods = (elapsed.num_seconds() / DECAY_INTERVAL.num_seconds()) as f64;
        inner.score = clamp(inner.score - periods * DECAY_STEP);
    }

    /// Perform a single bounded GET through this proxy's transport.
    /// Always updates `last_test`, one of the outcome counters, `score`
    /// and `alive` before returning; never propagates an error.
    pub async fn probe(&self, timeout: Duration) -> bool {
        let pre_alive = self.is_alive();

        let client = { self.inner.lock().client.clone() };
        let Some(client) = client else {
            self.record_failure("no http client");
            self.log_transition(pre_alive);
            return false;
        };

        let url = match Url::parse(&self.check_url) {
            Ok(url) => url,
            Err(e) => {
                log::warn!(
                    "proxy {}: malformed check_url {}: {}",
                    self.url,
                    self.check_url,
                    e
                );
                self.record_failure("malformed check_url");
                self.log_transition(pre_alive);
                return false;
            }
        };

        let start = Instant::now();
        let outcome = match client.get(url).timeout(timeout).send().await {
            Ok(resp) if resp.status().is_success() => {
                let latency_ms = start.elapsed().as_millis() as u64;
                self.record_success(latency_ms);
                true
            }
            Ok(resp) => {
                log::debug!("proxy {} probe returned status {}", self.url, resp.status());
                self.record_failure("non-2xx status");
                false
            }
            Err(e) => {
                log::debug!("proxy {} probe failed: {}", self.url, e);
                self.record_failure("transport error");
                false
            }
        };

        self.log_transition(pre_alive);
        outcome
    }

    fn log_transition(&self, pre_alive: bool) {
        let post_alive = self.is_alive();
        if pre_alive == post_alive {
            return;
        }
        if post_alive {
            log::info!("proxy {} recovered", self.url);
        } else {
            log::warn!("proxy {} degraded", self.url);
        }
    }

    /// Re-parse `url` and rebuild the transport, discarding pooled
    /// connections.
    pub fn rebuild_transport(&self) {
        let client = build_client(&self.url, self.timeout);
        self.inner.lock().client = client;
    }

    /// Release idle transport connections. Idempotent.
    pub fn close(&self) {
        self.inner.lock().client = None;
    }

    pub fn snapshot(&self) -> ProxySnapshot {
        let inner = self.inner.lock();
        ProxySnapshot {
            url: self.url.clone(),
            alive: inner.alive,
            last_test: inner.last_test,
        }
    }

    pub fn stats(&self) -> ProxyStats {
        let inner = self.inner.lock();
        ProxyStats {
            url: self.url.clone(),
            alive: inner.alive,
            last_test: inner.last_test,
            score: inner.score,
            usage_count: inner.usage_count,
            fail_count: inner.fail_count,
            success_count: inner.success_count,
            latency_ms: inner.latency_ms,
        }
    }
}
