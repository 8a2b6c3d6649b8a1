// src/monitoring/mod.rs

pub mod key_health;

pub use key_health::KeyReport;

use crate::storage::KeyRegistry;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Broker-wide request counters, updated lock-free by the executor.
#[derive(Debug, Default)]
pub struct BrokerCounters {
    requests: AtomicU64,
    successes: AtomicU64,
    degraded: AtomicU64,
    failures: AtomicU64,
    cancelled: AtomicU64,
    key_switches: AtomicU64,
    rate_limit_hits: AtomicU64,
}

impl BrokerCounters {
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degraded(&self) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_key_switch(&self) {
        self.key_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_hit(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn totals(&self) -> BrokerTotals {
        BrokerTotals {
            requests: self.requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            key_switches: self.key_switches.load(Ordering::Relaxed),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BrokerTotals {
    pub requests: u64,
    pub successes: u64,
    pub degraded: u64,
    pub failures: u64,
    pub cancelled: u64,
    pub key_switches: u64,
    pub rate_limit_hits: u64,
}

/// Point-in-time view of every key plus the broker totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub total_keys: usize,
    pub available_keys: usize,
    pub totals: BrokerTotals,
    pub keys: Vec<KeyReport>,
}

/// Read-only reporting over the registry. Never mutates key state.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    registry: Arc<KeyRegistry>,
    counters: Arc<BrokerCounters>,
}

impl StatsAggregator {
    pub fn new(registry: Arc<KeyRegistry>, counters: Arc<BrokerCounters>) -> Self {
        Self { registry, counters }
    }

    pub fn snapshot(&self, now: Instant) -> StatusReport {
        let keys: Vec<_> = self
            .registry
            .records()
            .iter()
            .map(|record| KeyReport::from_record(record, now))
            .collect();
        let available_keys = keys.iter().filter(|k| k.available).count();

        StatusReport {
            total_keys: keys.len(),
            available_keys,
            totals: self.counters.totals(),
            keys,
        }
    }

    /// Number of keys Active at `now`.
    pub fn available_keys(&self, now: Instant) -> usize {
        self.registry
            .views(now)
            .iter()
            .filter(|v| v.status == crate::storage::KeyStatus::Active)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKeyConfig;

    #[test]
    fn test_snapshot_is_idempotent() {
        let registry = Arc::new(KeyRegistry::new(&[
            ApiKeyConfig::new("a", "gsk_aaaaaaaa0001"),
            ApiKeyConfig::new("b", "gsk_bbbbbbbb0002"),
        ]));
        let counters = Arc::new(BrokerCounters::default());
        counters.record_request();
        counters.record_success();

        let stats = StatsAggregator::new(registry, counters);
        let now = Instant::now();
        let first = stats.snapshot(now);
        let second = stats.snapshot(now);
        assert_eq!(first, second);
        assert_eq!(first.available_keys, 2);
        assert_eq!(first.totals.requests, 1);
        assert_eq!(stats.available_keys(now), 2);
    }
}
