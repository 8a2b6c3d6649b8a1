// src/core/health.rs

use crate::config::BrokerSettings;
use crate::error::Result;
use crate::storage::{KeyId, KeyRegistry, KeyStatus};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Longest failure description kept on a record.
const MAX_ERROR_LEN: usize = 200;

/// Thresholds and cooldown durations applied by [`HealthTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub error_threshold: u32,
    pub error_cooldown: Duration,
    pub rate_limit_cooldown: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self::from(&BrokerSettings::default())
    }
}

impl From<&BrokerSettings> for HealthPolicy {
    fn from(settings: &BrokerSettings) -> Self {
        Self {
            error_threshold: settings.error_threshold,
            error_cooldown: settings.error_cooldown(),
            rate_limit_cooldown: settings.rate_limit_cooldown(),
        }
    }
}

/// The only writer of [`crate::storage::KeyRecord`] state.
///
/// Every method touches exactly one record, under that record's lock, and never
/// performs I/O while holding it.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    registry: Arc<KeyRegistry>,
    policy: HealthPolicy,
}

impl HealthTracker {
    pub fn new(registry: Arc<KeyRegistry>, policy: HealthPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> HealthPolicy {
        self.policy
    }

    /// Counts one upstream attempt against the key.
    pub fn record_dispatch(&self, id: KeyId, now: Instant) -> Result<()> {
        self.registry.update(id, |record| {
            record.total_requests += 1;
            record.last_used_at = Some(now);
        })
    }

    pub fn record_success(&self, id: KeyId, now: Instant) -> Result<()> {
        self.registry.update(id, |record| {
            record.consecutive_errors = 0;
            record.total_successes += 1;
            record.last_used_at = Some(now);
        })
    }

    /// Marks the key rate limited for the configured cooldown. Not counted as a fault.
    pub fn record_rate_limit(&self, id: KeyId, now: Instant) -> Result<KeyStatus> {
        let until = now + self.policy.rate_limit_cooldown;
        let (name, masked) = self.registry.update(id, |record| {
            record.rate_limit_until = Some(until);
            record.rate_limit_hits += 1;
            record.last_error = Some("rate limited by upstream".to_string());
            (record.name.clone(), record.masked.clone())
        })?;

        warn!(
            key.name = %name,
            api_key.preview = %masked,
            cooldown_secs = self.policy.rate_limit_cooldown.as_secs(),
            "API key rate limited"
        );
        Ok(KeyStatus::RateLimited)
    }

    /// Records a failed call. Fatal errors disable the key for the process lifetime;
    /// otherwise reaching the error threshold starts an error cooldown.
    pub fn record_error(
        &self,
        id: KeyId,
        fatal: bool,
        reason: &str,
        now: Instant,
    ) -> Result<KeyStatus> {
        let policy = self.policy;
        let (name, masked, failures, status) = self.registry.update(id, |record| {
            record.consecutive_errors += 1;
            record.total_errors += 1;
            record.last_error = Some(truncate(reason));

            if fatal {
                record.disabled = true;
            } else if record.consecutive_errors >= policy.error_threshold {
                record.cooldown_until = Some(now + policy.error_cooldown);
            }

            (
                record.name.clone(),
                record.masked.clone(),
                record.consecutive_errors,
                record.status(now),
            )
        })?;

        match status {
            KeyStatus::Disabled => warn!(
                key.name = %name,
                api_key.preview = %masked,
                reason = %reason,
                "API key disabled after fatal error"
            ),
            KeyStatus::ErrorCooldown => warn!(
                key.name = %name,
                api_key.preview = %masked,
                failures,
                cooldown_secs = policy.error_cooldown.as_secs(),
                "API key put on error cooldown"
            ),
            _ => info!(
                key.name = %name,
                api_key.preview = %masked,
                failures,
                reason = %reason,
                "API key transient failure recorded"
            ),
        }
        Ok(status)
    }

    /// Derived status at `now`. Never mutates.
    pub fn current_status(&self, id: KeyId, now: Instant) -> Result<KeyStatus> {
        self.registry.read(id, |record| record.status(now))
    }

    /// Returns a key to a clean Active state. Lifetime counters are kept.
    pub fn reset(&self, id: KeyId) -> Result<()> {
        let name = self.registry.update(id, |record| {
            record.disabled = false;
            record.consecutive_errors = 0;
            record.rate_limit_until = None;
            record.cooldown_until = None;
            record.last_error = None;
            record.name.clone()
        })?;
        info!(key.name = %name, "API key state reset");
        Ok(())
    }

    pub fn reset_all(&self) -> Result<usize> {
        let ids: Vec<_> = self.registry.ids().collect();
        for id in &ids {
            self.reset(*id)?;
        }
        Ok(ids.len())
    }
}

fn truncate(reason: &str) -> String {
    reason.chars().take(MAX_ERROR_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKeyConfig;

    fn tracker(threshold: u32) -> (HealthTracker, KeyId) {
        let registry = Arc::new(KeyRegistry::new(&[ApiKeyConfig::new("k", "gsk_key_00000001")]));
        let policy = HealthPolicy {
            error_threshold: threshold,
            error_cooldown: Duration::from_secs(30),
            rate_limit_cooldown: Duration::from_secs(60),
        };
        (HealthTracker::new(registry, policy), KeyId(0))
    }

    #[test]
    fn test_threshold_starts_cooldown_until_deadline() {
        let (tracker, id) = tracker(3);
        let now = Instant::now();

        assert_eq!(tracker.record_error(id, false, "503", now).unwrap(), KeyStatus::Active);
        assert_eq!(tracker.record_error(id, false, "503", now).unwrap(), KeyStatus::Active);
        assert_eq!(
            tracker.record_error(id, false, "503", now).unwrap(),
            KeyStatus::ErrorCooldown
        );

        let later = now + Duration::from_secs(29);
        assert_eq!(tracker.current_status(id, later).unwrap(), KeyStatus::ErrorCooldown);
        let expired = now + Duration::from_secs(30);
        assert_eq!(tracker.current_status(id, expired).unwrap(), KeyStatus::Active);
    }

    #[test]
    fn test_success_resets_consecutive_errors() {
        let (tracker, id) = tracker(3);
        let now = Instant::now();
        tracker.record_error(id, false, "timeout", now).unwrap();
        tracker.record_error(id, false, "timeout", now).unwrap();
        tracker.record_success(id, now).unwrap();

        let record = tracker.registry().record(id).unwrap();
        assert_eq!(record.consecutive_errors(), 0);
        assert_eq!(record.total_errors(), 2);
        assert_eq!(record.total_successes(), 1);

        // Two more errors stay under the threshold again.
        tracker.record_error(id, false, "timeout", now).unwrap();
        assert_eq!(
            tracker.record_error(id, false, "timeout", now).unwrap(),
            KeyStatus::Active
        );
    }

    #[test]
    fn test_rate_limit_is_not_a_fault() {
        let (tracker, id) = tracker(3);
        let now = Instant::now();
        tracker.record_error(id, false, "500", now).unwrap();
        tracker.record_rate_limit(id, now).unwrap();

        let record = tracker.registry().record(id).unwrap();
        assert_eq!(record.consecutive_errors(), 1);
        assert_eq!(record.rate_limit_hits(), 1);
        assert_eq!(record.rate_limit_until(), Some(now + Duration::from_secs(60)));
        assert_eq!(record.status(now), KeyStatus::RateLimited);
        assert_eq!(record.status(now + Duration::from_secs(60)), KeyStatus::Active);
    }

    #[test]
    fn test_fatal_error_disables_permanently() {
        let (tracker, id) = tracker(3);
        let now = Instant::now();
        assert_eq!(
            tracker.record_error(id, true, "invalid api key", now).unwrap(),
            KeyStatus::Disabled
        );
        let far_future = now + Duration::from_secs(86_400);
        assert_eq!(tracker.current_status(id, far_future).unwrap(), KeyStatus::Disabled);

        // A later success does not bring it back either.
        tracker.record_success(id, far_future).unwrap();
        assert_eq!(tracker.current_status(id, far_future).unwrap(), KeyStatus::Disabled);
    }

    #[test]
    fn test_reset_clears_state_but_keeps_counters() {
        let (tracker, id) = tracker(1);
        let now = Instant::now();
        tracker.record_dispatch(id, now).unwrap();
        tracker.record_error(id, true, "401", now).unwrap();
        tracker.reset(id).unwrap();

        let record = tracker.registry().record(id).unwrap();
        assert_eq!(record.status(now), KeyStatus::Active);
        assert_eq!(record.total_requests(), 1);
        assert_eq!(record.total_errors(), 1);
        assert!(record.last_error().is_none());
    }

    #[test]
    fn test_long_reasons_are_truncated() {
        let (tracker, id) = tracker(3);
        let reason = "x".repeat(1_000);
        tracker.record_error(id, false, &reason, Instant::now()).unwrap();
        let record = tracker.registry().record(id).unwrap();
        assert_eq!(record.last_error().unwrap().len(), MAX_ERROR_LEN);
    }
}
