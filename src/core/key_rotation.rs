// src/core/key_rotation.rs

use crate::config::SelectionStrategy;
use crate::error::BrokerError;
use crate::storage::{KeyId, KeyRecord, KeyRegistry, KeyStatus, KeyView};
use crate::utils::workload_slot;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Strategy for choosing a key from a selection snapshot.
pub trait KeyRotationStrategy: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Picks an Active key that is not in `exclude`, or `None` when there is none.
    fn select(
        &self,
        views: &[KeyView],
        workload_id: Option<&str>,
        exclude: &HashSet<KeyId>,
    ) -> Option<KeyId>;
}

/// Least-used Active key first; least recently used on ties, then configuration order.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdaptiveStrategy;

impl KeyRotationStrategy for AdaptiveStrategy {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn select(
        &self,
        views: &[KeyView],
        _workload_id: Option<&str>,
        exclude: &HashSet<KeyId>,
    ) -> Option<KeyId> {
        views
            .iter()
            .filter(|v| v.status == KeyStatus::Active && !exclude.contains(&v.id))
            // `None < Some(_)`: never-used keys count as the least recently used.
            .min_by(|a, b| {
                a.total_requests
                    .cmp(&b.total_requests)
                    .then_with(|| a.last_used_at.cmp(&b.last_used_at))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|v| v.id)
    }
}

/// Sends a workload to its home key while that key is Active, adaptive otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct StickyStrategy;

impl StickyStrategy {
    pub fn home(workload_id: &str, key_count: usize) -> Option<KeyId> {
        workload_slot(workload_id, key_count).map(KeyId)
    }
}

impl KeyRotationStrategy for StickyStrategy {
    fn name(&self) -> &'static str {
        "sticky"
    }

    fn select(
        &self,
        views: &[KeyView],
        workload_id: Option<&str>,
        exclude: &HashSet<KeyId>,
    ) -> Option<KeyId> {
        if let Some(home) = workload_id.and_then(|w| Self::home(w, views.len())) {
            if let Some(view) = views.get(home.0) {
                if view.status == KeyStatus::Active && !exclude.contains(&home) {
                    return Some(home);
                }
                trace!(home = %home, status = %view.status, "Home key unusable, falling back to adaptive");
            }
        }
        AdaptiveStrategy.select(views, workload_id, exclude)
    }
}

/// Chooses the key for each dispatch from a brief snapshot of the registry.
#[derive(Debug)]
pub struct KeySelector {
    registry: Arc<KeyRegistry>,
    strategy: Box<dyn KeyRotationStrategy>,
}

impl KeySelector {
    pub fn new(registry: Arc<KeyRegistry>, strategy: Box<dyn KeyRotationStrategy>) -> Self {
        Self { registry, strategy }
    }

    pub fn for_strategy(registry: Arc<KeyRegistry>, strategy: SelectionStrategy) -> Self {
        match strategy {
            SelectionStrategy::Adaptive => Self::new(registry, Box::new(AdaptiveStrategy)),
            SelectionStrategy::Sticky => Self::new(registry, Box::new(StickyStrategy)),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn key_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of keys Active at `now`, ignoring any exclusion set.
    pub fn available(&self, now: Instant) -> usize {
        self.registry
            .views(now)
            .iter()
            .filter(|v| v.status == KeyStatus::Active)
            .count()
    }

    pub fn pick(&self, now: Instant, workload_id: Option<&str>) -> Result<KeyRecord, BrokerError> {
        self.pick_excluding(now, workload_id, &HashSet::new())
    }

    /// Like [`Self::pick`], skipping keys already tried by the current request.
    pub fn pick_excluding(
        &self,
        now: Instant,
        workload_id: Option<&str>,
        exclude: &HashSet<KeyId>,
    ) -> Result<KeyRecord, BrokerError> {
        let views = self.registry.views(now);

        let Some(id) = self.strategy.select(&views, workload_id, exclude) else {
            warn!(
                strategy = self.strategy.name(),
                total_keys = views.len(),
                excluded = exclude.len(),
                "No active API key available for selection"
            );
            return Err(BrokerError::AllKeysUnavailable);
        };

        let record = self
            .registry
            .record(id)
            .map_err(|_| BrokerError::AllKeysUnavailable)?;

        debug!(
            event = "key_selected",
            key.name = %record.name(),
            api_key.preview = %record.masked(),
            strategy = self.strategy.name(),
            workload_id = workload_id.unwrap_or("-"),
            "API key selected for request"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn view(id: usize, status: KeyStatus, total: u64, last_used: Option<Instant>) -> KeyView {
        KeyView {
            id: KeyId(id),
            status,
            total_requests: total,
            last_used_at: last_used,
        }
    }

    #[test]
    fn test_adaptive_prefers_least_used() {
        let now = Instant::now();
        let views = vec![
            view(0, KeyStatus::Active, 5, Some(now)),
            view(1, KeyStatus::Active, 2, Some(now)),
            view(2, KeyStatus::Active, 3, None),
        ];
        assert_eq!(AdaptiveStrategy.select(&views, None, &HashSet::new()), Some(KeyId(1)));
    }

    #[test]
    fn test_adaptive_breaks_ties_by_least_recently_used() {
        let now = Instant::now();
        let views = vec![
            view(0, KeyStatus::Active, 1, Some(now + Duration::from_secs(2))),
            view(1, KeyStatus::Active, 1, Some(now)),
            view(2, KeyStatus::Active, 1, Some(now + Duration::from_secs(1))),
        ];
        assert_eq!(AdaptiveStrategy.select(&views, None, &HashSet::new()), Some(KeyId(1)));
    }

    #[test]
    fn test_adaptive_skips_inactive_and_excluded() {
        let views = vec![
            view(0, KeyStatus::RateLimited, 0, None),
            view(1, KeyStatus::Disabled, 0, None),
            view(2, KeyStatus::ErrorCooldown, 0, None),
            view(3, KeyStatus::Active, 9, None),
        ];
        assert_eq!(AdaptiveStrategy.select(&views, None, &HashSet::new()), Some(KeyId(3)));

        let exclude: HashSet<_> = [KeyId(3)].into_iter().collect();
        assert_eq!(AdaptiveStrategy.select(&views, None, &exclude), None);
    }

    #[test]
    fn test_sticky_uses_home_then_falls_back() {
        let home = StickyStrategy::home("topic-42", 4).unwrap();
        let mut views: Vec<_> = (0..4).map(|i| view(i, KeyStatus::Active, 0, None)).collect();
        // Make the home key the busiest so adaptive would never choose it.
        views[home.0].total_requests = 100;

        assert_eq!(StickyStrategy.select(&views, Some("topic-42"), &HashSet::new()), Some(home));

        views[home.0].status = KeyStatus::RateLimited;
        let fallback = StickyStrategy.select(&views, Some("topic-42"), &HashSet::new());
        assert!(fallback.is_some());
        assert_ne!(fallback, Some(home));
    }

    #[test]
    fn test_sticky_without_workload_is_adaptive() {
        let views = vec![
            view(0, KeyStatus::Active, 3, None),
            view(1, KeyStatus::Active, 1, None),
        ];
        assert_eq!(StickyStrategy.select(&views, None, &HashSet::new()), Some(KeyId(1)));
    }
}
