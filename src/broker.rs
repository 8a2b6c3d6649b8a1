// src/broker.rs

use crate::{
    config::{ApiKeyConfig, AppConfig, BrokerSettings},
    core::{
        ChainedFallback, FallbackPath, HealthPolicy, HealthTracker, KeySelector, RequestExecutor,
        RetryPolicy,
    },
    error::{AppError, BrokerError, Result},
    models::{Completion, GenerationRequest},
    monitoring::{BrokerCounters, StatsAggregator, StatusReport},
    proxy::{Dispatcher, HttpDispatcher},
    storage::KeyRegistry,
};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One explicitly constructed broker: the key registry plus everything that reads or
/// writes it. Shared by reference; all methods take `&self`.
pub struct Broker {
    registry: Arc<KeyRegistry>,
    tracker: HealthTracker,
    executor: RequestExecutor,
    stats: StatsAggregator,
}

impl Broker {
    pub fn new(
        keys: &[ApiKeyConfig],
        settings: &BrokerSettings,
        dispatcher: Arc<dyn Dispatcher>,
        fallback: Arc<dyn FallbackPath>,
    ) -> Self {
        let registry = Arc::new(KeyRegistry::new(keys));
        let counters = Arc::new(BrokerCounters::default());
        let tracker = HealthTracker::new(registry.clone(), HealthPolicy::from(settings));
        let selector = KeySelector::for_strategy(registry.clone(), settings.strategy);
        let executor = RequestExecutor::new(
            selector,
            tracker.clone(),
            dispatcher,
            fallback,
            counters.clone(),
            RetryPolicy::from(settings),
        );
        let stats = StatsAggregator::new(registry.clone(), counters);

        info!(
            keys = registry.len(),
            strategy = %settings.strategy,
            max_retries = settings.max_retries,
            "Broker initialized"
        );

        Self {
            registry,
            tracker,
            executor,
            stats,
        }
    }

    /// Wires the HTTP dispatcher and configured fallback chain.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let dispatcher = HttpDispatcher::from_upstream(&config.upstream)?;
        let fallback = ChainedFallback::from_config(config)?;
        Ok(Self::new(
            &config.keys,
            &config.broker,
            Arc::new(dispatcher),
            Arc::new(fallback),
        ))
    }

    pub async fn execute(
        &self,
        request: &GenerationRequest,
        workload_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> std::result::Result<Completion, BrokerError> {
        self.executor.execute(request, workload_id, cancel).await
    }

    pub fn snapshot(&self, now: Instant) -> StatusReport {
        self.stats.snapshot(now)
    }

    pub fn available_keys(&self, now: Instant) -> usize {
        self.stats.available_keys(now)
    }

    /// Returns the named key to Active.
    pub fn reset_key(&self, name: &str) -> Result<()> {
        let id = self
            .registry
            .find(name)
            .ok_or_else(|| AppError::KeyNotFound {
                name: name.to_string(),
            })?;
        self.tracker.reset(id)
    }

    pub fn reset_all(&self) -> Result<usize> {
        self.tracker.reset_all()
    }

    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    pub fn health(&self) -> &HealthTracker {
        &self.tracker
    }

    pub fn selector(&self) -> &KeySelector {
        self.executor.selector()
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("keys", &self.registry.len())
            .field("strategy", &self.selector().strategy_name())
            .field("policy", &self.executor.policy())
            .finish()
    }
}
