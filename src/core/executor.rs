// src/core/executor.rs

use crate::config::BrokerSettings;
use crate::core::{FallbackPath, HealthTracker, KeySelector};
use crate::error::BrokerError;
use crate::handlers::Outcome;
use crate::metrics;
use crate::models::{Completion, GenerationRequest};
use crate::monitoring::BrokerCounters;
use crate::proxy::Dispatcher;
use crate::storage::{KeyId, KeyRecord};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Attempt budget and backoff applied to one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&BrokerSettings::default())
    }
}

impl From<&BrokerSettings> for RetryPolicy {
    fn from(settings: &BrokerSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_backoff: settings.base_backoff(),
            max_backoff: settings.max_backoff(),
        }
    }
}

impl RetryPolicy {
    /// `base * 2^attempt`, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base_backoff.as_millis()).unwrap_or(u64::MAX);
        let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms).min(self.max_backoff)
    }
}

#[derive(Debug)]
enum State {
    Selecting,
    Dispatching(KeyRecord),
    Exhausted(BrokerError),
}

/// Runs one logical request across the key pool, then the fallback path.
pub struct RequestExecutor {
    selector: KeySelector,
    tracker: HealthTracker,
    dispatcher: Arc<dyn Dispatcher>,
    fallback: Arc<dyn FallbackPath>,
    counters: Arc<BrokerCounters>,
    policy: RetryPolicy,
}

impl RequestExecutor {
    pub fn new(
        selector: KeySelector,
        tracker: HealthTracker,
        dispatcher: Arc<dyn Dispatcher>,
        fallback: Arc<dyn FallbackPath>,
        counters: Arc<BrokerCounters>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            selector,
            tracker,
            dispatcher,
            fallback,
            counters,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn selector(&self) -> &KeySelector {
        &self.selector
    }

    /// Serves `request`, returning a primary completion, a degraded fallback completion,
    /// `FallbackFailed`, or `Cancelled` when `cancel` fires first.
    #[instrument(
        name = "execute",
        skip_all,
        fields(workload_id = workload_id.unwrap_or("-"), strategy = self.selector.strategy_name())
    )]
    pub async fn execute(
        &self,
        request: &GenerationRequest,
        workload_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Completion, BrokerError> {
        let started = Instant::now();
        self.counters.record_request();

        let result = self.run(request, workload_id, cancel).await;

        let label = match &result {
            Ok(completion) if completion.degraded => {
                self.counters.record_degraded();
                "degraded"
            }
            Ok(_) => {
                self.counters.record_success();
                "success"
            }
            Err(BrokerError::Cancelled) => {
                self.counters.record_cancelled();
                "cancelled"
            }
            Err(_) => {
                self.counters.record_failure();
                "failed"
            }
        };
        metrics::record_request(label, started.elapsed());
        metrics::set_available_keys(
            self.selector.available(Instant::now()),
            self.selector.key_count(),
        );
        debug!(result = label, elapsed_ms = started.elapsed().as_millis() as u64, "Request finished");

        result
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        workload_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Completion, BrokerError> {
        let mut tried: HashSet<KeyId> = HashSet::new();
        let mut attempts: u32 = 0;
        let mut pass_had_transient = false;
        let mut previous: Option<KeyId> = None;
        let mut state = State::Selecting;

        loop {
            if cancel.is_cancelled() {
                info!(attempts, "Request cancelled");
                return Err(BrokerError::Cancelled);
            }

            state = match state {
                State::Selecting if attempts >= self.policy.max_retries => {
                    State::Exhausted(BrokerError::ExhaustedRetries { attempts })
                }

                State::Selecting => {
                    match self
                        .selector
                        .pick_excluding(Instant::now(), workload_id, &tried)
                    {
                        Ok(record) => State::Dispatching(record),
                        // Every usable key was tried this pass. Only a pass with a transient
                        // failure earns a revisit, and only after backing off.
                        Err(_) if pass_had_transient && self.selector.available(Instant::now()) > 0 => {
                            let delay = self.policy.backoff(attempts);
                            info!(
                                attempts,
                                delay_ms = delay.as_millis() as u64,
                                "All keys tried, backing off before revisiting"
                            );
                            tokio::select! {
                                biased;
                                _ = cancel.cancelled() => {
                                    info!(attempts, "Request cancelled during backoff");
                                    return Err(BrokerError::Cancelled);
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                            tried.clear();
                            pass_had_transient = false;
                            State::Selecting
                        }
                        Err(err) if tried.is_empty() => State::Exhausted(err),
                        Err(_) => State::Exhausted(BrokerError::ExhaustedKeys { tried: tried.len() }),
                    }
                }

                State::Dispatching(record) => {
                    let id = record.id();
                    if previous.is_some_and(|p| p != id) {
                        self.counters.record_key_switch();
                        metrics::record_key_switch();
                    }
                    previous = Some(id);
                    note(self.tracker.record_dispatch(id, Instant::now()));

                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            info!(key.name = %record.name(), "Request cancelled during dispatch");
                            return Err(BrokerError::Cancelled);
                        }
                        outcome = self.dispatcher.dispatch(record.credential(), request) => outcome,
                    };

                    metrics::record_dispatch(outcome.label());
                    debug!(
                        attempt = attempts + 1,
                        key.name = %record.name(),
                        api_key.preview = %record.masked(),
                        outcome = outcome.label(),
                        "Dispatch classified"
                    );

                    let now = Instant::now();
                    match outcome {
                        Outcome::Success(content) => {
                            note(self.tracker.record_success(id, now));
                            return Ok(Completion::primary(
                                content,
                                self.dispatcher.model_for(request),
                            ));
                        }
                        Outcome::RateLimited => {
                            note(self.tracker.record_rate_limit(id, now));
                            self.counters.record_rate_limit_hit();
                            attempts += 1;
                        }
                        Outcome::TransientError(reason) => {
                            note(self.tracker.record_error(id, false, &reason, now));
                            pass_had_transient = true;
                            attempts += 1;
                        }
                        // Disabled keys leave the pool for good, so this cannot loop.
                        Outcome::FatalError(reason) => {
                            note(self.tracker.record_error(id, true, &reason, now));
                        }
                    }
                    tried.insert(id);
                    State::Selecting
                }

                State::Exhausted(cause) => {
                    return self.fall_back(request, cause, cancel).await;
                }
            };
        }
    }

    async fn fall_back(
        &self,
        request: &GenerationRequest,
        cause: BrokerError,
        cancel: &CancellationToken,
    ) -> Result<Completion, BrokerError> {
        warn!(cause = %cause, "Primary keys exhausted, using fallback path");

        let produced = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BrokerError::Cancelled),
            produced = self.fallback.produce(request) => produced,
        };

        match produced {
            Ok(completion) => {
                metrics::record_fallback(completion.source.as_str());
                Ok(completion)
            }
            Err(e) => {
                error!(cause = %cause, error = %e, "Fallback path failed");
                Err(BrokerError::FallbackFailed {
                    cause: Box::new(cause),
                    message: e.to_string(),
                })
            }
        }
    }
}

/// Health updates only fail for unknown ids, which the selector never hands out.
fn note<T>(result: crate::error::Result<T>) {
    if let Err(e) = result {
        error!(error = %e, "Failed to update key health");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(8000),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff(2), Duration::from_millis(4000));
        assert_eq!(policy.backoff(3), Duration::from_millis(8000));
        assert_eq!(policy.backoff(10), Duration::from_millis(8000));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_millis(8000));
    }

    #[test]
    fn test_zero_base_never_sleeps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::from_millis(8000),
        };
        assert_eq!(policy.backoff(4), Duration::ZERO);
    }
}
