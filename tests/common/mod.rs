//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use key_broker::{
    config::{ApiKeyConfig, AppConfig, BrokerSettings, SelectionStrategy},
    core::FallbackPath,
    error::{AppError, Result},
    handlers::Outcome,
    proxy::Dispatcher,
    AppState, Broker, Completion, CompletionSource, GenerationRequest,
};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const KEY_NAMES: [&str; 6] = ["key-a", "key-b", "key-c", "key-d", "key-e", "key-f"];

/// Credential used for the key with the given name.
pub fn credential(name: &str) -> String {
    format!("gsk_{name}_secret_0001")
}

pub fn keys(count: usize) -> Vec<ApiKeyConfig> {
    KEY_NAMES
        .iter()
        .take(count)
        .map(|name| ApiKeyConfig::new(*name, credential(name)))
        .collect()
}

/// Broker settings with backoff disabled so retry tests never sleep.
pub fn fast_settings() -> BrokerSettings {
    BrokerSettings {
        base_backoff_ms: 0,
        ..BrokerSettings::default()
    }
}

pub fn sticky_settings() -> BrokerSettings {
    BrokerSettings {
        strategy: SelectionStrategy::Sticky,
        ..fast_settings()
    }
}

/// Dispatcher driven by per-credential scripts. Unscripted calls succeed.
#[derive(Default)]
pub struct ScriptedDispatcher {
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    defaults: Mutex<HashMap<String, Outcome>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues outcomes for the key named `name`, consumed one per call.
    pub fn script(self, name: &str, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.scripts
            .lock()
            .entry(credential(name))
            .or_default()
            .extend(outcomes);
        self
    }

    /// Outcome returned for `name` once its script is used up.
    pub fn always(self, name: &str, outcome: Outcome) -> Self {
        self.defaults.lock().insert(credential(name), outcome);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Key names in dispatch order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|cred| name_for(cred))
            .collect()
    }

    pub fn calls_for(&self, name: &str) -> usize {
        self.calls().iter().filter(|n| n.as_str() == name).count()
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

fn name_for(cred: &str) -> String {
    KEY_NAMES
        .iter()
        .find(|name| credential(name) == cred)
        .map(|name| name.to_string())
        .unwrap_or_else(|| cred.to_string())
}

#[async_trait]
impl Dispatcher for ScriptedDispatcher {
    async fn dispatch(&self, credential: &SecretString, _request: &GenerationRequest) -> Outcome {
        let cred = credential.expose_secret().clone();
        self.calls.lock().push(cred.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .get_mut(&cred)
            .and_then(VecDeque::pop_front);
        scripted
            .or_else(|| self.defaults.lock().get(&cred).cloned())
            .unwrap_or_else(|| Outcome::Success(format!("ok from {}", name_for(&cred))))
    }

    fn model_for(&self, _request: &GenerationRequest) -> String {
        "test-model".to_string()
    }
}

/// Fallback that counts invocations and either answers or fails.
#[derive(Default)]
pub struct RecordingFallback {
    calls: AtomicUsize,
    fail: bool,
}

impl RecordingFallback {
    pub fn answering() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FallbackPath for RecordingFallback {
    async fn produce(&self, _request: &GenerationRequest) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::HttpClient {
                message: "secondary provider returned 500".to_string(),
                status_code: Some(500),
            });
        }
        Ok(Completion::degraded(
            "fallback content",
            "fallback-model",
            CompletionSource::Placeholder,
        ))
    }
}

pub fn broker(
    key_count: usize,
    settings: BrokerSettings,
    dispatcher: Arc<ScriptedDispatcher>,
    fallback: Arc<RecordingFallback>,
) -> Broker {
    Broker::new(&keys(key_count), &settings, dispatcher, fallback)
}

/// Test configuration builder
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_keys(mut self, count: usize) -> Self {
        self.config.keys = keys(count);
        self
    }

    pub fn with_settings(mut self, settings: BrokerSettings) -> Self {
        self.config.broker = settings;
        self
    }

    pub fn with_upstream_url(mut self, url: impl Into<String>) -> Self {
        self.config.upstream.base_url = url.into();
        self
    }

    pub fn with_generate_timeout(mut self, secs: u64) -> Self {
        self.config.server.generate_timeout_secs = secs;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Application state around a scripted broker, for router tests.
pub fn app_state(broker: Broker, config: AppConfig) -> Arc<AppState> {
    Arc::new(AppState::with_broker(config, broker))
}
