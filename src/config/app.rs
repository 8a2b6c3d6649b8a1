// src/config/app.rs

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One upstream credential.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiKeyConfig {
    pub name: String,
    pub api_key: SecretString,
}

impl ApiKeyConfig {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: SecretString::new(api_key.into()),
        }
    }
}

/// How the broker chooses a key for a request.
#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SelectionStrategy {
    /// Least-used active key, least-recently-used on ties.
    #[default]
    Adaptive,
    /// A workload id maps to a home key; adaptive when the home key is unusable.
    Sticky,
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adaptive => write!(f, "adaptive"),
            Self::Sticky => write!(f, "sticky"),
        }
    }
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adaptive" => Ok(Self::Adaptive),
            "sticky" => Ok(Self::Sticky),
            other => Err(format!("unknown selection strategy '{other}'")),
        }
    }
}

/// Retry, cooldown and selection tuning.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BrokerSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown_secs: u64,
    #[serde(default = "default_error_cooldown")]
    pub error_cooldown_secs: u64,
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    #[serde(default)]
    pub strategy: SelectionStrategy,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown(),
            error_cooldown_secs: default_error_cooldown(),
            error_threshold: default_error_threshold(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
            strategy: SelectionStrategy::default(),
        }
    }
}

impl BrokerSettings {
    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Primary OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Secondary provider tried by the fallback path.
#[derive(Debug, Deserialize, Clone)]
pub struct SecondaryProviderConfig {
    #[serde(default = "default_secondary_url")]
    pub base_url: String,
    #[serde(default = "default_secondary_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for SecondaryProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_secondary_url(),
            model: default_secondary_model(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FallbackConfig {
    #[serde(default)]
    pub secondary: Option<SecondaryProviderConfig>,
    #[serde(default = "default_true")]
    pub placeholder_enabled: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            secondary: None,
            placeholder_enabled: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for one `/v1/generate` call, fallback included.
    #[serde(default = "default_generate_timeout")]
    pub generate_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            generate_timeout_secs: default_generate_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub keys: Vec<ApiKeyConfig>,
    #[serde(default)]
    pub broker: BrokerSettings,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

impl AppConfig {
    pub fn key_names(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.name.as_str()).collect()
    }
}

// Default value functions
fn default_max_retries() -> u32 {
    3
}

fn default_rate_limit_cooldown() -> u64 {
    60
}

fn default_error_cooldown() -> u64 {
    30
}

fn default_error_threshold() -> u32 {
    3
}

fn default_base_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    8000
}

fn default_upstream_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_secondary_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_secondary_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_generate_timeout() -> u64 {
    120
}
