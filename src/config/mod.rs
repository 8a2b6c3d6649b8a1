// src/config/mod.rs

pub mod app;
pub mod loader;
pub mod validation;

pub use app::{
    ApiKeyConfig, AppConfig, BrokerSettings, FallbackConfig, SecondaryProviderConfig,
    SelectionStrategy, ServerConfig, UpstreamConfig,
};
pub use loader::{apply_env_overrides, load_config};
pub use validation::ConfigValidator;
