// src/state.rs

use crate::broker::Broker;
use crate::config::AppConfig;
use crate::error::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Represents the shared application state that is accessible by all Axum handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
    pub config: Arc<AppConfig>,
    /// Cancelled on shutdown; in-flight broker calls derive child tokens from it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        info!("Creating shared AppState: initializing broker and HTTP clients...");
        let broker = Broker::from_config(&config)?;
        Ok(Self::with_broker(config, broker))
    }

    pub fn with_broker(config: AppConfig, broker: Broker) -> Self {
        Self {
            broker: Arc::new(broker),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }
}
