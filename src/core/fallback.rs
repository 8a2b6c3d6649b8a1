// src/core/fallback.rs

use crate::config::{AppConfig, FallbackConfig};
use crate::error::{AppError, Result};
use crate::handlers::Outcome;
use crate::models::{Completion, CompletionSource, GenerationRequest};
use crate::proxy::{Dispatcher, HttpDispatcher};
use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};

/// Model name reported on placeholder completions.
pub const PLACEHOLDER_MODEL: &str = "placeholder";

const TOPIC_PREVIEW_CHARS: usize = 80;

/// Produces a degraded response once every primary key has failed.
#[async_trait]
pub trait FallbackPath: Send + Sync {
    async fn produce(&self, request: &GenerationRequest) -> Result<Completion>;
}

/// Secondary upstream provider with its own credential.
pub struct SecondaryProvider {
    dispatcher: Arc<dyn Dispatcher>,
    credential: SecretString,
}

impl SecondaryProvider {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, credential: SecretString) -> Self {
        Self {
            dispatcher,
            credential,
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Completion> {
        match self.dispatcher.dispatch(&self.credential, request).await {
            Outcome::Success(content) => Ok(Completion::degraded(
                content,
                self.dispatcher.model_for(request),
                CompletionSource::Secondary,
            )),
            other => Err(AppError::HttpClient {
                message: format!("secondary provider failed: {other}"),
                status_code: None,
            }),
        }
    }
}

/// Labelled canned response built from the request itself.
pub fn placeholder_content(request: &GenerationRequest) -> String {
    let topic = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty());

    match topic {
        Some(topic) => {
            let preview: String = topic.chars().take(TOPIC_PREVIEW_CHARS).collect();
            format!(
                "[placeholder] The generation service is temporarily unavailable. \
                 Your request (\"{preview}\") could not be completed right now; please retry later."
            )
        }
        None => "[placeholder] The generation service is temporarily unavailable; please retry later."
            .to_string(),
    }
}

/// Secondary provider first, then the placeholder, each only when configured.
pub struct ChainedFallback {
    secondary: Option<SecondaryProvider>,
    placeholder_enabled: bool,
}

impl ChainedFallback {
    pub fn new(secondary: Option<SecondaryProvider>, placeholder_enabled: bool) -> Self {
        Self {
            secondary,
            placeholder_enabled,
        }
    }

    /// Builds the chain from configuration. A secondary provider without a credential is skipped.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let FallbackConfig {
            secondary,
            placeholder_enabled,
        } = &config.fallback;

        let secondary = match secondary {
            Some(provider) => match &provider.api_key {
                Some(key) => {
                    let dispatcher = HttpDispatcher::from_secondary(provider, &config.upstream)?;
                    info!(url = %dispatcher.endpoint(), model = %provider.model, "Secondary provider configured");
                    Some(SecondaryProvider::new(Arc::new(dispatcher), key.clone()))
                }
                None => {
                    warn!("Secondary provider configured without an API key, skipping it");
                    None
                }
            },
            None => None,
        };

        Ok(Self::new(secondary, *placeholder_enabled))
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }
}

#[async_trait]
impl FallbackPath for ChainedFallback {
    async fn produce(&self, request: &GenerationRequest) -> Result<Completion> {
        let mut last_error = None;

        if let Some(secondary) = &self.secondary {
            match secondary.generate(request).await {
                Ok(completion) => {
                    info!(source = %completion.source, "Fallback answered by secondary provider");
                    return Ok(completion);
                }
                Err(e) => {
                    warn!(error = %e, "Secondary provider failed");
                    last_error = Some(e);
                }
            }
        }

        if self.placeholder_enabled {
            info!("Serving placeholder content");
            return Ok(Completion::degraded(
                placeholder_content(request),
                PLACEHOLDER_MODEL,
                CompletionSource::Placeholder,
            ));
        }

        Err(last_error.unwrap_or_else(|| AppError::internal("no fallback producer is enabled")))
    }
}
