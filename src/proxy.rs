// src/proxy.rs

use crate::{
    config::{SecondaryProviderConfig, UpstreamConfig},
    error::Result,
    handlers::{classify_transport_error, Outcome, ResponseProcessor},
    models::{ChatCompletionRequest, GenerationRequest},
    utils::mask_key,
};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Outbound transport: performs one upstream call with one credential.
///
/// Implementations never fail: every result, including transport errors, is folded into
/// an [`Outcome`].
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, credential: &SecretString, request: &GenerationRequest) -> Outcome;

    /// Model name a completion for `request` will be attributed to.
    fn model_for(&self, request: &GenerationRequest) -> String {
        request.model.clone().unwrap_or_default()
    }
}

/// Generation parameters used when the request leaves them unset.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionDefaults {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&UpstreamConfig> for CompletionDefaults {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Builds the shared HTTP client used for upstream calls.
pub fn build_client(connect_timeout: Duration, request_timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

fn completions_url(base_url: &str) -> Result<Url> {
    let url = Url::parse(&format!(
        "{}/chat/completions",
        base_url.trim_end_matches('/')
    ))?;
    Ok(url)
}

/// [`Dispatcher`] for OpenAI-compatible chat completion endpoints.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: Client,
    endpoint: Url,
    defaults: CompletionDefaults,
    processor: ResponseProcessor,
}

impl HttpDispatcher {
    pub fn new(client: Client, base_url: &str, defaults: CompletionDefaults) -> Result<Self> {
        Ok(Self {
            client,
            endpoint: completions_url(base_url)?,
            defaults,
            processor: ResponseProcessor::default(),
        })
    }

    /// Dispatcher for the primary key pool.
    pub fn from_upstream(config: &UpstreamConfig) -> Result<Self> {
        let client = build_client(
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Self::new(client, &config.base_url, CompletionDefaults::from(config))
    }

    /// Dispatcher for the secondary provider. Sampling defaults follow the primary upstream.
    pub fn from_secondary(
        config: &SecondaryProviderConfig,
        upstream: &UpstreamConfig,
    ) -> Result<Self> {
        let client = build_client(
            Duration::from_secs(upstream.connect_timeout_secs),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        let defaults = CompletionDefaults {
            model: config.model.clone(),
            ..CompletionDefaults::from(upstream)
        };
        Self::new(client, &config.base_url, defaults)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, credential: &SecretString, request: &GenerationRequest) -> Outcome {
        let model = self.model_for(request);
        let body = ChatCompletionRequest {
            model: &model,
            messages: &request.messages,
            temperature: request.temperature.unwrap_or(self.defaults.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.defaults.max_tokens),
        };

        debug!(
            url = %self.endpoint,
            model = %model,
            api_key.preview = %mask_key(credential.expose_secret()),
            "Forwarding request to upstream"
        );

        let response = match self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(credential.expose_secret())
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %self.endpoint, error = %e, "Upstream request failed before a response");
                return classify_transport_error(&e);
            }
        };

        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(status = %status, error = %e, "Error reading upstream response body");
                return classify_transport_error(&e);
            }
        };

        let outcome = self.processor.classify(status, &bytes);
        info!(status = status.as_u16(), outcome = outcome.label(), "Received response from upstream");
        outcome
    }

    fn model_for(&self, request: &GenerationRequest) -> String {
        request
            .model
            .clone()
            .unwrap_or_else(|| self.defaults.model.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url_handles_trailing_slash() {
        assert_eq!(
            completions_url("https://api.groq.com/openai/v1/").unwrap().as_str(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
        assert!(completions_url("not a url").is_err());
    }

    #[test]
    fn test_model_defaults_apply_when_unset() {
        let dispatcher = HttpDispatcher::from_upstream(&UpstreamConfig::default()).unwrap();
        let mut request = GenerationRequest::from_prompt("hi");
        assert_eq!(dispatcher.model_for(&request), UpstreamConfig::default().model);
        request.model = Some("mixtral".to_string());
        assert_eq!(dispatcher.model_for(&request), "mixtral");
    }
}
