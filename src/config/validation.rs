// src/config/validation.rs

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::utils::mask_key;
use secrecy::ExposeSecret;
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &AppConfig) -> Result<()> {
        debug!("Starting configuration validation");

        if let Err(e) = Self::validate_keys(config) {
            warn!("Key validation failed: {}", e);
            return Err(e);
        }
        debug!("Key validation passed");

        if let Err(e) = Self::validate_broker(config) {
            warn!("Broker settings validation failed: {}", e);
            return Err(e);
        }
        debug!("Broker settings validation passed");

        if let Err(e) = Self::validate_upstreams(config) {
            warn!("Upstream validation failed: {}", e);
            return Err(e);
        }
        debug!("Upstream validation passed");

        if config.server.generate_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Generate timeout cannot be 0",
                Some("server.generate_timeout_secs"),
            ));
        }

        debug!("Configuration validation completed successfully");
        Ok(())
    }

    fn validate_keys(config: &AppConfig) -> Result<()> {
        if config.keys.is_empty() {
            return Err(AppError::config_validation(
                "At least one API key must be configured",
                Some("keys"),
            ));
        }

        let mut names = HashSet::new();
        let mut secrets = HashSet::new();

        for key in &config.keys {
            if key.name.trim().is_empty() {
                return Err(AppError::config_validation(
                    "Key name cannot be empty",
                    Some("keys.name"),
                ));
            }

            if !names.insert(key.name.as_str()) {
                return Err(AppError::config_validation(
                    format!("Duplicate key name: {}", key.name),
                    Some("keys.name"),
                ));
            }

            let secret = key.api_key.expose_secret();
            if secret.trim().is_empty() {
                return Err(AppError::config_validation(
                    format!("Key '{}' has an empty credential", key.name),
                    Some("keys.api_key"),
                ));
            }

            if !secrets.insert(secret.as_str()) {
                return Err(AppError::config_validation(
                    format!("Duplicate API key found: {}", mask_key(secret)),
                    Some("keys.api_key"),
                ));
            }
        }

        debug!("Validated {} keys", config.keys.len());
        Ok(())
    }

    fn validate_broker(config: &AppConfig) -> Result<()> {
        let broker = &config.broker;

        if broker.max_retries == 0 {
            return Err(AppError::config_validation(
                "max_retries must be at least 1",
                Some("broker.max_retries"),
            ));
        }

        if broker.error_threshold == 0 {
            return Err(AppError::config_validation(
                "error_threshold must be at least 1",
                Some("broker.error_threshold"),
            ));
        }

        if broker.base_backoff_ms > broker.max_backoff_ms {
            return Err(AppError::config_validation(
                format!(
                    "base_backoff_ms ({}) cannot exceed max_backoff_ms ({})",
                    broker.base_backoff_ms, broker.max_backoff_ms
                ),
                Some("broker.base_backoff_ms"),
            ));
        }

        Ok(())
    }

    fn validate_upstreams(config: &AppConfig) -> Result<()> {
        Self::validate_url(&config.upstream.base_url, "upstream.base_url")?;

        if config.upstream.request_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Request timeout cannot be 0",
                Some("upstream.request_timeout_secs"),
            ));
        }

        if let Some(secondary) = &config.fallback.secondary {
            Self::validate_url(&secondary.base_url, "fallback.secondary.base_url")?;
            if secondary.api_key.is_none() {
                warn!("Secondary provider configured without a credential; it will be skipped");
            }
        }

        Ok(())
    }

    fn validate_url(url_str: &str, field_name: &str) -> Result<()> {
        let url = Url::parse(url_str).map_err(|e| {
            AppError::config_validation(
                format!("Invalid URL in {field_name}: {url_str} - {e}"),
                Some(field_name),
            )
        })?;

        match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(AppError::config_validation(
                format!("Unsupported scheme '{scheme}' in {field_name}. Supported: http, https"),
                Some(field_name),
            )),
        }
    }
}
