// src/config/loader.rs

use crate::config::{ApiKeyConfig, AppConfig, ConfigValidator, SecondaryProviderConfig};
use crate::error::{AppError, Result};
use secrecy::SecretString;
use std::path::Path;
use tracing::{debug, info, warn};

/// Prefix of the numbered key variables: `GROQ_API_KEY`, `GROQ_API_KEY2`, `GROQ_API_KEY3`, ...
pub const KEY_ENV_PREFIX: &str = "GROQ_API_KEY";

/// Load configuration from file, then apply environment overrides and validate.
pub fn load_config(config_path: &Path) -> Result<AppConfig> {
    let mut config = if config_path.exists() {
        info!("Loading configuration from file: {}", config_path.display());
        load_from_file(config_path)?
    } else {
        info!("Configuration file not found, using defaults");
        AppConfig::default()
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());

    ConfigValidator::validate(&config)?;

    debug!("Configuration loaded and validated successfully");
    Ok(config)
}

fn load_from_file(config_path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(config_path).map_err(|_| AppError::ConfigNotFound {
        path: config_path.display().to_string(),
    })?;

    Ok(serde_yaml::from_str(&content)?)
}

/// Overrides values from an environment lookup.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port_str) = lookup("PORT") {
        match port_str.parse::<u16>() {
            Ok(port) => {
                info!("Overriding server port from environment variable: {}", port);
                config.server.port = port;
            }
            Err(_) => warn!("Invalid PORT environment variable: {}", port_str),
        }
    }

    if let Some(retries_str) = lookup("BROKER_MAX_RETRIES") {
        match retries_str.parse::<u32>() {
            Ok(retries) => {
                info!("Overriding max retries from environment: {}", retries);
                config.broker.max_retries = retries;
            }
            Err(_) => warn!("Invalid BROKER_MAX_RETRIES environment variable: {}", retries_str),
        }
    }

    if let Some(threshold_str) = lookup("BROKER_ERROR_THRESHOLD") {
        match threshold_str.parse::<u32>() {
            Ok(threshold) => {
                info!("Overriding error threshold from environment: {}", threshold);
                config.broker.error_threshold = threshold;
            }
            Err(_) => warn!(
                "Invalid BROKER_ERROR_THRESHOLD environment variable: {}",
                threshold_str
            ),
        }
    }

    if let Some(strategy_str) = lookup("BROKER_STRATEGY") {
        match strategy_str.parse() {
            Ok(strategy) => {
                info!("Overriding selection strategy from environment: {}", strategy);
                config.broker.strategy = strategy;
            }
            Err(e) => warn!("Invalid BROKER_STRATEGY environment variable: {}", e),
        }
    }

    for key in collect_env_keys(&lookup) {
        if config.keys.iter().any(|k| k.name == key.name) {
            debug!(key.name = %key.name, "Key already defined in file, environment value ignored");
            continue;
        }
        info!(key.name = %key.name, "Loaded API key from environment");
        config.keys.push(key);
    }

    if let Some(openai_key) = lookup("OPENAI_API_KEY").filter(|v| !v.trim().is_empty()) {
        let secondary = config
            .fallback
            .secondary
            .get_or_insert_with(SecondaryProviderConfig::default);
        if secondary.api_key.is_none() {
            info!("Secondary provider credential loaded from OPENAI_API_KEY");
            secondary.api_key = Some(SecretString::new(openai_key));
        }
    }
}

/// Reads `PREFIX`, `PREFIX2`, `PREFIX3`, ... and stops at the first missing numbered variable.
fn collect_env_keys<F>(lookup: &F) -> Vec<ApiKeyConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut keys = Vec::new();

    if let Some(value) = lookup(KEY_ENV_PREFIX).filter(|v| !v.trim().is_empty()) {
        keys.push(ApiKeyConfig::new(KEY_ENV_PREFIX, value.trim()));
    }

    for n in 2.. {
        let name = format!("{KEY_ENV_PREFIX}{n}");
        match lookup(&name).filter(|v| !v.trim().is_empty()) {
            Some(value) => keys.push(ApiKeyConfig::new(name, value.trim())),
            None => break,
        }
    }

    keys
}
