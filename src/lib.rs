// src/lib.rs

pub mod admin;
pub mod broker;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod monitoring;
pub mod proxy;
pub mod state;
pub mod storage;
pub mod utils;

use crate::handler::{generate_handler, health_check};
use axum::{
    body::Body,
    http::{HeaderValue, Request as AxumRequest},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use http::HeaderName;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

pub use broker::Broker;
pub use config::AppConfig;
pub use error::{AppError, BrokerError, Result};
pub use models::{ChatMessage, Completion, CompletionSource, GenerationRequest};
pub use monitoring::StatusReport;
pub use state::AppState;

static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Creates the main Axum router for the application.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/generate", post(generate_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/admin", admin::admin_routes())
        .route_layer(axum::middleware::from_fn(metrics::metrics_middleware))
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(trace_requests)))
        .with_state(state)
}

/// Tags every request with an id (the caller's `X-Request-ID` when present) and a span.
async fn trace_requests(
    req: AxumRequest<Body>,
    next: axum::middleware::Next,
) -> impl IntoResponse {
    let request_id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
    let started = Instant::now();

    let span = info_span!(
        "request",
        request_id = %request_id,
        http.method = %req.method(),
        url.path = %req.uri().path(),
    );

    async move {
        let mut response = error::REQUEST_ID
            .scope(request_id.clone(), next.run(req))
            .await;

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(X_REQUEST_ID.clone(), value);
        }

        info!(
            http.response.duration = ?started.elapsed(),
            http.status_code = response.status().as_u16(),
            "Request finished"
        );

        response
    }
    .instrument(span)
    .await
}

/// Loads configuration, builds the broker and returns the ready router with its state.
pub async fn run(config_path_override: Option<PathBuf>) -> Result<(Router, Arc<AppState>)> {
    info!("Starting key broker...");

    let app_config = setup_configuration(config_path_override)?;
    metrics::install_recorder()?;

    let state = Arc::new(AppState::new(app_config).map_err(|e| {
        error!(error = ?e, "Failed to initialize application state. Exiting.");
        e
    })?);
    info!("Application state initialized successfully.");

    let app = create_router(state.clone());
    Ok((app, state))
}

/// Binds the HTTP listener. `host` may be an IPv4 or IPv6 literal or a hostname.
pub async fn bind_listener(host: &str, port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind((host, port)).await.map_err(|e| {
        error!(server.host = %host, server.port = port, error = ?e, "Failed to bind listener");
        e
    })?;
    Ok(listener)
}

/// Resolves the config path, then loads, validates and logs the configuration.
pub fn setup_configuration(config_path_override: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = config_path_override.unwrap_or_else(|| {
        std::env::var("CONFIG_PATH").map_or_else(|_| PathBuf::from("config.yaml"), PathBuf::from)
    });

    log_config_source(&config_path);

    let app_config = config::load_config(&config_path).map_err(|e| {
        error!(
            config.path = %config_path.display(),
            error = ?e,
            "Failed to load or validate configuration. Exiting."
        );
        e
    })?;

    info!(
        config.keys.count = app_config.keys.len(),
        config.keys.names = ?app_config.key_names(),
        config.strategy = %app_config.broker.strategy,
        config.secondary = app_config.fallback.secondary.is_some(),
        server.port = app_config.server.port,
        "Configuration loaded and validated successfully."
    );

    Ok(app_config)
}

fn log_config_source(config_path: &Path) {
    if config_path.exists() {
        info!(config.path = %config_path.display(), "Using configuration file");
    } else {
        info!(
            config.path = %config_path.display(),
            "Optional configuration file not found. Using defaults and environment variables."
        );
    }
}
