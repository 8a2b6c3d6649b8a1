// src/admin.rs

use crate::{error::Result, monitoring::StatusReport, state::AppState};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub reset: usize,
}

/// Defines all administrative API routes, nested under `/admin`.
pub fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/keys", get(list_keys))
        .route("/keys/reset", post(reset_all_keys))
        .route("/keys/:name/reset", post(reset_key))
}

async fn list_keys(State(state): State<Arc<AppState>>) -> Json<StatusReport> {
    Json(state.broker.snapshot(Instant::now()))
}

async fn reset_key(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ResetResponse>> {
    state.broker.reset_key(&name)?;
    info!(key.name = %name, "Key reset via admin API");
    Ok(Json(ResetResponse { reset: 1 }))
}

async fn reset_all_keys(State(state): State<Arc<AppState>>) -> Result<Json<ResetResponse>> {
    let reset = state.broker.reset_all()?;
    info!(keys = reset, "All keys reset via admin API");
    Ok(Json(ResetResponse { reset }))
}
