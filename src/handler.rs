// src/handler.rs

use crate::{
    error::{AppError, Result},
    models::{Completion, GenerationRequest},
    state::AppState,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Body of `POST /v1/generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    #[serde(flatten)]
    pub request: GenerationRequest,
    #[serde(default)]
    pub workload_id: Option<String>,
}

/// Runs one logical request through the broker.
///
/// The call is bounded by `server.generate_timeout_secs` and cancelled on shutdown; both
/// surface as `Cancelled` (408). A client disconnect drops this future, which abandons
/// the in-flight upstream call.
pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<Completion>> {
    if body.request.messages.is_empty() {
        return Err(AppError::InvalidRequest {
            message: "`messages` must contain at least one message".to_string(),
        });
    }

    let cancel = state.shutdown.child_token();
    let limit = Duration::from_secs(state.config.server.generate_timeout_secs);
    let call = state
        .broker
        .execute(&body.request, body.workload_id.as_deref(), &cancel);
    tokio::pin!(call);

    // The deadline fires the token; the call itself is never dropped.
    let result = tokio::select! {
        result = &mut call => result,
        () = tokio::time::sleep(limit) => {
            warn!(timeout_secs = limit.as_secs(), "Generate request timed out, cancelling");
            cancel.cancel();
            call.await
        }
    };
    let completion = result?;

    info!(
        source = %completion.source,
        degraded = completion.degraded,
        model = %completion.model,
        "Generate request completed"
    );
    Ok(Json(completion))
}

/// Liveness plus the number of keys currently usable.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = Instant::now();
    let available = state.broker.available_keys(now);
    let total = state.broker.registry().len();
    let status = if available > 0 { "ok" } else { "degraded" };

    (
        StatusCode::OK,
        Json(json!({
            "status": status,
            "available_keys": available,
            "total_keys": total,
        })),
    )
}
