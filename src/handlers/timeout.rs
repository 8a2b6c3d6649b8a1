// src/handlers/timeout.rs

use super::base::{Outcome, ResponseHandler};
use axum::{body::Bytes, http::StatusCode};
use tracing::warn;

/// Handler for timeout-specific statuses.
pub struct TimeoutHandler;

impl ResponseHandler for TimeoutHandler {
    fn handle(&self, status: StatusCode, _body: &Bytes) -> Option<Outcome> {
        if matches!(status, StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT) {
            warn!(status = status.as_u16(), "Upstream timeout, will retry with next key");
            return Some(Outcome::TransientError(format!(
                "upstream timeout ({})",
                status.as_u16()
            )));
        }
        None
    }
}

/// Classifies a failure to get any response at all. Never the credential's fault.
pub fn classify_transport_error(err: &reqwest::Error) -> Outcome {
    let kind = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_body() || err.is_decode() {
        "failed to read response body"
    } else {
        "transport error"
    };
    Outcome::TransientError(format!("{kind}: {err}"))
}
