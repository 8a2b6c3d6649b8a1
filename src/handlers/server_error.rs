// src/handlers/server_error.rs

use super::base::{body_snippet, Outcome, ResponseHandler};
use axum::{body::Bytes, http::StatusCode};
use tracing::warn;

/// Provider-side failures. Retried on another key.
pub struct ServerErrorHandler;

impl ResponseHandler for ServerErrorHandler {
    fn handle(&self, status: StatusCode, body: &Bytes) -> Option<Outcome> {
        if !status.is_server_error() {
            return None;
        }

        let snippet = body_snippet(body);
        warn!(
            status = status.as_u16(),
            response_body = %snippet,
            "Server error detected, will retry with next key"
        );
        Some(Outcome::TransientError(format!(
            "upstream status {}: {snippet}",
            status.as_u16()
        )))
    }
}
