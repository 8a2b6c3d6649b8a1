// src/handlers/terminal_error.rs

use super::base::{body_snippet, Outcome, ResponseHandler};
use axum::{body::Bytes, http::StatusCode};
use tracing::warn;

/// Last in the chain: any remaining 4xx.
///
/// Credential rejections are matched earlier by `InvalidApiKeyHandler`. What reaches this
/// handler (unknown model, out-of-range parameters) is a property of the request, so it
/// counts as an ordinary error and never disables the key.
pub struct TerminalErrorHandler;

impl ResponseHandler for TerminalErrorHandler {
    fn handle(&self, status: StatusCode, body: &Bytes) -> Option<Outcome> {
        if !status.is_client_error() {
            return None;
        }

        let snippet = body_snippet(body);
        warn!(
            status = status.as_u16(),
            response_body = %snippet,
            "Upstream rejected the request"
        );
        Some(Outcome::TransientError(format!(
            "upstream rejected request ({}): {snippet}",
            status.as_u16()
        )))
    }
}
