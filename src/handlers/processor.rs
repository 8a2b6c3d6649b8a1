// src/handlers/processor.rs

use super::{
    base::{Outcome, ResponseHandler},
    invalid_api_key::InvalidApiKeyHandler,
    rate_limit::RateLimitHandler,
    server_error::ServerErrorHandler,
    success::SuccessHandler,
    terminal_error::TerminalErrorHandler,
    timeout::TimeoutHandler,
};
use axum::{body::Bytes, http::StatusCode};
use std::sync::Arc;
use tracing::trace;

/// Runs a response through a chain of handlers; the first match wins.
#[derive(Clone)]
pub struct ResponseProcessor {
    handlers: Arc<Vec<Box<dyn ResponseHandler>>>,
}

impl ResponseProcessor {
    pub fn new(handlers: Vec<Box<dyn ResponseHandler>>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    pub fn classify(&self, status: StatusCode, body: &Bytes) -> Outcome {
        let outcome = self
            .handlers
            .iter()
            .find_map(|handler| handler.handle(status, body))
            .unwrap_or_else(|| {
                Outcome::TransientError(format!("unexpected upstream status {}", status.as_u16()))
            });
        trace!(status = status.as_u16(), outcome = outcome.label(), "Classified upstream response");
        outcome
    }
}

impl Default for ResponseProcessor {
    fn default() -> Self {
        Self::new(vec![
            Box::new(SuccessHandler),
            Box::new(RateLimitHandler),
            Box::new(InvalidApiKeyHandler),
            Box::new(TimeoutHandler),
            Box::new(ServerErrorHandler),
            Box::new(TerminalErrorHandler),
        ])
    }
}

impl std::fmt::Debug for ResponseProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseProcessor")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
