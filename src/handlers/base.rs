// src/handlers/base.rs

use axum::{body::Bytes, http::StatusCode};
use std::fmt;

/// Classification of one upstream attempt made with one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The call succeeded; carries the generated content.
    Success(String),
    /// The key hit its quota. Not a fault of the key.
    RateLimited,
    /// Temporary failure (5xx, timeout, malformed body). Counts toward the error threshold.
    TransientError(String),
    /// The key itself is unusable (invalid or revoked credential).
    FatalError(String),
}

impl Outcome {
    /// Short label used for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::RateLimited => "rate_limited",
            Self::TransientError(_) => "transient_error",
            Self::FatalError(_) => "fatal_error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(_) | Self::RateLimited => write!(f, "{}", self.label()),
            Self::TransientError(reason) | Self::FatalError(reason) => {
                write!(f, "{}: {reason}", self.label())
            }
        }
    }
}

/// A trait for classifying responses from the upstream service.
/// Each implementation is responsible for a specific case (e.g., success, rate limit).
pub trait ResponseHandler: Send + Sync {
    /// Returns `Some(Outcome)` if this handler recognises the response, `None` to let
    /// the next handler in the chain try.
    fn handle(&self, status: StatusCode, body: &Bytes) -> Option<Outcome>;
}

/// Leading part of a response body, for failure descriptions.
pub(crate) fn body_snippet(body: &Bytes) -> String {
    const MAX: usize = 120;
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.chars().count() > MAX {
        format!("{}...", trimmed.chars().take(MAX).collect::<String>())
    } else {
        trimmed.to_string()
    }
}
