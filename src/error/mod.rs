//! Error handling module
//!
//! Two layers of errors live here:
//! - [`BrokerError`]: outcomes of a logical broker request that the caller can observe
//!   (terminal fallback failure, cancellation) plus the selection failure used internally.
//! - [`AppError`]: the crate-wide error type, convertible into an RFC 7807 Problem Details
//!   HTTP response.

pub mod types;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

tokio::task_local! {
    /// Id of the HTTP request being served, set by the request tracing middleware.
    pub static REQUEST_ID: String;
}

/// The current request's id, or a fresh one outside a request scope.
pub fn current_request_id() -> String {
    REQUEST_ID
        .try_with(Clone::clone)
        .unwrap_or_else(|_| Uuid::new_v4().to_string())
}

/// RFC 7807 problem body returned for every failed HTTP call.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub error_type: String,
    pub title: String,
    pub status: u16,
    /// The error's display text.
    pub detail: String,
    pub instance: String,
    pub request_id: Option<String>,
}

/// Errors produced while serving one logical request through the broker.
///
/// Per-key failures (rate limits, transient and fatal upstream errors) never appear here:
/// they are absorbed by the health tracker and retried on another key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("no active API key is available")]
    AllKeysUnavailable,

    #[error("retry budget exhausted after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },

    #[error("every configured key was tried ({tried} keys)")]
    ExhaustedKeys { tried: usize },

    #[error("fallback failed after primary keys were exhausted ({cause}): {message}")]
    FallbackFailed {
        cause: Box<BrokerError>,
        message: String,
    },

    #[error("request cancelled by caller")]
    Cancelled,
}

impl BrokerError {
    /// Whether the error is the terminal failure that reaches the caller.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FallbackFailed { .. })
    }
}

/// Crate-wide error type. Broker outcomes nest under [`AppError::Broker`].
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration validation failed: {message}")]
    ConfigValidation {
        message: String,
        field: Option<String>,
    },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String, line: Option<usize> },

    #[error("HTTP client error: {message}")]
    HttpClient {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown API key: {name}")]
    KeyNotFound { name: String },

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("IO operation failed: {operation} - {message}")]
    Io { operation: String, message: String },
}

impl AppError {
    /// Validation failure, optionally naming the offending field.
    pub fn config_validation(message: impl Into<String>, field: Option<impl Into<String>>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
            field: field.map(Into::into),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Cancellation maps to 408, exhausted keys with a failed fallback to 503.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ConfigParse { .. } | Self::InvalidRequest { .. } | Self::Serialization { .. } => {
                StatusCode::BAD_REQUEST
            }

            Self::ConfigNotFound { .. } | Self::KeyNotFound { .. } => StatusCode::NOT_FOUND,

            Self::Broker(BrokerError::Cancelled) => StatusCode::REQUEST_TIMEOUT,

            Self::Broker(_) => StatusCode::SERVICE_UNAVAILABLE,

            Self::HttpClient { .. } => StatusCode::BAD_GATEWAY,

            Self::ConfigValidation { .. } | Self::Internal { .. } | Self::Io { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ConfigValidation { .. } | Self::ConfigNotFound { .. } | Self::ConfigParse { .. } => {
                "https://key-broker.dev/errors/configuration"
            }
            Self::HttpClient { .. } => "https://key-broker.dev/errors/network",
            Self::KeyNotFound { .. } => "https://key-broker.dev/errors/key-management",
            Self::Broker(BrokerError::Cancelled) => "https://key-broker.dev/errors/cancelled",
            Self::Broker(_) => "https://key-broker.dev/errors/upstream-exhausted",
            Self::InvalidRequest { .. } | Self::Serialization { .. } => {
                "https://key-broker.dev/errors/validation"
            }
            Self::Internal { .. } | Self::Io { .. } => "https://key-broker.dev/errors/internal",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::ConfigValidation { .. } | Self::ConfigNotFound { .. } | Self::ConfigParse { .. } => {
                "Configuration Error"
            }
            Self::HttpClient { .. } => "Network Error",
            Self::KeyNotFound { .. } => "Key Management Error",
            Self::Broker(BrokerError::Cancelled) => "Request Cancelled",
            Self::Broker(_) => "Upstream Unavailable",
            Self::InvalidRequest { .. } | Self::Serialization { .. } => "Validation Error",
            Self::Internal { .. } | Self::Io { .. } => "Internal Server Error",
        }
    }

    /// Server-side failures log at error, client mistakes at warn.
    pub fn log(&self, request_id: Option<&str>) {
        let request_id = request_id.unwrap_or("-");
        if self.status_code().is_server_error() {
            error!(
                error = %self,
                request_id = request_id,
                error_type = self.error_type(),
                "Request failed"
            );
        } else {
            warn!(
                error = %self,
                request_id = request_id,
                error_type = self.error_type(),
                "Request rejected"
            );
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = current_request_id();

        self.log(Some(&request_id));

        let status = self.status_code();
        let error_response = ErrorResponse {
            error_type: self.error_type().to_string(),
            title: self.title().to_string(),
            status: status.as_u16(),
            detail: self.to_string(),
            instance: format!("/errors/{request_id}"),
            request_id: Some(request_id),
        };

        (status, Json(error_response)).into_response()
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_errors_map_to_service_unavailable() {
        let err = AppError::from(BrokerError::FallbackFailed {
            cause: Box::new(BrokerError::ExhaustedRetries { attempts: 3 }),
            message: "secondary provider returned 500".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.title(), "Upstream Unavailable");
        assert!(err.to_string().contains("retry budget exhausted after 3 attempts"));
    }

    #[test]
    fn test_cancelled_is_not_a_server_error() {
        let err = AppError::from(BrokerError::Cancelled);
        assert_eq!(err.status_code(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn test_only_fallback_failure_is_terminal() {
        assert!(!BrokerError::AllKeysUnavailable.is_terminal());
        assert!(!BrokerError::Cancelled.is_terminal());
        assert!(BrokerError::FallbackFailed {
            cause: Box::new(BrokerError::AllKeysUnavailable),
            message: "disabled".to_string(),
        }
        .is_terminal());
    }

    #[tokio::test]
    async fn test_into_response_uses_scoped_request_id() {
        let response = REQUEST_ID
            .scope("req-42".to_string(), async {
                AppError::InvalidRequest {
                    message: "empty".to_string(),
                }
                .into_response()
            })
            .await;

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["request_id"], "req-42");
        assert_eq!(json["instance"], "/errors/req-42");
    }

    #[tokio::test]
    async fn test_into_response_uses_problem_details() {
        let response = AppError::KeyNotFound {
            name: "GROQ_API_KEY9".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["type"], "https://key-broker.dev/errors/key-management");
        assert_eq!(json["status"], 404);
    }
}
